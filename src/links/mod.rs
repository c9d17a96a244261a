//! Bookmarks: the business data the authentication gate protects.

mod memory;

pub use memory::MemoryLinkStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A saved bookmark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub id: i64,
    pub owner_id: i64,
    pub url: String,
    pub title: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields a client supplies when saving a bookmark.
#[derive(Debug, Clone, Deserialize)]
pub struct NewLink {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

/// Persistence for bookmarks.
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Save a bookmark owned by `owner_id`.
    async fn create(&self, owner_id: i64, link: NewLink) -> Link;

    /// Bookmarks owned by `owner_id`, newest first.
    async fn list_for_owner(&self, owner_id: i64) -> Vec<Link>;

    /// Public bookmarks of every owner, newest first.
    async fn list_public(&self) -> Vec<Link>;

    /// Every bookmark, newest first.
    async fn list_all(&self) -> Vec<Link>;

    /// Delete a bookmark if `owner_id` owns it. Returns whether it was removed.
    async fn delete(&self, id: i64, owner_id: i64) -> bool;

    /// Delete a bookmark regardless of owner. Returns whether it was removed.
    async fn delete_any(&self, id: i64) -> bool;

    /// Delete every bookmark owned by `owner_id`. Returns how many were removed.
    async fn delete_owned_by(&self, owner_id: i64) -> usize;

    /// Change the visibility of a bookmark `owner_id` owns.
    async fn set_public(&self, id: i64, owner_id: i64, is_public: bool) -> Option<Link>;
}
