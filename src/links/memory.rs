//! In-process bookmark store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use super::{Link, LinkStore, NewLink};

struct Links {
    by_id: BTreeMap<i64, Link>,
    next_id: i64,
}

impl Links {
    fn newest_first(&self, filter: impl Fn(&Link) -> bool) -> Vec<Link> {
        self.by_id
            .values()
            .rev()
            .filter(|&link| filter(link))
            .cloned()
            .collect()
    }
}

/// Bookmarks kept in memory for the lifetime of the process.
pub struct MemoryLinkStore {
    links: RwLock<Links>,
}

impl MemoryLinkStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            links: RwLock::new(Links {
                by_id: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }
}

impl Default for MemoryLinkStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LinkStore for MemoryLinkStore {
    async fn create(&self, owner_id: i64, link: NewLink) -> Link {
        let mut links = self.links.write();
        let url = link.url.trim().to_string();
        let title = link
            .title
            .map(|title| title.trim().to_string())
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| url.clone());

        let link = Link {
            id: links.next_id,
            owner_id,
            url,
            title,
            is_public: link.is_public,
            created_at: Utc::now(),
        };
        links.next_id += 1;
        links.by_id.insert(link.id, link.clone());
        link
    }

    async fn list_for_owner(&self, owner_id: i64) -> Vec<Link> {
        self.links
            .read()
            .newest_first(|link| link.owner_id == owner_id)
    }

    async fn list_public(&self) -> Vec<Link> {
        self.links.read().newest_first(|link| link.is_public)
    }

    async fn list_all(&self) -> Vec<Link> {
        self.links.read().newest_first(|_| true)
    }

    async fn delete(&self, id: i64, owner_id: i64) -> bool {
        let mut links = self.links.write();
        let owned = links
            .by_id
            .get(&id)
            .is_some_and(|link| link.owner_id == owner_id);
        owned && links.by_id.remove(&id).is_some()
    }

    async fn delete_any(&self, id: i64) -> bool {
        self.links.write().by_id.remove(&id).is_some()
    }

    async fn delete_owned_by(&self, owner_id: i64) -> usize {
        let mut links = self.links.write();
        let before = links.by_id.len();
        links.by_id.retain(|_, link| link.owner_id != owner_id);
        before - links.by_id.len()
    }

    async fn set_public(&self, id: i64, owner_id: i64, is_public: bool) -> Option<Link> {
        let mut links = self.links.write();
        let link = links
            .by_id
            .get_mut(&id)
            .filter(|link| link.owner_id == owner_id)?;
        link.is_public = is_public;
        Some(link.clone())
    }
}
