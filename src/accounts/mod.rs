//! User accounts: the store interface, registration rules and hashing.

mod hasher;
mod memory;

pub use hasher::PasswordHasher;
pub use memory::MemoryAccountStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::credential::Identity;

/// Errors from account operations.
#[derive(Debug, Error)]
pub enum AccountError {
    /// Username or password does not meet the registration rules
    #[error("{0}")]
    InvalidRegistration(&'static str),

    /// Another account already uses the username
    #[error("username already exists")]
    UsernameTaken,

    /// Unknown username or wrong password
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Password hashing failed
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// A registered user as exposed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// The identity a credential for this account carries.
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.id,
            username: self.username.clone(),
            is_admin: self.is_admin,
        }
    }
}

/// Persistence for accounts.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Create an account. The username must be unused.
    async fn create(
        &self,
        username: &str,
        password: &str,
        is_admin: bool,
    ) -> Result<Account, AccountError>;

    /// Look up an account by username and check its password.
    async fn authenticate(&self, username: &str, password: &str) -> Result<Account, AccountError>;

    /// All accounts ordered by id.
    async fn list(&self) -> Vec<Account>;

    /// Grant or revoke the admin flag. Returns the updated account, or
    /// `None` if no account has the id.
    async fn set_admin(&self, id: i64, is_admin: bool) -> Option<Account>;

    /// Remove an account. Returns whether it existed.
    async fn delete(&self, id: i64) -> bool;
}

/// Apply the registration rules, returning the trimmed username.
///
/// Usernames are 3-50 characters of ASCII letters, digits, `_` and `-`.
/// Passwords are 6-128 characters with at least one letter and one digit.
pub fn validate_registration<'a>(
    username: &'a str,
    password: &str,
) -> Result<&'a str, AccountError> {
    let username = username.trim();

    if !(3..=50).contains(&username.len()) {
        return Err(AccountError::InvalidRegistration(
            "Username must be between 3 and 50 characters",
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(AccountError::InvalidRegistration(
            "Username may only contain letters, digits, underscores and hyphens",
        ));
    }

    if !(6..=128).contains(&password.len()) {
        return Err(AccountError::InvalidRegistration(
            "Password must be between 6 and 128 characters",
        ));
    }
    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !has_letter || !has_digit {
        return Err(AccountError::InvalidRegistration(
            "Password must contain at least one letter and one number",
        ));
    }

    Ok(username)
}
