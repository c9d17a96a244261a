//! In-process account store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::info;

use super::{Account, AccountError, AccountStore, PasswordHasher};

struct StoredAccount {
    account: Account,
    password_hash: String,
}

struct Accounts {
    by_username: HashMap<String, StoredAccount>,
    next_id: i64,
}

/// Accounts kept in memory for the lifetime of the process.
pub struct MemoryAccountStore {
    accounts: RwLock<Accounts>,
    hasher: PasswordHasher,
}

impl MemoryAccountStore {
    /// Create an empty store.
    pub fn new(hasher: PasswordHasher) -> Self {
        Self {
            accounts: RwLock::new(Accounts {
                by_username: HashMap::new(),
                next_id: 1,
            }),
            hasher,
        }
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn create(
        &self,
        username: &str,
        password: &str,
        is_admin: bool,
    ) -> Result<Account, AccountError> {
        if self.accounts.read().by_username.contains_key(username) {
            return Err(AccountError::UsernameTaken);
        }

        let password_hash = self.hasher.hash(password.to_string()).await?;

        let mut accounts = self.accounts.write();
        // Re-check: a concurrent registration may have won while hashing
        if accounts.by_username.contains_key(username) {
            return Err(AccountError::UsernameTaken);
        }

        let account = Account {
            id: accounts.next_id,
            username: username.to_string(),
            is_admin,
            created_at: Utc::now(),
        };
        accounts.next_id += 1;
        accounts.by_username.insert(
            username.to_string(),
            StoredAccount {
                account: account.clone(),
                password_hash,
            },
        );

        info!(user_id = account.id, username = %account.username, is_admin, "Created account");
        Ok(account)
    }

    async fn authenticate(&self, username: &str, password: &str) -> Result<Account, AccountError> {
        let (account, password_hash) = {
            let accounts = self.accounts.read();
            let stored = accounts
                .by_username
                .get(username)
                .ok_or(AccountError::InvalidCredentials)?;
            (stored.account.clone(), stored.password_hash.clone())
        };

        if self.hasher.verify(password.to_string(), password_hash).await? {
            Ok(account)
        } else {
            Err(AccountError::InvalidCredentials)
        }
    }

    async fn list(&self) -> Vec<Account> {
        let mut accounts: Vec<Account> = self
            .accounts
            .read()
            .by_username
            .values()
            .map(|stored| stored.account.clone())
            .collect();
        accounts.sort_by_key(|account| account.id);
        accounts
    }

    async fn set_admin(&self, id: i64, is_admin: bool) -> Option<Account> {
        let mut accounts = self.accounts.write();
        let stored = accounts
            .by_username
            .values_mut()
            .find(|stored| stored.account.id == id)?;

        stored.account.is_admin = is_admin;
        info!(user_id = id, is_admin, "Changed admin flag");
        Some(stored.account.clone())
    }

    async fn delete(&self, id: i64) -> bool {
        let mut accounts = self.accounts.write();
        let before = accounts.by_username.len();
        accounts
            .by_username
            .retain(|_, stored| stored.account.id != id);

        let removed = accounts.by_username.len() < before;
        if removed {
            info!(user_id = id, "Deleted account");
        }
        removed
    }
}
