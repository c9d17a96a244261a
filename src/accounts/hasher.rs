//! Argon2id password hashing.

use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;

use super::AccountError;

/// Salted Argon2id hashing in PHC string format.
///
/// Hashing is CPU bound, so both operations run on the blocking pool.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    /// Hasher with the Argon2 default cost (19 MiB, 2 passes, 1 lane).
    pub fn new() -> Self {
        Self {
            params: Params::default(),
        }
    }

    /// Hasher with explicit cost parameters.
    pub fn with_params(
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    ) -> Result<Self, AccountError> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| AccountError::Hashing(e.to_string()))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password with a fresh random salt.
    pub async fn hash(&self, password: String) -> Result<String, AccountError> {
        let argon2 = self.argon2();

        tokio::task::spawn_blocking(move || {
            let mut salt = [0u8; 16];
            rand::thread_rng().fill_bytes(&mut salt);
            let salt =
                SaltString::encode_b64(&salt).map_err(|e| AccountError::Hashing(e.to_string()))?;

            argon2
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| AccountError::Hashing(e.to_string()))
        })
        .await
        .map_err(|e| AccountError::Hashing(e.to_string()))?
    }

    /// Check a password against a stored PHC hash.
    pub async fn verify(&self, password: String, hash: String) -> Result<bool, AccountError> {
        let argon2 = self.argon2();

        tokio::task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&hash).map_err(|e| AccountError::Hashing(e.to_string()))?;
            Ok(argon2.verify_password(password.as_bytes(), &parsed).is_ok())
        })
        .await
        .map_err(|e| AccountError::Hashing(e.to_string()))?
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}
