//! HS256 signed credential issuance and verification.
//!
//! A credential is `base64url(header) "." base64url(claims) "." base64url(mac)`
//! where `mac` is HMAC-SHA256 over the first two segments joined by `.`.
//! All segments use the URL-safe alphabet without padding.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// How long an issued credential stays valid, in seconds (24 hours).
pub const CREDENTIAL_VALIDITY_SECS: i64 = 24 * 60 * 60;

/// Errors produced while issuing or verifying a credential.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    /// Wrong number of segments or an undecodable claims segment
    #[error("malformed credential")]
    Malformed,

    /// Signature does not match the header and claims
    #[error("invalid credential signature")]
    InvalidSignature,

    /// Signature is valid but the expiry has passed
    #[error("credential expired")]
    Expired,

    /// The signing key cannot be used
    #[error("invalid signing key: {0}")]
    InvalidKey(&'static str),

    /// Claims could not be serialized
    #[error("failed to encode claims: {0}")]
    Encoding(String),
}

/// The authenticated subject a credential speaks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: i64,
    pub username: String,
    pub is_admin: bool,
}

/// Claims carried inside a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub username: String,
    pub is_admin: bool,
    /// Expiry as Unix seconds
    pub exp: i64,
}

impl Claims {
    /// Claims for `identity` expiring at `exp`.
    pub fn new(identity: &Identity, exp: i64) -> Self {
        Self {
            user_id: identity.user_id,
            username: identity.username.clone(),
            is_admin: identity.is_admin,
            exp,
        }
    }

    /// The identity these claims describe.
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.user_id,
            username: self.username.clone(),
            is_admin: self.is_admin,
        }
    }
}

#[derive(Serialize)]
struct Header {
    alg: &'static str,
    typ: &'static str,
}

const HEADER: Header = Header {
    alg: "HS256",
    typ: "JWT",
};

/// Issues and verifies signed credentials with one process-wide secret.
///
/// The key is fixed at construction and only read afterwards, so a codec can
/// be shared across tasks behind an `Arc` without locking.
#[derive(Clone)]
pub struct CredentialCodec {
    /// HMAC keyed with the secret, cloned for every signature
    mac: HmacSha256,
    /// The constant header segment
    encoded_header: String,
}

impl CredentialCodec {
    /// Create a codec for the given secret.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, CredentialError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(CredentialError::InvalidKey("secret must not be empty"));
        }

        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|_| CredentialError::InvalidKey("unsupported key length"))?;
        let header =
            serde_json::to_vec(&HEADER).map_err(|e| CredentialError::Encoding(e.to_string()))?;

        Ok(Self {
            mac,
            encoded_header: URL_SAFE_NO_PAD.encode(header),
        })
    }

    /// Issue a credential for `identity` valid for 24 hours from now.
    pub fn issue(&self, identity: &Identity) -> Result<String, CredentialError> {
        self.issue_at(identity, Utc::now().timestamp())
    }

    /// Issue a credential for `identity` as if the current time were `issued_at`.
    pub fn issue_at(&self, identity: &Identity, issued_at: i64) -> Result<String, CredentialError> {
        let exp = issued_at
            .checked_add(CREDENTIAL_VALIDITY_SECS)
            .ok_or_else(|| CredentialError::Encoding("issue time out of range".to_string()))?;
        let claims = Claims::new(identity, exp);
        self.sign(&claims)
    }

    /// Encode and sign arbitrary claims.
    pub fn sign(&self, claims: &Claims) -> Result<String, CredentialError> {
        let payload =
            serde_json::to_vec(claims).map_err(|e| CredentialError::Encoding(e.to_string()))?;

        let signing_input = format!("{}.{}", self.encoded_header, URL_SAFE_NO_PAD.encode(payload));
        let signature = URL_SAFE_NO_PAD.encode(self.signature(signing_input.as_bytes()));

        Ok(format!("{}.{}", signing_input, signature))
    }

    /// Verify a credential against the current time.
    pub fn verify(&self, token: &str) -> Result<Claims, CredentialError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Verify a credential as if the current time were `now`.
    ///
    /// The signature is checked before the claims are decoded, and expiry
    /// only after both.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claims, CredentialError> {
        let parts: Vec<&str> = token.split('.').collect();
        let &[header, payload, signature] = parts.as_slice() else {
            return Err(CredentialError::Malformed);
        };

        let provided = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| CredentialError::InvalidSignature)?;
        let signing_input = &token[..header.len() + 1 + payload.len()];
        let expected = self.signature(signing_input.as_bytes());

        if !bool::from(expected.as_slice().ct_eq(provided.as_slice())) {
            return Err(CredentialError::InvalidSignature);
        }

        let claims_json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| CredentialError::Malformed)?;
        let claims: Claims =
            serde_json::from_slice(&claims_json).map_err(|_| CredentialError::Malformed)?;

        if now >= claims.exp {
            return Err(CredentialError::Expired);
        }

        Ok(claims)
    }

    fn signature(&self, signing_input: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(signing_input);
        mac.finalize().into_bytes().to_vec()
    }
}

impl std::fmt::Debug for CredentialCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCodec")
            .field("algorithm", &HEADER.alg)
            .finish_non_exhaustive()
    }
}
