//! Stateless signed bearer credentials.

mod codec;

pub use codec::{Claims, CredentialCodec, CredentialError, Identity, CREDENTIAL_VALIDITY_SECS};
