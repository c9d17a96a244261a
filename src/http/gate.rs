//! Authentication gate: bearer credential verification and identity
//! propagation for protected routes.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

use super::rejection::Rejection;
use crate::credential::{CredentialCodec, Identity};

/// Forwarded identity headers, overwritten on every authenticated request.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USERNAME_HEADER: &str = "x-username";
pub const IS_ADMIN_HEADER: &str = "x-is-admin";

const HEADER_REQUIRED: &str = "Authorization header required";
const INVALID_FORMAT: &str = "Invalid authorization header format";
const INVALID_TOKEN: &str = "Invalid or expired token";

/// Extract the token from an `Authorization: Bearer <token>` header.
fn bearer_token(headers: &HeaderMap) -> Result<&str, Rejection> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(Rejection::Unauthenticated(HEADER_REQUIRED))?
        .to_str()
        .map_err(|_| Rejection::Unauthenticated(INVALID_FORMAT))?;

    if value.is_empty() {
        return Err(Rejection::Unauthenticated(HEADER_REQUIRED));
    }

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err(Rejection::Unauthenticated(INVALID_FORMAT)),
    }
}

fn forward_identity(headers: &mut HeaderMap, identity: &Identity) {
    headers.insert(USER_ID_HEADER, HeaderValue::from(identity.user_id));
    match HeaderValue::from_str(&identity.username) {
        Ok(username) => {
            headers.insert(USERNAME_HEADER, username);
        }
        Err(_) => {
            headers.remove(USERNAME_HEADER);
        }
    }
    headers.insert(
        IS_ADMIN_HEADER,
        HeaderValue::from_static(if identity.is_admin { "true" } else { "false" }),
    );
}

/// Middleware that admits only requests carrying a valid, unexpired bearer
/// credential.
///
/// On success the verified [`Identity`] is attached to the request
/// extensions and mirrored into the `X-User-ID`, `X-Username` and
/// `X-Is-Admin` headers, replacing anything the client sent under those
/// names.
pub async fn authenticate(
    State(codec): State<Arc<CredentialCodec>>,
    mut request: Request,
    next: Next,
) -> Result<Response, Rejection> {
    let claims = {
        let token = bearer_token(request.headers())?;
        codec.verify(token).map_err(|e| {
            debug!(error = %e, "Rejected credential");
            Rejection::Unauthenticated(INVALID_TOKEN)
        })?
    };

    let identity = claims.identity();
    debug!(user_id = identity.user_id, "Authenticated request");

    forward_identity(request.headers_mut(), &identity);
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Middleware for admin-only routes. Must run after [`authenticate`].
pub async fn require_admin(
    identity: Identity,
    request: Request,
    next: Next,
) -> Result<Response, Rejection> {
    if !identity.is_admin {
        debug!(user_id = identity.user_id, "Refused non-admin request");
        return Err(Rejection::Forbidden);
    }
    Ok(next.run(request).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = Rejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or(Rejection::Unauthenticated(HEADER_REQUIRED))
    }
}
