//! Admission filter: per-client rate limiting in front of the handlers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use super::rejection::Rejection;
use crate::ratelimit::VisitorRegistry;

const FORWARDED_FOR: &str = "x-forwarded-for";
const REAL_IP: &str = "x-real-ip";
const UNKNOWN_CLIENT: &str = "unknown";

/// Identify the client a request should be counted against.
///
/// Prefers `X-Forwarded-For`, then `X-Real-IP`, then the peer address. The
/// first non-empty value is used verbatim.
pub fn client_id(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> String {
    [FORWARDED_FOR, REAL_IP]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|ConnectInfo(addr)| addr.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Middleware that spends one token from the client's bucket, refusing the
/// request with `429` when the bucket is empty.
pub async fn admit(
    State(registry): State<Arc<VisitorRegistry>>,
    request: Request,
    next: Next,
) -> Result<Response, Rejection> {
    let client = client_id(
        request.headers(),
        request.extensions().get::<ConnectInfo<SocketAddr>>(),
    );

    if !registry.check(&client) {
        return Err(Rejection::RateLimited);
    }
    Ok(next.run(request).await)
}
