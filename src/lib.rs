//! Linkgate - Rate-Limited Authentication Gateway
//!
//! This crate implements the request-admission layer of a bookmark service:
//! per-client token-bucket rate limiting with idle eviction, stateless HMAC
//! signed credentials, and an authentication gate that forwards the verified
//! identity to the route handlers.

pub mod accounts;
pub mod config;
pub mod credential;
pub mod error;
pub mod http;
pub mod links;
pub mod ratelimit;
