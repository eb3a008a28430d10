//! HTTP integration.
//!
//! [`RateLimitLayer`] puts any [`RateLimiter`](crate::ratelimit::RateLimiter)
//! in front of an axum router, answering rejected requests with
//! `429 Too Many Requests`. [`require_api_key`] identifies callers by their
//! `Api-Key` header so limits can be applied per key.

mod auth;
mod layer;

pub use auth::{api_key_of, require_api_key, ApiKey, API_KEY_HEADER};
pub use layer::{RateLimitLayer, RateLimitMiddleware};
