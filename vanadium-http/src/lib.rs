//! Vanadium HTTP - Discord REST API client with bucket rate limiting
#![deny(unsafe_code)]
//!
//! Requests are queued per rate limit bucket and dispatched in arrival
//! order under both the per-bucket and the global (50/s) limits. Bucket
//! hashes are learned from response headers; 429 responses are retried
//! from the head of their bucket's queue and server errors are retried
//! with backoff.

pub mod client;
pub mod error;
pub mod ratelimit;
pub mod route;
pub mod routes;

pub use client::{RequestOptions, RestClient, RestConfig};
pub use error::RestError;
pub use ratelimit::{Permit, RatelimitConfig, RatelimitHeaders, Ratelimiter};
pub use reqwest::Method;
pub use route::{MajorParameter, Route, OLD_MESSAGE_THRESHOLD_MS};
pub use routes::{GatewayBot, SessionStartLimit};
