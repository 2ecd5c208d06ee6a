//! Vigil Network Layer
//!
//! Provides the resilient transport every provider adapter goes through:
//! - Adaptive per-source rate limiting with server feedback
//! - TTL response caching keyed by request fingerprint
//! - Proxy rotation
//! - Retry with backoff on throttling and transient network failure

pub mod cache;
pub mod config;
pub mod proxy;
pub mod rate;
pub mod transport;

pub use cache::*;
pub use config::*;
pub use proxy::*;
pub use rate::*;
pub use transport::*;
