//! Ratekeeper is a rate-limit decision service.
//!
//! Five algorithms (token bucket, leaky bucket, fixed window, sliding window
//! log, sliding window counter) answer one question per request: is one more
//! unit of work admitted for this key right now, and when will capacity next
//! be available? The same contract is upheld by two interchangeable state
//! backends:
//!
//! - [`MemoryBackend`]: process-local state, per-key serializability through
//!   sharded map guards.
//! - [`RedisBackend`]: shared state, one atomically evaluated script per
//!   decision.
//!
//! # Quick start
//!
//! ```rust
//! use ratekeeper::{MemoryBackend, RateLimitBackend};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = MemoryBackend::new();
//!
//!     let decision = backend
//!         .token_bucket("user:123", /*capacity=*/ 10, /*refill_per_sec=*/ 5.0, /*cost=*/ 1)
//!         .await
//!         .unwrap();
//!
//!     assert!(decision.allowed);
//! }
//! ```

mod backend;
pub use backend::*;

mod clock;
pub use clock::*;

mod config;
pub use config::*;

mod decision;
pub use decision::*;

mod error;
pub use error::*;

pub mod http;

mod local;
pub use local::*;

mod remote;
pub use remote::*;

#[cfg(test)]
mod tests;
