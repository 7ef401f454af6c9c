use async_trait::async_trait;

use crate::{Decision, Result};

/// The decision contract upheld by every state backend.
///
/// One operation per algorithm, plus teardown. Implementations must
/// serialize decisions per key: the state observed by a later call reflects
/// all effects of every earlier call on the same key, across threads and
/// (for shared stores) across replicas.
///
/// Parameters that arrive non-positive make the operation return a zero
/// [`Decision`] without error. The HTTP validator rejects such inputs
/// before this layer; the no-op is a defensive contract, not an API.
#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    /// Token bucket: `capacity` tokens refilled at `refill_per_sec`,
    /// admission charges `cost` tokens.
    async fn token_bucket(
        &self,
        key: &str,
        capacity: i64,
        refill_per_sec: f64,
        cost: i64,
    ) -> Result<Decision>;

    /// Leaky bucket: `capacity` units of water draining at `leak_per_sec`,
    /// admission adds `cost` units.
    async fn leaky_bucket(
        &self,
        key: &str,
        capacity: i64,
        leak_per_sec: f64,
        cost: i64,
    ) -> Result<Decision>;

    /// Fixed window: at most `limit` admissions per epoch-aligned window of
    /// `window_ms` milliseconds.
    async fn fixed_window(
        &self,
        key: &str,
        limit: i64,
        window_ms: i64,
        cost: i64,
    ) -> Result<Decision>;

    /// Sliding window log: exact timestamps of the last `window_ms`
    /// milliseconds, at most `limit` of them.
    async fn sliding_window_log(
        &self,
        key: &str,
        limit: i64,
        window_ms: i64,
        cost: i64,
    ) -> Result<Decision>;

    /// Sliding window counter: previous window weighted by overlap plus the
    /// current window, compared against `limit`.
    async fn sliding_window_counter(
        &self,
        key: &str,
        limit: i64,
        window_ms: i64,
        cost: i64,
    ) -> Result<Decision>;

    /// Release backend resources. Safe to call once at shutdown.
    async fn close(&self) -> Result<()>;
}
