use serde::Serialize;

/// The uniform result of every rate limit decision.
///
/// A pure value; the caller owns it. `current_count` is populated by the
/// window algorithms, `computed_count` only by the sliding-window counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// Whether this unit of work is admitted.
    pub allowed: bool,
    /// Admissions (or whole tokens) that would still succeed right now.
    pub remaining: i64,
    /// Wall-clock millisecond time at which capacity is projected to be
    /// full again, or the window to roll over.
    pub reset_at_ms: i64,
    /// Milliseconds until the current request would succeed; 0 when allowed.
    pub retry_after_ms: i64,
    /// Occupancy of the current window (window algorithms only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_count: Option<i64>,
    /// Weighted effective occupancy (sliding-window counter only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computed_count: Option<i64>,
}
