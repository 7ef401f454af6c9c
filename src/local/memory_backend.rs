use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{Clock, Decision, RateLimitBackend, Result, SystemClock};

#[derive(Debug)]
struct TokenBucketState {
    tokens: f64,
    last_ms: i64,
}

#[derive(Debug)]
struct LeakyBucketState {
    water: f64,
    last_ms: i64,
}

#[derive(Debug)]
struct FixedWindowState {
    count: i64,
    window_start_ms: i64,
}

#[derive(Debug)]
struct SlidingCounterState {
    window_start_ms: i64,
    current_count: i64,
    prev_count: i64,
}

/// In-process backend: per-key state in sharded maps, one map per algorithm.
///
/// Each decision runs start to finish while holding the entry guard for its
/// key, so concurrent decisions on the same key are serialized. Distinct keys
/// only contend when they share a shard.
///
/// Keys are never evicted; the process is expected to be restart-managed.
pub struct MemoryBackend {
    clock: Arc<dyn Clock>,
    token_buckets: DashMap<String, TokenBucketState>,
    leaky_buckets: DashMap<String, LeakyBucketState>,
    fixed_windows: DashMap<String, FixedWindowState>,
    sliding_logs: DashMap<String, Vec<i64>>,
    sliding_counters: DashMap<String, SlidingCounterState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Backend with an injected clock. Tests drive time through this.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            token_buckets: DashMap::new(),
            leaky_buckets: DashMap::new(),
            fixed_windows: DashMap::new(),
            sliding_logs: DashMap::new(),
            sliding_counters: DashMap::new(),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimitBackend for MemoryBackend {
    async fn token_bucket(
        &self,
        key: &str,
        capacity: i64,
        refill_per_sec: f64,
        cost: i64,
    ) -> Result<Decision> {
        if capacity <= 0 || refill_per_sec <= 0.0 || cost <= 0 {
            return Ok(Decision::default());
        }
        let now_ms = self.clock.now_ms();

        let mut state = self
            .token_buckets
            .entry(key.to_owned())
            .or_insert_with(|| TokenBucketState {
                tokens: capacity as f64,
                last_ms: now_ms,
            });

        // Backward clock skew: clamp the reference point, never refill.
        if now_ms < state.last_ms {
            state.last_ms = now_ms;
        }

        let refill = (now_ms - state.last_ms) as f64 / 1000.0 * refill_per_sec;
        state.tokens = (state.tokens + refill).min(capacity as f64);
        state.last_ms = now_ms;

        let allowed = state.tokens >= cost as f64;
        if allowed {
            state.tokens -= cost as f64;
        }

        let remaining = state.tokens.floor() as i64;
        let reset_at_ms =
            now_ms + (((capacity as f64 - state.tokens) / refill_per_sec) * 1000.0).ceil() as i64;
        let retry_after_ms = if allowed {
            0
        } else {
            (((cost as f64 - state.tokens) / refill_per_sec) * 1000.0).ceil() as i64
        };

        Ok(Decision {
            allowed,
            remaining,
            reset_at_ms,
            retry_after_ms,
            current_count: None,
            computed_count: None,
        })
    } // end method token_bucket

    async fn leaky_bucket(
        &self,
        key: &str,
        capacity: i64,
        leak_per_sec: f64,
        cost: i64,
    ) -> Result<Decision> {
        if capacity <= 0 || leak_per_sec <= 0.0 || cost <= 0 {
            return Ok(Decision::default());
        }
        let now_ms = self.clock.now_ms();

        let mut state = self
            .leaky_buckets
            .entry(key.to_owned())
            .or_insert_with(|| LeakyBucketState {
                water: 0.0,
                last_ms: now_ms,
            });

        if now_ms < state.last_ms {
            state.last_ms = now_ms;
        }

        let leaked = (now_ms - state.last_ms) as f64 / 1000.0 * leak_per_sec;
        state.water = (state.water - leaked).max(0.0);
        state.last_ms = now_ms;

        let allowed = state.water + cost as f64 <= capacity as f64;
        if allowed {
            state.water += cost as f64;
        }

        let remaining = (capacity as f64 - state.water).floor() as i64;
        let reset_at_ms = now_ms + ((state.water / leak_per_sec) * 1000.0).ceil() as i64;
        let retry_after_ms = if allowed {
            0
        } else {
            let overflow = state.water + cost as f64 - capacity as f64;
            ((overflow / leak_per_sec) * 1000.0).ceil() as i64
        };

        Ok(Decision {
            allowed,
            remaining,
            reset_at_ms,
            retry_after_ms,
            current_count: None,
            computed_count: None,
        })
    } // end method leaky_bucket

    async fn fixed_window(
        &self,
        key: &str,
        limit: i64,
        window_ms: i64,
        cost: i64,
    ) -> Result<Decision> {
        if limit <= 0 || window_ms <= 0 || cost <= 0 {
            return Ok(Decision::default());
        }
        let now_ms = self.clock.now_ms();
        let window_start_ms = now_ms - now_ms % window_ms;

        let mut state = self
            .fixed_windows
            .entry(key.to_owned())
            .or_insert_with(|| FixedWindowState {
                count: 0,
                window_start_ms,
            });

        if now_ms - state.window_start_ms >= window_ms {
            state.count = 0;
            state.window_start_ms = window_start_ms;
        }

        let allowed = state.count + cost <= limit;
        if allowed {
            state.count += cost;
        }

        let reset_at_ms = state.window_start_ms + window_ms;
        let retry_after_ms = if allowed { 0 } else { reset_at_ms - now_ms };

        Ok(Decision {
            allowed,
            remaining: limit - state.count,
            reset_at_ms,
            retry_after_ms,
            current_count: Some(state.count),
            computed_count: None,
        })
    } // end method fixed_window

    async fn sliding_window_log(
        &self,
        key: &str,
        limit: i64,
        window_ms: i64,
        cost: i64,
    ) -> Result<Decision> {
        if limit <= 0 || window_ms <= 0 || cost <= 0 {
            return Ok(Decision::default());
        }
        let now_ms = self.clock.now_ms();
        let cutoff = now_ms - window_ms;

        let mut log = self.sliding_logs.entry(key.to_owned()).or_default();
        log.retain(|&ts| ts > cutoff);

        let allowed = log.len() as i64 + cost <= limit;
        if allowed {
            for _ in 0..cost {
                log.push(now_ms);
            }
        }

        let reset_at_ms = match log.first() {
            Some(&oldest) => oldest + window_ms,
            None => now_ms + window_ms,
        };
        let retry_after_ms = if allowed { 0 } else { reset_at_ms - now_ms };
        let count = log.len() as i64;

        Ok(Decision {
            allowed,
            remaining: limit - count,
            reset_at_ms,
            retry_after_ms,
            current_count: Some(count),
            computed_count: None,
        })
    } // end method sliding_window_log

    async fn sliding_window_counter(
        &self,
        key: &str,
        limit: i64,
        window_ms: i64,
        cost: i64,
    ) -> Result<Decision> {
        if limit <= 0 || window_ms <= 0 || cost <= 0 {
            return Ok(Decision::default());
        }
        let now_ms = self.clock.now_ms();
        let current_start_ms = now_ms - now_ms % window_ms;

        let mut state = self
            .sliding_counters
            .entry(key.to_owned())
            .or_insert_with(|| SlidingCounterState {
                window_start_ms: current_start_ms,
                current_count: 0,
                prev_count: 0,
            });

        if state.window_start_ms != current_start_ms {
            // The previous count carries over only across an adjacent
            // rollover; after a longer gap both windows are empty, matching
            // the TTL-evicted per-window keys of the remote backend.
            state.prev_count = if state.window_start_ms == current_start_ms - window_ms {
                state.current_count
            } else {
                0
            };
            state.current_count = 0;
            state.window_start_ms = current_start_ms;
        }

        let elapsed_ms = now_ms - current_start_ms;
        let weight = (window_ms - elapsed_ms) as f64 / window_ms as f64;
        let mut computed = state.prev_count as f64 * weight + state.current_count as f64;

        let allowed = computed + cost as f64 <= limit as f64;
        if allowed {
            state.current_count += cost;
            computed += cost as f64;
        }

        let reset_at_ms = current_start_ms + window_ms;
        let retry_after_ms = if allowed { 0 } else { reset_at_ms - now_ms };

        Ok(Decision {
            allowed,
            remaining: (limit as f64 - computed).floor().max(0.0) as i64,
            reset_at_ms,
            retry_after_ms,
            current_count: Some(state.current_count),
            computed_count: Some(computed.ceil() as i64),
        })
    } // end method sliding_window_counter

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
