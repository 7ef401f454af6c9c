use std::sync::Arc;

use async_trait::async_trait;
use redis::{Script, aio::ConnectionManager};

use crate::{Clock, Decision, RateLimitBackend, RatekeeperError, Result, SystemClock};

// Each script is the whole decision for one key: load, advance, admit,
// store, project. Redis evaluates it as an indivisible transaction, which is
// what makes decisions correct across replicas. Time is never read inside a
// script; the caller's clock snapshot arrives as an argument so that local
// and remote backends agree on `now`.

const TOKEN_BUCKET_LUA: &str = r#"
    local key = KEYS[1]
    local capacity = tonumber(ARGV[1])
    local refill = tonumber(ARGV[2])
    local cost = tonumber(ARGV[3])
    local now_ms = tonumber(ARGV[4])
    local ttl_ms = tonumber(ARGV[5])

    local tokens = tonumber(redis.call("HGET", key, "tokens"))
    local last_ms = tonumber(redis.call("HGET", key, "last_ms"))

    if tokens == nil then tokens = capacity end
    if last_ms == nil then last_ms = now_ms end

    if now_ms < last_ms then last_ms = now_ms end

    tokens = math.min(capacity, tokens + (now_ms - last_ms) / 1000 * refill)
    last_ms = now_ms

    local allowed = 0
    if tokens >= cost then
        allowed = 1
        tokens = tokens - cost
    end

    redis.call("HSET", key, "tokens", tokens, "last_ms", last_ms)
    redis.call("PEXPIRE", key, ttl_ms)

    local remaining = math.floor(tokens)
    local reset_at = now_ms + math.ceil(((capacity - tokens) / refill) * 1000)
    local retry_after = 0
    if allowed == 0 then
        retry_after = math.ceil(((cost - tokens) / refill) * 1000)
    end

    return {allowed, remaining, reset_at, retry_after}
"#;

const LEAKY_BUCKET_LUA: &str = r#"
    local key = KEYS[1]
    local capacity = tonumber(ARGV[1])
    local leak = tonumber(ARGV[2])
    local cost = tonumber(ARGV[3])
    local now_ms = tonumber(ARGV[4])
    local ttl_ms = tonumber(ARGV[5])

    local water = tonumber(redis.call("HGET", key, "water"))
    local last_ms = tonumber(redis.call("HGET", key, "last_ms"))

    if water == nil then water = 0 end
    if last_ms == nil then last_ms = now_ms end

    if now_ms < last_ms then last_ms = now_ms end

    water = math.max(0, water - (now_ms - last_ms) / 1000 * leak)
    last_ms = now_ms

    local allowed = 0
    if water + cost <= capacity then
        allowed = 1
        water = water + cost
    end

    redis.call("HSET", key, "water", water, "last_ms", last_ms)
    redis.call("PEXPIRE", key, ttl_ms)

    local remaining = math.floor(capacity - water)
    local reset_at = now_ms + math.ceil((water / leak) * 1000)
    local retry_after = 0
    if allowed == 0 then
        retry_after = math.ceil(((water + cost) - capacity) / leak * 1000)
    end

    return {allowed, remaining, reset_at, retry_after}
"#;

const FIXED_WINDOW_LUA: &str = r#"
    local base_key = KEYS[1]
    local limit = tonumber(ARGV[1])
    local window_ms = tonumber(ARGV[2])
    local cost = tonumber(ARGV[3])
    local now_ms = tonumber(ARGV[4])

    local window_start = now_ms - (now_ms % window_ms)
    local key = base_key .. ":" .. window_start
    local count = tonumber(redis.call("GET", key) or "0")

    local allowed = 0
    if count + cost <= limit then
        allowed = 1
        count = redis.call("INCRBY", key, cost)
    end
    redis.call("PEXPIRE", key, window_ms + 1000)

    local reset_at = window_start + window_ms
    local retry_after = 0
    if allowed == 0 then retry_after = reset_at - now_ms end

    return {allowed, limit - count, reset_at, retry_after, count}
"#;

const SLIDING_LOG_LUA: &str = r#"
    local key = KEYS[1]
    local seq_key = KEYS[2]
    local limit = tonumber(ARGV[1])
    local window_ms = tonumber(ARGV[2])
    local cost = tonumber(ARGV[3])
    local now_ms = tonumber(ARGV[4])

    local cutoff = now_ms - window_ms
    redis.call("ZREMRANGEBYSCORE", key, "-inf", cutoff)
    local count = redis.call("ZCARD", key)

    local allowed = 0
    if count + cost <= limit then
        allowed = 1
        for i = 1, cost do
            local seq = redis.call("INCR", seq_key)
            redis.call("ZADD", key, now_ms, now_ms .. ":" .. seq)
        end
        count = count + cost
    end

    redis.call("PEXPIRE", key, window_ms + 1000)
    redis.call("PEXPIRE", seq_key, window_ms + 1000)

    local reset_at = now_ms + window_ms
    if count > 0 then
        local oldest = redis.call("ZRANGE", key, 0, 0, "WITHSCORES")
        if oldest[2] ~= nil then
            reset_at = tonumber(oldest[2]) + window_ms
        end
    end

    local retry_after = 0
    if allowed == 0 then retry_after = reset_at - now_ms end

    return {allowed, limit - count, reset_at, retry_after, count}
"#;

const SLIDING_COUNTER_LUA: &str = r#"
    local base_key = KEYS[1]
    local limit = tonumber(ARGV[1])
    local window_ms = tonumber(ARGV[2])
    local cost = tonumber(ARGV[3])
    local now_ms = tonumber(ARGV[4])

    local current_start = now_ms - (now_ms % window_ms)
    local prev_start = current_start - window_ms

    local current_key = base_key .. ":" .. current_start
    local prev_key = base_key .. ":" .. prev_start

    local current_count = tonumber(redis.call("GET", current_key) or "0")
    local prev_count = tonumber(redis.call("GET", prev_key) or "0")

    local weight = (window_ms - (now_ms - current_start)) / window_ms
    local computed = prev_count * weight + current_count

    local allowed = 0
    if computed + cost <= limit then
        allowed = 1
        current_count = redis.call("INCRBY", current_key, cost)
        computed = computed + cost
    end

    redis.call("PEXPIRE", current_key, window_ms + 1000)
    redis.call("PEXPIRE", prev_key, window_ms + 1000)

    local remaining = math.floor(limit - computed)
    if remaining < 0 then remaining = 0 end

    local reset_at = current_start + window_ms
    local retry_after = 0
    if allowed == 0 then retry_after = reset_at - now_ms end

    return {allowed, remaining, reset_at, retry_after, current_count, math.ceil(computed)}
"#;

/// Shared-store backend over Redis.
///
/// Holds no limiter state of its own; every operation is one script
/// invocation against the multiplexed connection. A failure (connection
/// loss, script error, unreadable reply) surfaces as an error and is never
/// retried here: a retry could charge the limiter twice.
pub struct RedisBackend {
    connection: ConnectionManager,
    clock: Arc<dyn Clock>,
    token_bucket_script: Script,
    leaky_bucket_script: Script,
    fixed_window_script: Script,
    sliding_log_script: Script,
    sliding_counter_script: Script,
}

impl RedisBackend {
    /// Connect to Redis and verify the connection with a ping.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let mut connection = client.get_connection_manager().await?;
        let _: String = redis::cmd("PING").query_async(&mut connection).await?;
        Ok(Self::with_clock(connection, Arc::new(SystemClock)))
    }

    /// Backend over an existing connection with an injected clock.
    pub fn with_clock(connection: ConnectionManager, clock: Arc<dyn Clock>) -> Self {
        Self {
            connection,
            clock,
            token_bucket_script: Script::new(TOKEN_BUCKET_LUA),
            leaky_bucket_script: Script::new(LEAKY_BUCKET_LUA),
            fixed_window_script: Script::new(FIXED_WINDOW_LUA),
            sliding_log_script: Script::new(SLIDING_LOG_LUA),
            sliding_counter_script: Script::new(SLIDING_COUNTER_LUA),
        }
    }
}

#[async_trait]
impl RateLimitBackend for RedisBackend {
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
        let ttl_ms = bucket_ttl_ms(capacity, refill_per_sec);

        let mut connection = self.connection.clone();
        let reply: Vec<i64> = self
            .token_bucket_script
            .key(format!("tb:{key}"))
            .arg(capacity)
            .arg(refill_per_sec)
            .arg(cost)
            .arg(now_ms)
            .arg(ttl_ms)
            .invoke_async(&mut connection)
            .await?;

        decode_reply(reply)
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
        let ttl_ms = bucket_ttl_ms(capacity, leak_per_sec);

        let mut connection = self.connection.clone();
        let reply: Vec<i64> = self
            .leaky_bucket_script
            .key(format!("lb:{key}"))
            .arg(capacity)
            .arg(leak_per_sec)
            .arg(cost)
            .arg(now_ms)
            .arg(ttl_ms)
            .invoke_async(&mut connection)
            .await?;

        decode_reply(reply)
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

        let mut connection = self.connection.clone();
        let reply: Vec<i64> = self
            .fixed_window_script
            .key(format!("fw:{key}"))
            .arg(limit)
            .arg(window_ms)
            .arg(cost)
            .arg(now_ms)
            .invoke_async(&mut connection)
            .await?;

        decode_reply(reply)
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

        let mut connection = self.connection.clone();
        let reply: Vec<i64> = self
            .sliding_log_script
            .key(format!("swl:{key}"))
            .key(format!("swl:{key}:seq"))
            .arg(limit)
            .arg(window_ms)
            .arg(cost)
            .arg(now_ms)
            .invoke_async(&mut connection)
            .await?;

        decode_reply(reply)
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

        let mut connection = self.connection.clone();
        let reply: Vec<i64> = self
            .sliding_counter_script
            .key(format!("swc:{key}"))
            .arg(limit)
            .arg(window_ms)
            .arg(cost)
            .arg(now_ms)
            .invoke_async(&mut connection)
            .await?;

        decode_reply(reply)
    } // end method sliding_window_counter

    async fn close(&self) -> Result<()> {
        // The multiplexed connection closes when the last clone drops.
        Ok(())
    }
}

/// Longest interval over which a bucket key can still carry meaningful
/// state, plus a second of slack.
fn bucket_ttl_ms(capacity: i64, rate_per_sec: f64) -> i64 {
    ((capacity as f64 / rate_per_sec) * 1000.0).ceil() as i64 + 1000
}

fn decode_reply(values: Vec<i64>) -> Result<Decision> {
    if values.len() < 4 {
        return Err(RatekeeperError::Decode(format!(
            "expected at least 4 fields, got {}",
            values.len()
        )));
    }

    Ok(Decision {
        allowed: values[0] == 1,
        remaining: values[1],
        reset_at_ms: values[2],
        retry_after_ms: values[3],
        current_count: values.get(4).copied(),
        computed_count: values.get(5).copied(),
    })
}
