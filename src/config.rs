//! Runtime configuration, read from the environment.

use std::env;

/// Which state backend serves decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    Redis,
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub backend: BackendKind,
    pub redis_addr: String,
    pub redis_password: String,
    pub redis_db: i64,
}

impl Config {
    /// Read configuration from the environment, falling back to defaults for
    /// unset or malformed values.
    pub fn from_env() -> Self {
        Self {
            port: env_or("PORT", "8080").parse().unwrap_or(8080),
            backend: match env_or("BACKEND", "memory").as_str() {
                "redis" => BackendKind::Redis,
                _ => BackendKind::Memory,
            },
            redis_addr: env_or("REDIS_ADDR", "127.0.0.1:6379"),
            redis_password: env_or("REDIS_PASSWORD", ""),
            redis_db: env_or("REDIS_DB", "0").parse().unwrap_or(0),
        }
    }

    /// Connection URL for the configured Redis address and database.
    pub fn redis_url(&self) -> String {
        if self.redis_password.is_empty() {
            format!("redis://{}/{}", self.redis_addr, self.redis_db)
        } else {
            format!(
                "redis://:{}@{}/{}",
                self.redis_password, self.redis_addr, self.redis_db
            )
        }
    }
}

fn env_or(key: &str, fallback: &str) -> String {
    env::var(key)
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}
