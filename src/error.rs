/// Error type for this crate.
#[derive(Debug, thiserror::Error)]
pub enum RatekeeperError {
    /// Redis transport or script error.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The store returned a reply the backend could not interpret.
    #[error("malformed script reply: {0}")]
    Decode(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),
}

/// Result type alias for ratekeeper operations.
pub type Result<T> = std::result::Result<T, RatekeeperError>;
