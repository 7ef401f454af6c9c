use serde::{Deserialize, Serialize};

/// Body of `POST /v1/limit/check`.
///
/// Every field is optional on the wire; absent fields take their zero
/// value and the validator decides what is actually required for the
/// chosen algorithm.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CheckRequest {
    pub key: String,
    pub user_id: String,
    pub device_id: String,
    pub jwt: String,
    pub algorithm: String,
    pub limit: i64,
    pub window_ms: i64,
    pub capacity: i64,
    pub refill_per_sec: f64,
    pub leak_per_sec: f64,
    pub cost: i64,
}

/// Body of a decision response.
#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub key: String,
    pub algorithm: String,
    pub allowed: bool,
    pub remaining: i64,
    pub reset_at_ms: i64,
    pub retry_after_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computed_count: Option<i64>,
}

/// Body of a 4xx/5xx response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
}
