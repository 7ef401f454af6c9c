use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{debug, error};

use crate::http::{CheckRequest, CheckResponse, ErrorResponse};
use crate::{Decision, RateLimitBackend};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn RateLimitBackend>,
}

pub async fn health_handler() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Validate, normalize, and dispatch one decision request.
///
/// The body is taken raw so that malformed JSON maps to the
/// `invalid_json` error code rather than a framework rejection.
pub async fn check_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let Ok(mut req) = serde_json::from_str::<CheckRequest>(&body) else {
        return bad_request("invalid_json");
    };

    req.algorithm = req.algorithm.trim().to_lowercase();
    req.key = req.key.trim().to_owned();
    req.user_id = req.user_id.trim().to_owned();
    req.device_id = req.device_id.trim().to_owned();
    req.jwt = req.jwt.trim().to_owned();
    if req.jwt.is_empty() {
        req.jwt = bearer_token(&headers);
    }
    if req.key.is_empty() {
        req.key = derive_key(&req);
    }
    if req.key.is_empty() || req.algorithm.is_empty() {
        return bad_request("key_and_algorithm_required");
    }
    if req.cost == 0 {
        req.cost = 1;
    }

    let outcome = match req.algorithm.as_str() {
        "token_bucket" => {
            if req.capacity <= 0 || req.refill_per_sec <= 0.0 {
                return bad_request("capacity_and_refill_per_sec_required");
            }
            state
                .backend
                .token_bucket(&req.key, req.capacity, req.refill_per_sec, req.cost)
                .await
        }
        "leaky_bucket" => {
            if req.capacity <= 0 || req.leak_per_sec <= 0.0 {
                return bad_request("capacity_and_leak_per_sec_required");
            }
            state
                .backend
                .leaky_bucket(&req.key, req.capacity, req.leak_per_sec, req.cost)
                .await
        }
        "fixed_window" => {
            if req.limit <= 0 || req.window_ms <= 0 {
                return bad_request("limit_and_window_ms_required");
            }
            state
                .backend
                .fixed_window(&req.key, req.limit, req.window_ms, req.cost)
                .await
        }
        "sliding_window_log" => {
            if req.limit <= 0 || req.window_ms <= 0 {
                return bad_request("limit_and_window_ms_required");
            }
            state
                .backend
                .sliding_window_log(&req.key, req.limit, req.window_ms, req.cost)
                .await
        }
        "sliding_window_counter" => {
            if req.limit <= 0 || req.window_ms <= 0 {
                return bad_request("limit_and_window_ms_required");
            }
            state
                .backend
                .sliding_window_counter(&req.key, req.limit, req.window_ms, req.cost)
                .await
        }
        _ => return bad_request("unsupported_algorithm"),
    };

    let decision = match outcome {
        Ok(decision) => decision,
        Err(err) => {
            error!(error = %err, key = %req.key, algorithm = %req.algorithm, "backend decision failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "backend_error",
                }),
            )
                .into_response();
        }
    };

    decision_response(req, decision)
} // end handler check_handler

fn decision_response(req: CheckRequest, decision: Decision) -> Response {
    let status = if decision.allowed {
        StatusCode::OK
    } else {
        debug!(
            key = %req.key,
            algorithm = %req.algorithm,
            retry_after_ms = decision.retry_after_ms,
            "request denied"
        );
        StatusCode::TOO_MANY_REQUESTS
    };

    let mut headers = HeaderMap::new();
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert("x-ratelimit-reset-ms", HeaderValue::from(decision.reset_at_ms));
    headers.insert(
        "x-ratelimit-retry-after-ms",
        HeaderValue::from(decision.retry_after_ms),
    );

    let body = Json(CheckResponse {
        key: req.key,
        algorithm: req.algorithm,
        allowed: decision.allowed,
        remaining: decision.remaining,
        reset_at_ms: decision.reset_at_ms,
        retry_after_ms: decision.retry_after_ms,
        current_count: decision.current_count,
        computed_count: decision.computed_count,
    });

    (status, headers, body).into_response()
}

fn bad_request(code: &'static str) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: code })).into_response()
}

/// Derive a limiter key from identity fields, in precedence order:
/// user id, device id, then a hash of the JWT. Tokens are hashed for
/// keying only, never verified.
pub(crate) fn derive_key(req: &CheckRequest) -> String {
    if !req.user_id.is_empty() {
        format!("user:{}", req.user_id)
    } else if !req.device_id.is_empty() {
        format!("device:{}", req.device_id)
    } else if !req.jwt.is_empty() {
        format!("jwt:{}", sha256_hex(&req.jwt))
    } else {
        String::new()
    }
}

/// Extract a bearer token from an `Authorization` header value, if any.
pub(crate) fn bearer_token(headers: &HeaderMap) -> String {
    let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return String::new();
    };

    let mut parts = value.trim().splitn(2, ' ');
    match (parts.next(), parts.next()) {
        (Some(scheme), Some(token)) if scheme.eq_ignore_ascii_case("bearer") => {
            token.trim().to_owned()
        }
        _ => String::new(),
    }
}

pub(crate) fn sha256_hex(input: &str) -> String {
    use sha2::{Digest, Sha256};
    use std::fmt::Write;

    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hasher
        .finalize()
        .iter()
        .fold(String::with_capacity(64), |mut acc, byte| {
            let _ = write!(acc, "{byte:02x}");
            acc
        })
}
