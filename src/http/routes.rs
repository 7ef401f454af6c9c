use axum::Router;
use axum::routing::{get, post};

use crate::http::{AppState, check_handler, health_handler};

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/v1/limit/check", post(check_handler))
        .with_state(state)
}
