use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/test-javascript-code", post(handlers::test_code))
        .route("/status", get(handlers::health_check))
        .route("/metrics", get(handlers::get_metrics))
}
