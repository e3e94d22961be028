// HTTP route handlers for the codetest API

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use codetest_common::types::CodeTestRequest;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::metrics;
use crate::AppState;

/// POST /test-javascript-code - Run submitted code against its test cases
///
/// Every outcome, including unsupported languages and crashed cases, is
/// reported inside the response body.
pub async fn test_code(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CodeTestRequest>,
) -> impl IntoResponse {
    let start = Instant::now();
    let response = state.harness.evaluate(&payload).await;
    let elapsed = start.elapsed();

    metrics::record(&response, elapsed.as_secs_f64());
    info!(
        passed_tests = response.passed_tests,
        total_tests = response.total_tests,
        elapsed_ms = elapsed.as_millis() as u64,
        "Request evaluated"
    );

    (StatusCode::OK, Json(response))
}

/// GET /status - Health check
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus text exposition
pub async fn get_metrics() -> impl IntoResponse {
    match metrics::gather() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}
