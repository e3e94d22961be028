// Prometheus metrics for the evaluation endpoint

use codetest_common::types::CodeTestResponse;
use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref REQUESTS_EVALUATED: IntCounter = IntCounter::new(
        "codetest_requests_evaluated_total",
        "Code test requests evaluated"
    )
    .expect("Failed to create counter");
    pub static ref CASES_RUN: IntCounter =
        IntCounter::new("codetest_cases_run_total", "Test cases executed")
            .expect("Failed to create counter");
    pub static ref CASES_PASSED: IntCounter =
        IntCounter::new("codetest_cases_passed_total", "Test cases that passed")
            .expect("Failed to create counter");
    pub static ref EVALUATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "codetest_evaluation_duration_seconds",
            "Wall-clock time to evaluate one request"
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0])
    )
    .expect("Failed to create histogram");
}

/// Register all collectors; call once at startup
pub fn register() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(REQUESTS_EVALUATED.clone()))?;
    REGISTRY.register(Box::new(CASES_RUN.clone()))?;
    REGISTRY.register(Box::new(CASES_PASSED.clone()))?;
    REGISTRY.register(Box::new(EVALUATION_SECONDS.clone()))?;
    Ok(())
}

pub fn record(response: &CodeTestResponse, elapsed_secs: f64) {
    REQUESTS_EVALUATED.inc();
    CASES_RUN.inc_by(response.total_tests as u64);
    CASES_PASSED.inc_by(response.passed_tests as u64);
    EVALUATION_SECONDS.observe(elapsed_secs);
}

/// Text exposition of the registry
pub fn gather() -> Result<String, String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| e.to_string())?;
    String::from_utf8(buffer).map_err(|e| e.to_string())
}
