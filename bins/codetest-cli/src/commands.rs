// CLI commands for running requests against the harness
use anyhow::{bail, Context, Result};
use codetest_common::config::{EngineKind, HarnessConfig};
use codetest_common::types::{CodeTestRequest, CodeTestResponse};
use codetest_harness::Harness;
use std::fs;
use std::path::Path;
use tracing::info;

/// Configured harness settings, with the engine optionally forced
fn load_config(engine: Option<EngineKind>) -> Result<HarnessConfig> {
    let mut config = HarnessConfig::load_default().context("Failed to load harness configuration")?;
    if let Some(engine) = engine {
        config.engine = engine;
    }
    Ok(config)
}

pub fn read_request(path: &Path, timeout_ms: Option<u64>) -> Result<CodeTestRequest> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file {}", path.display()))?;
    let mut request: CodeTestRequest = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse request file {}", path.display()))?;

    if timeout_ms.is_some() {
        request.timeout_ms = timeout_ms;
    }

    Ok(request)
}

/// Error out when strict mode is on and anything failed
pub fn check_strict(response: &CodeTestResponse, strict: bool) -> Result<()> {
    if strict && response.passed_tests != response.total_tests {
        bail!(
            "{} of {} test cases failed",
            response.total_tests - response.passed_tests,
            response.total_tests
        );
    }
    Ok(())
}

pub async fn run_request(
    request_path: &Path,
    engine: Option<EngineKind>,
    timeout_ms: Option<u64>,
    strict: bool,
) -> Result<()> {
    let request = read_request(request_path, timeout_ms)?;
    let config = load_config(engine)?;
    let harness = Harness::from_config(config).context("Failed to initialize execution engine")?;

    info!(test_count = request.test_cases.len(), "Evaluating {}", request_path.display());
    let response = harness.evaluate(&request).await;

    println!(
        "{}",
        serde_json::to_string_pretty(&response).context("Failed to serialize response")?
    );

    check_strict(&response, strict)
}

pub async fn probe(engine: Option<EngineKind>) -> Result<()> {
    let config = load_config(engine)?;
    let harness = Harness::from_config(config).context("Failed to initialize execution engine")?;

    for (language, version) in harness.probe().await.context("Engine probe failed")? {
        println!("✅ {}: {}", language, version);
    }

    Ok(())
}
