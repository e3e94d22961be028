/// Harness Orchestrator - High-Level Evaluation
///
/// **Responsibility:**
/// Turn a CodeTestRequest into a CodeTestResponse.
///
/// **Architecture:**
/// 1. Resolve the declared language to a context provider
/// 2. Use TestRunner to run each case in its own context (runner.rs)
/// 3. Use the evaluator to aggregate and score (evaluator.rs)
///
/// Cases run strictly one after another in submission order. Every failure
/// ends up inside the response; `evaluate` itself cannot fail.

use crate::engine::{build_provider, ContextProvider};
use crate::error::HarnessError;
use crate::evaluator;
use crate::runner::{InputMode, RunOptions, TestRunner};
use crate::script::EntryPoint;
use codetest_common::config::HarnessConfig;
use codetest_common::types::{CodeTestRequest, CodeTestResponse, Language, TestResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

pub struct Harness {
    config: HarnessConfig,
    providers: HashMap<Language, Arc<dyn ContextProvider>>,
}

impl Harness {
    /// Harness with no languages registered
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            providers: HashMap::new(),
        }
    }

    /// Harness with the configured backend registered for JavaScript
    pub fn from_config(config: HarnessConfig) -> Result<Self, HarnessError> {
        let provider = build_provider(&config)?;
        Ok(Self::new(config).with_provider(Language::JavaScript, provider))
    }

    pub fn with_provider(mut self, language: Language, provider: Arc<dyn ContextProvider>) -> Self {
        self.providers.insert(language, provider);
        self
    }

    pub fn provider(&self, language: Language) -> Option<&Arc<dyn ContextProvider>> {
        self.providers.get(&language)
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Probe every registered backend
    pub async fn probe(&self) -> Result<Vec<(Language, String)>, HarnessError> {
        let mut versions = Vec::with_capacity(self.providers.len());
        for (language, provider) in &self.providers {
            versions.push((*language, provider.probe().await?));
        }
        Ok(versions)
    }

    /// Evaluate a request against all of its test cases
    #[instrument(
        skip(self, request),
        fields(language = %request.language, test_count = request.test_cases.len())
    )]
    pub async fn evaluate(&self, request: &CodeTestRequest) -> CodeTestResponse {
        let provider = match Language::parse(&request.language).and_then(|language| self.provider(language)) {
            Some(provider) => provider,
            None => {
                warn!("Unsupported language requested");
                return evaluator::unsupported_language(&request.language);
            }
        };

        let mode = match request.entry_point.as_deref() {
            None => InputMode::Expression,
            Some(name) => match EntryPoint::parse(name) {
                Some(entry_point) => InputMode::Call(entry_point),
                None => {
                    warn!(entry_point = %name, "Rejected entry point");
                    let results = request
                        .test_cases
                        .iter()
                        .map(|tc| TestResult::failed(tc, format!("Invalid entry point: {}", name)))
                        .collect();
                    return evaluator::aggregate_results(results);
                }
            },
        };

        let timeout_ms = self.config.timeout_for(request.timeout_ms);
        let runner = TestRunner::new(
            provider.as_ref(),
            RunOptions {
                timeout: Duration::from_millis(timeout_ms),
                mode,
            },
        );

        info!(engine = provider.name(), timeout_ms = timeout_ms, "Starting evaluation");
        let start = Instant::now();

        let mut results = Vec::with_capacity(request.test_cases.len());
        for test_case in &request.test_cases {
            results.push(runner.run(&request.code, test_case).await);
        }

        let response = evaluator::aggregate_results(results);

        info!(
            passed_tests = response.passed_tests,
            total_tests = response.total_tests,
            score = response.score,
            execution_ms = start.elapsed().as_millis() as u64,
            "Evaluation complete"
        );

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Evaluation;
    use crate::runner::fakes::{Scripted, ScriptedProvider};
    use codetest_common::types::TestCase;
    use std::sync::atomic::Ordering;

    fn make_test_case(input: &str, expected_output: &str) -> TestCase {
        TestCase {
            input: input.to_string(),
            expected_output: expected_output.to_string(),
            description: None,
        }
    }

    fn make_request(language: &str, test_cases: Vec<TestCase>) -> CodeTestRequest {
        CodeTestRequest {
            code: "function add(a, b) { return a + b; }".to_string(),
            language: language.to_string(),
            test_cases,
            timeout_ms: None,
            entry_point: None,
        }
    }

    fn returned(json: &str) -> Scripted {
        Scripted::Eval(Evaluation::Returned(Some(json.to_string())))
    }

    fn harness_with(provider: ScriptedProvider) -> (Harness, Arc<ScriptedProvider>) {
        let provider = Arc::new(provider);
        let harness =
            Harness::new(HarnessConfig::default()).with_provider(Language::JavaScript, provider.clone());
        (harness, provider)
    }

    #[tokio::test]
    async fn test_unsupported_language() {
        let (harness, provider) = harness_with(ScriptedProvider::default());
        let request = make_request(
            "python",
            vec![make_test_case("1", "1"), make_test_case("2", "2"), make_test_case("3", "3")],
        );

        let response = harness.evaluate(&request).await;

        assert_eq!(response.total_tests, 1);
        assert_eq!(response.passed_tests, 0);
        assert_eq!(response.score, 0.0);
        assert_eq!(response.results.len(), 1);
        assert!(response.results[0].error.as_deref().unwrap().contains("'python'"));
        assert_eq!(provider.contexts_created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_language_tag_is_case_insensitive() {
        let (harness, _) = harness_with(ScriptedProvider::default().with("add(2, 2)", returned("4")));
        let request = make_request("JavaScript", vec![make_test_case("add(2, 2)", "4")]);

        let response = harness.evaluate(&request).await;

        assert_eq!(response.passed_tests, 1);
        assert_eq!(response.score, 100.0);
    }

    #[tokio::test]
    async fn test_unregistered_language_is_unsupported() {
        let harness = Harness::new(HarnessConfig::default());
        let request = make_request("javascript", vec![make_test_case("1", "1")]);

        let response = harness.evaluate(&request).await;

        assert_eq!(response.total_tests, 1);
        assert_eq!(response.passed_tests, 0);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_the_rest() {
        let (harness, provider) = harness_with(
            ScriptedProvider::default()
                .with("add(1, 1)", returned("2"))
                .with("explode()", Scripted::Eval(Evaluation::Threw("Error: boom".to_string())))
                .with("add(2, 3)", returned("5")),
        );
        let request = make_request(
            "javascript",
            vec![
                make_test_case("add(1, 1)", "2"),
                make_test_case("explode()", "0"),
                make_test_case("add(2, 3)", "5"),
            ],
        );

        let response = harness.evaluate(&request).await;

        assert_eq!(response.total_tests, 3);
        assert_eq!(response.passed_tests, 2);
        assert!((response.score - 66.67).abs() < 0.01);

        let inputs: Vec<_> = response.results.iter().map(|r| r.input.clone().unwrap()).collect();
        assert_eq!(inputs, vec!["add(1, 1)", "explode()", "add(2, 3)"]);

        assert!(response.results[0].passed);
        assert!(!response.results[1].passed);
        assert_eq!(response.results[1].actual, "");
        assert_eq!(response.results[1].error.as_deref(), Some("Error: boom"));
        assert!(response.results[2].passed);

        // One fresh context per case
        assert_eq!(provider.contexts_created.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_panic_and_harness_faults_are_contained() {
        let (harness, _) = harness_with(
            ScriptedProvider::default()
                .with("first", Scripted::Panic)
                .with("second", Scripted::Fail("garbled"))
                .with("third", returned("3")),
        );
        let request = make_request(
            "javascript",
            vec![
                make_test_case("first", "1"),
                make_test_case("second", "2"),
                make_test_case("third", "3"),
            ],
        );

        let response = harness.evaluate(&request).await;

        assert_eq!(response.total_tests, 3);
        assert_eq!(response.passed_tests, 1);
        assert!(response.results[0].error.as_deref().unwrap().starts_with("Harness error: "));
        assert!(response.results[1].error.as_deref().unwrap().starts_with("Harness error: "));
        assert!(response.results[2].passed);
    }

    #[tokio::test]
    async fn test_no_test_cases() {
        let (harness, _) = harness_with(ScriptedProvider::default());
        let request = make_request("javascript", Vec::new());

        let response = harness.evaluate(&request).await;

        assert_eq!(response.total_tests, 0);
        assert_eq!(response.passed_tests, 0);
        assert_eq!(response.score, 0.0);
        assert!(response.results.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_entry_point_fails_every_case() {
        let (harness, provider) = harness_with(ScriptedProvider::default());
        let mut request = make_request("javascript", vec![make_test_case("[1]", "1"), make_test_case("[2]", "2")]);
        request.entry_point = Some("add; process.exit()".to_string());

        let response = harness.evaluate(&request).await;

        assert_eq!(response.total_tests, 2);
        assert_eq!(response.passed_tests, 0);
        for result in &response.results {
            assert!(result.error.as_deref().unwrap().starts_with("Invalid entry point"));
        }
        assert_eq!(provider.contexts_created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_entry_point_mode() {
        let (harness, provider) = harness_with(
            ScriptedProvider::default().with(r#"add(...JSON.parse("[2,2]"))"#, returned("4")),
        );
        let mut request = make_request("javascript", vec![make_test_case("[2, 2]", "4")]);
        request.entry_point = Some("add".to_string());

        let response = harness.evaluate(&request).await;

        assert_eq!(response.passed_tests, 1);
        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].input, "[2, 2]");
    }

    #[tokio::test]
    async fn test_invariants_hold_for_mixed_outcomes() {
        let (harness, _) = harness_with(
            ScriptedProvider::default()
                .with("a", returned("1"))
                .with("b", returned(r#""x""#))
                .with("c", Scripted::Eval(Evaluation::TimedOut(5000)))
                .with("d", Scripted::Eval(Evaluation::Returned(None))),
        );
        let request = make_request(
            "javascript",
            vec![
                make_test_case("a", "1"),
                make_test_case("b", "x"),
                make_test_case("c", "1"),
                make_test_case("d", "1"),
                make_test_case("missing", "1"),
            ],
        );

        let response = harness.evaluate(&request).await;

        assert_eq!(response.results.len(), response.total_tests);
        assert_eq!(
            response.passed_tests,
            response.results.iter().filter(|r| r.passed).count()
        );
        assert_eq!(response.passed_tests, 2);
        assert!((response.score - 40.0).abs() < f64::EPSILON);
    }
}
