/// Test Evaluator - Normalization, Comparison and Scoring
///
/// **Core Responsibility:**
/// Turn what a program produced into the canonical string form, compare it
/// against the expected output and aggregate per-case results.
///
/// **Critical Properties:**
/// - Knows nothing about node or Docker
/// - Pure functions: (produced value, expected output) → verdict
///
/// **Comparison Rules:**
/// - Exact string equality after normalization
/// - No whitespace trimming, no numeric tolerance, no type coercion
/// - Case sensitive
///
/// **Normalization Rules:**
/// - Values arrive as their JSON text (`JSON.stringify` output)
/// - A lone string literal loses exactly one pair of surrounding quotes, so a
///   produced `"hello"` matches an expected `hello`
/// - Everything else, including arrays and objects holding strings, is
///   compared in full serialized form

use codetest_common::types::{CodeTestResponse, Language, TestCase, TestResult};

/// Canonical comparison form of a produced value
pub fn normalize(serialized: &str) -> String {
    if is_string_literal(serialized) {
        // Escapes stay as written; only the delimiters go
        serialized[1..serialized.len() - 1].to_string()
    } else {
        serialized.to_string()
    }
}

/// True only when the whole text is one well-formed JSON string literal
fn is_string_literal(serialized: &str) -> bool {
    serialized.len() >= 2
        && serialized.starts_with('"')
        && serialized.ends_with('"')
        && matches!(
            serde_json::from_str::<serde_json::Value>(serialized),
            Ok(serde_json::Value::String(_))
        )
}

/// Compare a produced value against the case's expectation
///
/// `None` means the value had no JSON form; it compares as the empty string.
pub fn evaluate_output(test_case: &TestCase, produced: Option<&str>) -> TestResult {
    let actual = produced.map(normalize).unwrap_or_default();

    TestResult {
        passed: actual == test_case.expected_output,
        expected: test_case.expected_output.clone(),
        actual,
        error: None,
        input: Some(test_case.input.clone()),
    }
}

/// Percentage of passing cases, 0 when there are none
pub fn score(passed_tests: usize, total_tests: usize) -> f64 {
    if total_tests == 0 {
        0.0
    } else {
        (passed_tests as f64 / total_tests as f64) * 100.0
    }
}

/// Aggregate per-case results into the final response
pub fn aggregate_results(results: Vec<TestResult>) -> CodeTestResponse {
    let total_tests = results.len();
    let passed_tests = results.iter().filter(|r| r.passed).count();

    CodeTestResponse {
        score: score(passed_tests, total_tests),
        total_tests,
        passed_tests,
        results,
    }
}

/// Response for a request in a language the harness cannot run
pub fn unsupported_language(language: &str) -> CodeTestResponse {
    aggregate_results(vec![TestResult {
        passed: false,
        expected: String::new(),
        actual: String::new(),
        error: Some(format!(
            "Language '{}' is not supported. Only {} is supported in this MVP.",
            language,
            Language::JavaScript.display_name()
        )),
        input: None,
    }])
}
