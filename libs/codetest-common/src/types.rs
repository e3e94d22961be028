use serde::{Deserialize, Serialize};
use std::fmt;

/// Languages the harness knows how to execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    JavaScript,
}

impl Language {
    /// Parse a declared language tag (case-insensitive)
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.to_lowercase().as_str() {
            "javascript" => Some(Language::JavaScript),
            _ => None,
        }
    }

    /// Human readable name used in diagnostics
    pub fn display_name(&self) -> &'static str {
        match self {
            Language::JavaScript => "JavaScript",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::JavaScript => write!(f, "javascript"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeTestRequest {
    pub code: String,
    pub language: String,
    pub test_cases: Vec<TestCase>,
    /// Per-case wall-clock bound; clamped to the configured maximum
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// When set, case inputs are JSON arguments passed to this function
    /// instead of expression source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestResult {
    pub passed: bool,
    pub expected: String,
    pub actual: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub input: Option<String>,
}

impl TestResult {
    /// Result for a case that failed before producing a value
    pub fn failed(test_case: &TestCase, error: impl Into<String>) -> Self {
        Self {
            passed: false,
            expected: test_case.expected_output.clone(),
            actual: String::new(),
            error: Some(error.into()),
            input: Some(test_case.input.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CodeTestResponse {
    pub results: Vec<TestResult>,
    /// Percentage of tests passed
    pub score: f64,
    pub total_tests: usize,
    pub passed_tests: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_parse() {
        assert_eq!(Language::parse("javascript"), Some(Language::JavaScript));
        assert_eq!(Language::parse("JavaScript"), Some(Language::JavaScript));
        assert_eq!(Language::parse("JAVASCRIPT"), Some(Language::JavaScript));
        assert_eq!(Language::parse("js"), None);
        assert_eq!(Language::parse("python"), None);
        assert_eq!(Language::JavaScript.to_string(), "javascript");
    }

    #[test]
    fn test_request_wire_format() {
        let payload = r#"{
            "code": "function add(a, b) { return a + b; }",
            "language": "javascript",
            "testCases": [
                {"input": "add(2, 2)", "expectedOutput": "4", "description": "small"},
                {"input": "add(1, 0)", "expectedOutput": "1"}
            ]
        }"#;

        let request: CodeTestRequest = serde_json::from_str(payload).unwrap();

        assert_eq!(request.test_cases.len(), 2);
        assert_eq!(request.test_cases[0].expected_output, "4");
        assert_eq!(request.test_cases[0].description.as_deref(), Some("small"));
        assert_eq!(request.test_cases[1].description, None);
        assert_eq!(request.timeout_ms, None);
        assert_eq!(request.entry_point, None);
    }

    #[test]
    fn test_response_wire_format() {
        let response = CodeTestResponse {
            results: vec![TestResult {
                passed: false,
                expected: "4".to_string(),
                actual: String::new(),
                error: Some("ReferenceError: add is not defined".to_string()),
                input: Some("add(2, 2)".to_string()),
            }],
            score: 0.0,
            total_tests: 1,
            passed_tests: 0,
        };

        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["totalTests"], 1);
        assert_eq!(value["passedTests"], 0);
        assert_eq!(value["results"][0]["error"], "ReferenceError: add is not defined");
        assert_eq!(value["results"][0]["actual"], "");
    }

    #[test]
    fn test_failed_result() {
        let case = TestCase {
            input: "1 + 1".to_string(),
            expected_output: "2".to_string(),
            description: None,
        };

        let failed = TestResult::failed(&case, "boom");
        assert!(!failed.passed);
        assert_eq!(failed.actual, "");
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert_eq!(failed.input.as_deref(), Some("1 + 1"));
    }
}
