// Harness configuration
// Loaded from config/harness.json when present, then overridden from CODETEST_* env vars

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/harness.json";

/// Safety limits applied before anything reaches an interpreter
pub const MAX_SOURCE_CODE_BYTES: usize = 64 * 1024;
pub const MAX_TEST_INPUT_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Which backend creates execution contexts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Node,
    Docker,
}

impl EngineKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "node" => Some(EngineKind::Node),
            "docker" => Some(EngineKind::Docker),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub engine: EngineKind,
    pub node_binary: String,
    pub docker_image: String,
    pub default_timeout_ms: u64,
    pub max_timeout_ms: u64,
    pub memory_limit_mb: u32,
    pub cpu_limit: f32,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::Node,
            node_binary: "node".to_string(),
            docker_image: "node:20-alpine".to_string(),
            default_timeout_ms: 5000,
            max_timeout_ms: 30_000,
            memory_limit_mb: 256,
            cpu_limit: 0.5,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a JSON file
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        let path = config_path.display().to_string();
        let content = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse { path, source })
    }

    /// Load config/harness.json if it exists, defaults otherwise, then apply env overrides
    pub fn load_default() -> Result<Self, ConfigError> {
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        let config = if default_path.exists() {
            Self::load(default_path)?
        } else {
            Self::default()
        };

        config.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply CODETEST_* overrides from an arbitrary lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("CODETEST_ENGINE") {
            self.engine = EngineKind::parse(&value).ok_or_else(|| invalid("CODETEST_ENGINE", &value))?;
        }
        if let Some(value) = lookup("CODETEST_NODE_BINARY") {
            self.node_binary = value;
        }
        if let Some(value) = lookup("CODETEST_DOCKER_IMAGE") {
            self.docker_image = value;
        }
        if let Some(value) = lookup("CODETEST_TIMEOUT_MS") {
            self.default_timeout_ms = parse_number("CODETEST_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("CODETEST_MAX_TIMEOUT_MS") {
            self.max_timeout_ms = parse_number("CODETEST_MAX_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("CODETEST_MEMORY_LIMIT_MB") {
            self.memory_limit_mb = parse_number("CODETEST_MEMORY_LIMIT_MB", &value)?;
        }
        if let Some(value) = lookup("CODETEST_CPU_LIMIT") {
            self.cpu_limit = parse_number("CODETEST_CPU_LIMIT", &value)?;
        }

        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_timeout_ms == 0 {
            return Err(invalid("default_timeout_ms", "0"));
        }
        if self.max_timeout_ms < self.default_timeout_ms {
            return Err(invalid("max_timeout_ms", &self.max_timeout_ms.to_string()));
        }
        if self.memory_limit_mb == 0 {
            return Err(invalid("memory_limit_mb", "0"));
        }
        if self.cpu_limit.is_nan() || self.cpu_limit <= 0.0 {
            return Err(invalid("cpu_limit", &self.cpu_limit.to_string()));
        }
        Ok(())
    }

    /// Effective per-case timeout for a request
    pub fn timeout_for(&self, requested_ms: Option<u64>) -> u64 {
        match requested_ms {
            Some(0) | None => self.default_timeout_ms,
            Some(ms) => ms.min(self.max_timeout_ms),
        }
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}
