/// Execution Engine - Abstraction for Code Execution
///
/// **Core Responsibility:**
/// Hand out fresh, disposable execution contexts and run one bound program
/// in each, reporting what the program produced.
///
/// **Critical Architectural Boundary:**
/// - Engine knows HOW to execute (local node process, Docker container)
/// - Engine does NOT compare outputs or score
/// - A context runs exactly one program and is dropped afterwards
///
/// Production uses NodeEngine; DockerEngine trades startup time for
/// container-level resource isolation.

use crate::docker::DockerEngine;
use crate::error::HarnessError;
use crate::script::{self, Program};
use async_trait::async_trait;
use codetest_common::config::{EngineKind, HarnessConfig};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// What happened when a context ran a program
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// The program produced a value; holds its JSON text, or
    /// `None` when the value has no JSON form (`undefined`, functions)
    Returned(Option<String>),
    /// Candidate code raised (syntax error, thrown value, type error)
    Threw(String),
    /// Wall-clock bound exceeded; holds the bound in milliseconds
    TimedOut(u64),
    /// The interpreter went away without reporting
    Aborted(String),
}

/// One isolated evaluation environment
#[async_trait]
pub trait ExecutionContext: Send {
    /// Run the program once. Contexts are single-use.
    async fn execute(&mut self, program: &Program, timeout: Duration) -> Result<Evaluation, HarnessError>;
}

/// Factory for execution contexts
#[async_trait]
pub trait ContextProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Create a context sharing no state with any earlier one
    async fn create_context(&self) -> Result<Box<dyn ExecutionContext>, HarnessError>;

    /// Check the interpreter is usable; returns a version description
    async fn probe(&self) -> Result<String, HarnessError>;
}

/// Build the provider selected by configuration
pub fn build_provider(config: &HarnessConfig) -> Result<Arc<dyn ContextProvider>, HarnessError> {
    match config.engine {
        EngineKind::Node => Ok(Arc::new(NodeEngine::new(&config.node_binary, config.memory_limit_mb))),
        EngineKind::Docker => Ok(Arc::new(DockerEngine::new_with_config(config)?)),
    }
}

/// Fresh marker per context so candidate output cannot forge a report
pub(crate) fn report_marker() -> String {
    format!("__CODETEST_REPORT_{}__", uuid::Uuid::new_v4().simple())
}

/// Local `node` process per context
///
/// Each context is a newly spawned `node -` reading its program from stdin,
/// with a cleared environment, a private temporary working directory and a
/// capped V8 heap. The process is killed if the context is dropped early.
pub struct NodeEngine {
    node_binary: String,
    memory_limit_mb: u32,
}

impl NodeEngine {
    pub fn new(node_binary: &str, memory_limit_mb: u32) -> Self {
        Self {
            node_binary: node_binary.to_string(),
            memory_limit_mb,
        }
    }

    fn base_command(&self) -> Command {
        // Preserve PATH so a bare binary name still resolves
        let path_env = std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/usr/local/bin:/bin".to_string());

        let mut command = Command::new(&self.node_binary);
        command
            .env_clear()
            .env("PATH", path_env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl ContextProvider for NodeEngine {
    fn name(&self) -> &'static str {
        "node"
    }

    async fn create_context(&self) -> Result<Box<dyn ExecutionContext>, HarnessError> {
        let workdir = tempfile::tempdir()
            .map_err(|e| HarnessError::ContextCreation(format!("failed to create working directory: {}", e)))?;

        let child = self
            .base_command()
            .arg(format!("--max-old-space-size={}", self.memory_limit_mb))
            .arg("-")
            .current_dir(workdir.path())
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|e| HarnessError::ContextCreation(format!("failed to spawn '{}': {}", self.node_binary, e)))?;

        debug!(pid = child.id(), "Spawned node context");

        Ok(Box::new(NodeContext {
            child: Some(child),
            marker: report_marker(),
            _workdir: workdir,
        }))
    }

    async fn probe(&self) -> Result<String, HarnessError> {
        let child = self
            .base_command()
            .arg("--version")
            .spawn()
            .map_err(|e| HarnessError::ContextCreation(format!("failed to spawn '{}': {}", self.node_binary, e)))?;

        let output = tokio::time::timeout(Duration::from_secs(10), child.wait_with_output())
            .await
            .map_err(|_| HarnessError::ContextCreation("node --version timed out".to_string()))??;

        if !output.status.success() {
            return Err(HarnessError::ContextCreation(format!(
                "node --version exited with {}",
                output.status
            )));
        }

        Ok(format!("node {}", String::from_utf8_lossy(&output.stdout).trim()))
    }
}

struct NodeContext {
    child: Option<Child>,
    marker: String,
    // Removed when the context is dropped
    _workdir: tempfile::TempDir,
}

#[async_trait]
impl ExecutionContext for NodeContext {
    async fn execute(&mut self, program: &Program, timeout: Duration) -> Result<Evaluation, HarnessError> {
        let mut child = self
            .child
            .take()
            .ok_or_else(|| HarnessError::ContextCreation("execution context already used".to_string()))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| HarnessError::ContextCreation("node stdin is not piped".to_string()))?;

        let source = script::render(program, &self.marker);
        let start_time = Instant::now();

        let execution_future = async move {
            if let Err(e) = stdin.write_all(source.as_bytes()).await {
                // node may already be gone; its output says why
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e);
                }
            }
            drop(stdin);
            child.wait_with_output().await
        };

        // Dropping the future on timeout drops the child, which kills it
        let output = match tokio::time::timeout(timeout, execution_future).await {
            Ok(output) => output?,
            Err(_) => {
                let timeout_ms = timeout.as_millis() as u64;
                warn!(timeout_ms = timeout_ms, "Node execution timed out");
                return Ok(Evaluation::TimedOut(timeout_ms));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit_code = output.status.code().map(i64::from);

        debug!(
            execution_ms = start_time.elapsed().as_millis() as u64,
            exit_code = ?exit_code,
            "Node execution finished"
        );

        script::interpret(&stdout, &stderr, exit_code, &self.marker)
    }
}
