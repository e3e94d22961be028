// Docker-backed execution contexts using Bollard
// One container per context: network disabled, memory and CPU capped, removed on drop

use crate::engine::{report_marker, ContextProvider, Evaluation, ExecutionContext};
use crate::error::HarnessError;
use crate::script::{self, Program};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use codetest_common::config::HarnessConfig;
use futures_util::stream::StreamExt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Linux caps a single environment string at 128 KiB
const SCRIPT_CHUNK_BYTES: usize = 96 * 1024;

/// Environment and arguments together share the 2 MiB exec limit
const MAX_ENCODED_SCRIPT_BYTES: usize = 1536 * 1024;

/// Container cleanup guard - guarantees container removal on drop
struct ContainerGuard {
    docker: Docker,
    container_id: String,
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        // Drop cannot be async; removal runs in the background
        let container_id = self.container_id.clone();
        let docker = self.docker.clone();

        tokio::spawn(async move {
            let remove_options = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };

            if let Err(e) = docker.remove_container(&container_id, Some(remove_options)).await {
                warn!(container_id = %container_id, error = %e, "Failed to cleanup container");
            }
        });
    }
}

/// Environment and command that feed a rendered script to node
///
/// The script travels base64-encoded, split across `CODETEST_SCRIPT_<n>`
/// variables, and is reassembled by the shell in order.
fn launch_spec(source: &str, memory_limit_mb: u32) -> Result<(Vec<String>, Vec<String>), HarnessError> {
    let encoded = general_purpose::STANDARD.encode(source);
    if encoded.len() > MAX_ENCODED_SCRIPT_BYTES {
        return Err(HarnessError::ContextCreation(format!(
            "program too large for a container ({} encoded bytes)",
            encoded.len()
        )));
    }

    // Base64 output is ASCII, so byte chunks are valid strings
    let chunks: Vec<&str> = encoded
        .as_bytes()
        .chunks(SCRIPT_CHUNK_BYTES)
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .collect();

    let env = chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| format!("CODETEST_SCRIPT_{}={}", i, chunk))
        .collect();
    let parts: Vec<String> = (0..chunks.len())
        .map(|i| format!("\"$CODETEST_SCRIPT_{}\"", i))
        .collect();

    let cmd = vec![
        "sh".to_string(),
        "-c".to_string(),
        format!(
            "printf '%s' {} | base64 -d | node --max-old-space-size={} -",
            parts.join(" "),
            memory_limit_mb
        ),
    ];

    Ok((env, cmd))
}

/// Docker-based engine: one throwaway Node container per execution context
pub struct DockerEngine {
    docker: Docker,
    image: String,
    memory_limit_mb: u32,
    cpu_limit: f32,
}

impl DockerEngine {
    pub fn new_with_config(config: &HarnessConfig) -> Result<Self, HarnessError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| HarnessError::ContextCreation(format!("failed to connect to Docker daemon: {}", e)))?;

        Ok(Self {
            docker,
            image: config.docker_image.clone(),
            memory_limit_mb: config.memory_limit_mb,
            cpu_limit: config.cpu_limit,
        })
    }

    /// Ensure the image is available locally, pulling it if needed
    async fn ensure_image(&self) -> Result<(), HarnessError> {
        if self.docker.inspect_image(&self.image).await.is_ok() {
            debug!(image = %self.image, "Image cache hit");
            return Ok(());
        }

        warn!(image = %self.image, "Image cache miss, pulling");

        let options = Some(CreateImageOptions {
            from_image: self.image.as_str(),
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, None);
        while let Some(result) = stream.next().await {
            result.map_err(|e| HarnessError::ContextCreation(format!("failed to pull {}: {}", self.image, e)))?;
        }

        info!(image = %self.image, "Image pulled");
        Ok(())
    }
}

#[async_trait]
impl ContextProvider for DockerEngine {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn create_context(&self) -> Result<Box<dyn ExecutionContext>, HarnessError> {
        self.ensure_image().await?;

        Ok(Box::new(DockerContext {
            docker: self.docker.clone(),
            image: self.image.clone(),
            memory_limit_mb: self.memory_limit_mb,
            cpu_limit: self.cpu_limit,
            marker: report_marker(),
            used: false,
        }))
    }

    async fn probe(&self) -> Result<String, HarnessError> {
        let version = self
            .docker
            .version()
            .await
            .map_err(|e| HarnessError::ContextCreation(format!("Docker daemon unreachable: {}", e)))?;
        self.ensure_image().await?;

        Ok(format!(
            "docker {} ({})",
            version.version.unwrap_or_else(|| "unknown".to_string()),
            self.image
        ))
    }
}

struct DockerContext {
    docker: Docker,
    image: String,
    memory_limit_mb: u32,
    cpu_limit: f32,
    marker: String,
    used: bool,
}

impl DockerContext {
    /// Follow container logs to completion, then collect the exit code
    async fn collect(&self, container_id: &str) -> Result<(String, String, Option<i64>), HarnessError> {
        let mut stdout = String::new();
        let mut stderr = String::new();

        let logs_options = Some(LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: true,
            ..Default::default()
        });

        let mut logs_stream = self.docker.logs(container_id, logs_options);
        while let Some(output) = logs_stream.next().await {
            match output? {
                LogOutput::StdOut { message } => stdout.push_str(&String::from_utf8_lossy(&message)),
                LogOutput::StdErr { message } => stderr.push_str(&String::from_utf8_lossy(&message)),
                _ => {}
            }
        }

        let wait_options = WaitContainerOptions {
            condition: "not-running",
        };
        let mut wait_stream = self.docker.wait_container(container_id, Some(wait_options));
        let exit_code = match wait_stream.next().await {
            Some(Ok(response)) => Some(response.status_code),
            // Non-zero exits surface as an error carrying the code
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Some(code),
            Some(Err(e)) => return Err(e.into()),
            None => None,
        };

        Ok((stdout, stderr, exit_code))
    }
}

#[async_trait]
impl ExecutionContext for DockerContext {
    async fn execute(&mut self, program: &Program, timeout: Duration) -> Result<Evaluation, HarnessError> {
        if self.used {
            return Err(HarnessError::ContextCreation("execution context already used".to_string()));
        }
        self.used = true;

        let (env, cmd) = launch_spec(&script::render(program, &self.marker), self.memory_limit_mb)?;

        let config = Config {
            image: Some(self.image.clone()),
            cmd: Some(cmd),
            env: Some(env),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            network_disabled: Some(true),
            working_dir: Some("/tmp".to_string()),
            host_config: Some(bollard::models::HostConfig {
                memory: Some(i64::from(self.memory_limit_mb) * 1024 * 1024),
                nano_cpus: Some((f64::from(self.cpu_limit) * 1_000_000_000.0) as i64),
                ..Default::default()
            }),
            ..Default::default()
        };

        let container_name = format!("codetest-{}", uuid::Uuid::new_v4());
        let create_options = CreateContainerOptions {
            name: container_name.as_str(),
            platform: None,
        };

        let container = self.docker.create_container(Some(create_options), config).await?;
        let container_id = container.id.clone();
        let _guard = ContainerGuard {
            docker: self.docker.clone(),
            container_id: container_id.clone(),
        };

        let start_time = Instant::now();
        self.docker
            .start_container(&container_id, None::<StartContainerOptions<String>>)
            .await?;

        match tokio::time::timeout(timeout, self.collect(&container_id)).await {
            Ok(collected) => {
                let (stdout, stderr, exit_code) = collected?;
                debug!(
                    container_id = %container_id,
                    execution_ms = start_time.elapsed().as_millis() as u64,
                    exit_code = ?exit_code,
                    "Container execution finished"
                );
                script::interpret(&stdout, &stderr, exit_code, &self.marker)
            }
            Err(_) => {
                let timeout_ms = timeout.as_millis() as u64;
                warn!(container_id = %container_id, timeout_ms = timeout_ms, "Container execution timed out");

                if let Err(e) = self
                    .docker
                    .kill_container(&container_id, None::<KillContainerOptions<String>>)
                    .await
                {
                    warn!(container_id = %container_id, error = %e, "Failed to kill timed-out container");
                }

                Ok(Evaluation::TimedOut(timeout_ms))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::EntryPoint;
    use base64::Engine as _;
    use codetest_common::config::{MAX_SOURCE_CODE_BYTES, MAX_TEST_INPUT_BYTES};

    const MARKER: &str = "__CODETEST_REPORT_0123456789abcdef0123456789abcdef__";

    fn assert_fits(program: &Program) {
        let source = script::render(program, MARKER);
        let (env, cmd) = launch_spec(&source, 256).expect("largest accepted program must fit");

        for var in &env {
            assert!(var.len() < 128 * 1024, "{} bytes in one variable", var.len());
        }
        let total: usize = env.iter().chain(cmd.iter()).map(|s| s.len() + 1).sum();
        assert!(total < 2 * 1024 * 1024, "{} bytes of environment and arguments", total);

        // Chunks reassemble to the original script
        let encoded: String = env.iter().map(|var| var.split_once('=').unwrap().1).collect();
        assert_eq!(general_purpose::STANDARD.decode(encoded).unwrap(), source.as_bytes());
        assert!(cmd[2].contains(&format!("\"$CODETEST_SCRIPT_{}\"", env.len() - 1)));
    }

    #[test]
    fn test_small_script_uses_one_variable() {
        let source = script::render(&Program::expression("const x = 1;", "x"), MARKER);
        let (env, cmd) = launch_spec(&source, 128).unwrap();

        assert_eq!(env.len(), 1);
        assert!(env[0].starts_with("CODETEST_SCRIPT_0="));
        assert_eq!(
            cmd[2],
            "printf '%s' \"$CODETEST_SCRIPT_0\" | base64 -d | node --max-old-space-size=128 -"
        );
    }

    #[test]
    fn test_largest_expression_request_fits() {
        // Control characters expand six-fold when escaped into the script
        let code = "\u{1}".repeat(MAX_SOURCE_CODE_BYTES);
        let input = "\u{1}".repeat(MAX_TEST_INPUT_BYTES);
        assert_fits(&Program::expression(&code, &input));
    }

    #[test]
    fn test_largest_call_request_fits() {
        // Backslashes are escaped again at every nesting level
        let code = "\u{1}".repeat(MAX_SOURCE_CODE_BYTES);
        let input = format!("[\"{}\"]", "\\\\".repeat((MAX_TEST_INPUT_BYTES - 4) / 2));
        assert!(input.len() <= MAX_TEST_INPUT_BYTES);

        let entry = EntryPoint::parse("solve").unwrap();
        assert_fits(&Program::call(&code, &entry, &input).unwrap());
    }

    #[test]
    fn test_oversized_script_is_refused() {
        let source = "x".repeat(MAX_ENCODED_SCRIPT_BYTES);
        assert!(matches!(
            launch_spec(&source, 128),
            Err(HarnessError::ContextCreation(_))
        ));
    }
}
