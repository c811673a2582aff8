//! Docker CLI runtime adapter

use async_trait::async_trait;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use brume_core::{Error, LaunchSpec, ProcessId, Result};

use crate::port::{ContainerHandle, ContainerRuntime};

/// Default deadline for one docker invocation
///
/// Launches may pull image layers, so this is generous compared to the
/// networking command timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Production runtime backend driving the docker CLI
#[derive(Debug, Clone)]
pub struct DockerCli {
    timeout: Duration,
}

impl DockerCli {
    /// Create an adapter with the default timeout
    #[must_use]
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the per-command timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn docker(&self, operation: &str, args: &[String]) -> Result<Output> {
        debug!(operation, command = %format!("docker {}", args.join(" ")), "Running docker");

        let output = tokio::time::timeout(self.timeout, Command::new("docker").args(args).output())
            .await
            .map_err(|_| Error::Timeout {
                operation: operation.to_string(),
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ContainerLaunch {
                message: format!("{operation}: {}", stderr.trim()),
            });
        }

        Ok(output)
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the `docker run` argv for a launch
fn run_args(spec: &LaunchSpec, domain: &str, name: &str) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        format!("--network={domain}"),
        format!("--name={name}"),
    ];

    if spec.restart_policy.is_enabled() {
        args.push(format!(
            "--restart=on-failure:{}",
            spec.restart_policy.max_retries
        ));
    }

    for (key, value) in &spec.environment {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }

    args.push(spec.image.clone());
    args.extend(spec.command.iter().cloned());
    args
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn run(&self, spec: &LaunchSpec, domain: &str, name: &str) -> Result<ContainerHandle> {
        let args = run_args(spec, domain, name);
        self.docker("run container", &args).await?;

        debug!(name, image = %spec.image, domain, "Container started");
        Ok(ContainerHandle::new(name))
    }

    async fn inspect(&self, handle: &ContainerHandle) -> Result<ProcessId> {
        let args = vec![
            "inspect".to_string(),
            "--format".to_string(),
            "{{.State.Pid}}".to_string(),
            handle.as_str().to_string(),
        ];
        let output = self.docker("inspect container", &args).await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let pid: i32 = stdout
            .trim()
            .parse()
            .map_err(|_| Error::ContainerLaunch {
                message: format!("inspect {handle}: unparseable pid '{}'", stdout.trim()),
            })?;

        if pid <= 0 {
            return Err(Error::ContainerLaunch {
                message: format!("inspect {handle}: container has no running process"),
            });
        }

        Ok(ProcessId::from_raw(pid))
    }

    async fn remove(&self, handle: &ContainerHandle) -> Result<()> {
        let args = vec![
            "rm".to_string(),
            "-f".to_string(),
            handle.as_str().to_string(),
        ];
        self.docker("remove container", &args).await?;

        debug!(name = %handle, "Container removed");
        Ok(())
    }
}
