//! Docker container supervision.
//!
//! Adapters that elect to manage their own data store start it through this
//! module. Containers are driven through the `docker` CLI; the handle stops
//! and removes the container on teardown and tolerates a container that is
//! already gone.

use std::future::Future;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::BenchError;

/// Interval between health-probe attempts.
const PROBE_INTERVAL: Duration = Duration::from_millis(500);

/// Probe attempts between progress log lines.
const PROBE_LOG_EVERY: u32 = 5;

/// Graceful stop timeout handed to `docker stop`.
const STOP_TIMEOUT_SECS: u32 = 10;

/// Everything needed to start one data-store container.
#[derive(Clone, Debug)]
pub struct ContainerSpec {
    /// Image tag, e.g. `mysql:8.0`.
    pub image: String,
    /// Unique container name; see [`container_name`].
    pub name: String,
    /// `container_port -> host_port` bindings.
    pub ports: Vec<(u16, u16)>,
    /// Environment variables passed to the container.
    pub env: Vec<(String, String)>,
    /// Run in privileged mode.
    pub privileged: bool,
    /// Command arguments appended after the image.
    pub cmd: Vec<String>,
}

impl ContainerSpec {
    pub fn new(image: impl Into<String>, name: impl Into<String>) -> Self {
        ContainerSpec {
            image: image.into(),
            name: name.into(),
            ports: Vec::new(),
            env: Vec::new(),
            privileged: false,
            cmd: Vec::new(),
        }
    }

    pub fn port(mut self, container: u16, host: u16) -> Self {
        self.ports.push((container, host));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    pub fn cmd(mut self, args: &[&str]) -> Self {
        self.cmd = args.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// A running container owned by an adapter.
#[derive(Debug)]
pub struct Container {
    name: String,
}

/// Unique container name embedding a wall-clock timestamp so concurrent
/// runs don't collide.
pub fn container_name(backend: &str) -> String {
    format!("crud-bench-{backend}-{}", chrono::Utc::now().timestamp())
}

/// Check whether the image is present in the local cache.
fn image_exists(image: &str) -> bool {
    Command::new("docker")
        .args(["image", "inspect", image])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Pull the image, surfacing docker's stderr on failure.
fn pull_image(image: &str) -> Result<(), BenchError> {
    info!("Pulling image {image}...");
    let output = Command::new("docker")
        .args(["pull", image])
        .output()
        .map_err(|e| BenchError::Setup(format!("failed to invoke docker pull: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BenchError::Setup(format!(
            "failed to pull image {image}: {stderr}"
        )));
    }
    Ok(())
}

fn run_container(spec: &ContainerSpec) -> Result<String, BenchError> {
    let mut args: Vec<String> = vec![
        "run".into(),
        "--name".into(),
        spec.name.clone(),
        "-d".into(),
    ];
    if spec.privileged {
        args.push("--privileged".into());
    }
    for (key, value) in &spec.env {
        args.push("-e".into());
        args.push(format!("{key}={value}"));
    }
    for (container, host) in &spec.ports {
        args.push("-p".into());
        args.push(format!("{host}:{container}"));
    }
    args.push(spec.image.clone());
    args.extend(spec.cmd.iter().cloned());

    let output = Command::new("docker")
        .args(&args)
        .output()
        .map_err(|e| BenchError::Setup(format!("failed to invoke docker run: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BenchError::Setup(format!(
            "failed to start container {}: {}",
            spec.name,
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Start a container, pulling the image on cache miss.
///
/// If the initial start still reports a missing image, one manual pull is
/// retried before giving up.
pub fn start(spec: &ContainerSpec) -> Result<Container, BenchError> {
    if !image_exists(&spec.image) {
        pull_image(&spec.image)?;
    }

    info!(
        "Starting container '{}' with image '{}'...",
        spec.name, spec.image
    );
    match run_container(spec) {
        Ok(id) => {
            debug!("Started container {id}");
            Ok(Container {
                name: spec.name.clone(),
            })
        }
        Err(BenchError::Setup(msg)) if msg.contains("No such image") => {
            info!("Container start reported a missing image, pulling and retrying...");
            pull_image(&spec.image)?;
            let id = run_container(spec)?;
            debug!("Started container {id}");
            Ok(Container {
                name: spec.name.clone(),
            })
        }
        Err(err) => Err(err),
    }
}

impl Container {
    /// Poll the caller-supplied probe at 500 ms intervals until it succeeds
    /// or the deadline passes. On deadline the container is force-stopped
    /// before the error returns.
    pub async fn wait_healthy<F, Fut>(&self, timeout: Duration, probe: F) -> Result<(), BenchError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let deadline = Instant::now() + timeout;
        let mut attempts = 0u32;
        info!("Waiting for container '{}' to become healthy...", self.name);

        while Instant::now() < deadline {
            match probe().await {
                Ok(()) => {
                    info!("Container '{}' is ready", self.name);
                    return Ok(());
                }
                Err(e) => {
                    attempts += 1;
                    if attempts % PROBE_LOG_EVERY == 0 {
                        info!(
                            "Still waiting for '{}' ({attempts} attempts): {e}",
                            self.name
                        );
                    } else {
                        debug!("Probe attempt {attempts} failed: {e}");
                    }
                }
            }
            tokio::time::sleep(PROBE_INTERVAL).await;
        }

        self.stop();
        Err(BenchError::Setup(format!(
            "container '{}' failed its health check within {timeout:?}",
            self.name
        )))
    }

    /// Gracefully stop and remove the container. Never raises: a missing
    /// container is logged at debug level and ignored.
    pub fn stop(&self) {
        info!("Stopping container '{}'...", self.name);

        let stopped = Command::new("docker")
            .args(["stop", "-t", &STOP_TIMEOUT_SECS.to_string(), &self.name])
            .output();
        match stopped {
            Ok(output) if !output.status.success() => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                debug!("docker stop '{}': {}", self.name, stderr.trim());
            }
            Err(e) => warn!("failed to invoke docker stop: {e}"),
            _ => {}
        }

        let removed = Command::new("docker")
            .args(["rm", "-f", &self.name])
            .output();
        match removed {
            Ok(output) if !output.status.success() => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                debug!("docker rm '{}': {}", self.name, stderr.trim());
            }
            Err(e) => warn!("failed to invoke docker rm: {e}"),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_names_are_prefixed_and_stamped() {
        let name = container_name("mysql");
        assert!(name.starts_with("crud-bench-mysql-"));
        let stamp = name.rsplit('-').next().unwrap();
        assert!(stamp.parse::<i64>().is_ok());
    }

    #[tokio::test]
    async fn test_wait_healthy_gives_up_at_deadline() {
        let container = Container {
            name: "crud-bench-test-absent".into(),
        };
        let started = Instant::now();
        let result = container
            .wait_healthy(Duration::from_millis(1200), || async {
                anyhow::bail!("connection refused")
            })
            .await;
        assert!(matches!(result, Err(BenchError::Setup(_))));
        assert!(started.elapsed() >= Duration::from_millis(1200));
    }

    #[test]
    fn test_spec_builder_collects_bindings() {
        let spec = ContainerSpec::new("mysql:8.0", "crud-bench-mysql-0")
            .port(3306, 3306)
            .env("MYSQL_ROOT_PASSWORD", "secret")
            .privileged(true)
            .cmd(&["--verbose"]);
        assert_eq!(spec.ports, vec![(3306, 3306)]);
        assert_eq!(
            spec.env,
            vec![("MYSQL_ROOT_PASSWORD".to_string(), "secret".to_string())]
        );
        assert!(spec.privileged);
        assert_eq!(spec.cmd, vec!["--verbose".to_string()]);
    }
}
