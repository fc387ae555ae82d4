use std::collections::HashMap;
use std::process::ExitStatus;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;

use super::error::Result;

#[derive(Debug, Clone)]
pub struct VolumeMount {
    pub host_path: String,
    pub container_path: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ContainerConfig {
    pub name: String,
    pub image: String,
    pub working_dir: String,
    pub labels: Vec<(String, String)>,
    pub volumes: Vec<VolumeMount>,
    pub environment: Vec<(String, String)>,
    pub cpu_limit: Option<String>,
    pub memory_limit: Option<String>,
    /// Allocate a TTY and keep stdin open so the process can be attached to.
    pub tty: bool,
    pub command: Vec<String>,
}

/// What `docker inspect` tells us about one container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    pub labels: HashMap<String, String>,
    /// Raw `State.Status`: created, running, paused, restarting, exited, dead.
    pub state: String,
    pub exit_code: i32,
    pub tty: bool,
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContainerStats {
    pub cpu_percent: f64,
    pub memory_usage: String,
    pub memory_percent: f64,
}

#[async_trait]
pub trait ContainerRuntimeInterface: Send + Sync {
    // backend stuff
    async fn is_docker_available(&self) -> bool;

    async fn is_daemon_running(&self) -> bool;

    async fn image_exists_locally(&self, image: &str) -> bool;

    async fn pull_image(&self, image: &str) -> Result<()>;

    /// Use a local image as-is, pulling only when it is missing.
    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.image_exists_locally(image).await {
            tracing::info!("Using local Docker image '{}'", image);
            return Ok(());
        }

        tracing::info!("Pulling Docker image '{}'", image);
        self.pull_image(image).await
    }

    // container management
    async fn run_container(&self, config: &ContainerConfig) -> Result<String>;

    /// Ids of all containers (any state) carrying `label`.
    async fn list_ids(&self, label: &str) -> Result<Vec<String>>;

    /// Missing containers are left out of the result rather than failing it.
    async fn inspect(&self, names: &[String]) -> Result<Vec<ContainerInfo>>;

    async fn start_container(&self, name: &str) -> Result<()>;

    async fn stop_container(&self, name: &str) -> Result<()>;

    async fn remove(&self, name: &str, force: bool) -> Result<()>;

    async fn commit(&self, name: &str, image: &str) -> Result<()>;

    async fn stats(&self, name: &str) -> Result<ContainerStats>;

    /// Output lines; the stream ends when the container stops (with `follow`)
    /// or when the existing log is exhausted.
    async fn logs(&self, name: &str, follow: bool) -> Result<BoxStream<'static, String>>;

    fn attach_command(&self, name: &str) -> Vec<String>;

    fn exec_command(&self, name: &str, cmd: &[&str]) -> Vec<String>;

    /// Run a command with the terminal inherited; returns when it exits.
    async fn run_foreground(&self, argv: &[String]) -> Result<ExitStatus>;
}
