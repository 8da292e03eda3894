//! The container runtime seam.
//!
//! [`ContainerEngine`] is the only way the rest of the crate talks to a
//! container runtime. Implementations hold no per-job state and are shared by
//! every job through an `Arc`.

mod docker;
#[cfg(any(test, feature = "fake-engine"))]
pub mod fake;

pub use docker::DockerEngine;

use crate::types::ContainerId;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// A failure reported by the container runtime.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct EngineError {
    message: String,
    status: Option<u16>,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    /// HTTP status of the runtime's API response, when there was one.
    pub fn status(&self) -> Option<u16> {
        self.status
    }
}

impl From<bollard::errors::Error> for EngineError {
    fn from(err: bollard::errors::Error) -> Self {
        let status = match &err {
            bollard::errors::Error::DockerResponseServerError { status_code, .. } => {
                Some(*status_code)
            }
            _ => None,
        };
        Self {
            message: err.to_string(),
            status,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Liveness probe run by the runtime inside the container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HealthProbe {
    /// Shell command; a non-zero exit marks the container unhealthy.
    pub command: String,
    pub interval: Duration,
    pub retries: u32,
}

/// Everything needed to create one job container.
#[derive(Clone, Debug)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    /// Working directory inside the container; the workspace is mounted here.
    pub working_dir: String,
    /// Host side of the workspace bind mount.
    pub host_dir: PathBuf,
    pub tty: bool,
    pub healthcheck: Option<HealthProbe>,
}

impl ContainerSpec {
    /// Bind mount in `host:container:mode` form.
    pub fn bind(&self) -> String {
        format!("{}:{}:rw", self.host_dir.display(), self.working_dir)
    }
}

#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Make `image` available locally, fetching it if needed.
    async fn pull_image(&self, image: &str) -> Result<()>;

    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerId>;

    async fn start_container(&self, id: &str) -> Result<()>;

    /// Block until the container is no longer running; yields its exit code.
    async fn wait_container(&self, id: &str) -> Result<i64>;

    /// The container's standard output, read to the end.
    async fn container_logs(&self, id: &str) -> Result<String>;

    async fn stop_container(&self, id: &str, grace: Duration) -> Result<()>;

    /// Forced removal; succeeds whether or not the container is running.
    async fn remove_container(&self, id: &str) -> Result<()>;
}
