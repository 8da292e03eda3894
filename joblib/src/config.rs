use crate::engine::HealthProbe;
use std::time::Duration;

/// Knobs for the job coordinator and the workers it spawns.
#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    /// Jobs allowed past admission at the same time; the rest wait in `Queued`.
    pub max_concurrent_jobs: usize,
    /// Capacity of the coordinator's message queue.
    pub message_capacity: usize,
    /// Budget for everything from image pull to log collection.
    pub job_timeout: Duration,
    /// Budget for each container teardown call, separate from `job_timeout`.
    pub cleanup_timeout: Duration,
    /// How long a container gets to exit after the stop signal.
    pub stop_grace: Duration,
    /// Where the workspace is mounted inside the container.
    pub container_workdir: String,
    pub healthcheck: Option<HealthProbe>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            message_capacity: 64,
            job_timeout: Duration::from_secs(300),
            cleanup_timeout: Duration::from_secs(30),
            stop_grace: Duration::from_secs(10),
            container_workdir: "/tmp".to_string(),
            healthcheck: None,
        }
    }
}
