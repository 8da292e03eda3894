use clap::Parser;
use joblib::engine::HealthProbe;
use joblib::CoordinatorConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Run containers on behalf of HTTP clients
#[derive(Debug, Parser)]
#[clap(name = "exec-server")]
pub struct ServerConfig {
    /// Address to listen on
    #[clap(long, env = "EXEC_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Directory holding the per-job workspaces
    #[clap(long, env = "EXEC_WORKSPACE_ROOT", default_value = "tmp", parse(from_os_str))]
    pub workspace_root: PathBuf,

    /// Jobs allowed to run at the same time; the rest queue
    #[clap(long, env = "EXEC_MAX_CONCURRENT_JOBS", default_value_t = 4)]
    pub max_concurrent_jobs: usize,

    /// Seconds a job may take from image pull to log collection
    #[clap(long, env = "EXEC_JOB_TIMEOUT_SECS", default_value_t = 300)]
    pub job_timeout_secs: u64,

    /// Seconds allowed for each container stop or remove call
    #[clap(long, env = "EXEC_CLEANUP_TIMEOUT_SECS", default_value_t = 30)]
    pub cleanup_timeout_secs: u64,

    /// Seconds a container gets to exit after being asked to stop
    #[clap(long, env = "EXEC_STOP_GRACE_SECS", default_value_t = 10)]
    pub stop_grace_secs: u64,

    /// Where the workspace is mounted inside the container
    #[clap(long, env = "EXEC_CONTAINER_WORKDIR", default_value = "/tmp")]
    pub container_workdir: String,

    /// Shell command the runtime runs as a container health check
    #[clap(long, env = "EXEC_HEALTHCHECK")]
    pub healthcheck: Option<String>,

    #[clap(long, env = "EXEC_HEALTHCHECK_INTERVAL_SECS", default_value_t = 1)]
    pub healthcheck_interval_secs: u64,

    #[clap(long, env = "EXEC_HEALTHCHECK_RETRIES", default_value_t = 10)]
    pub healthcheck_retries: u32,

    /// Largest request body accepted, in bytes
    #[clap(long, env = "EXEC_MAX_REQUEST_BYTES", default_value_t = 64 * 1024 * 1024)]
    pub max_request_bytes: usize,

    /// Capacity of the job coordinator's message queue
    #[clap(long, env = "EXEC_QUEUE_CAPACITY", default_value_t = 64)]
    pub queue_capacity: usize,
}

impl ServerConfig {
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        let healthcheck = self.healthcheck.as_ref().map(|command| HealthProbe {
            command: command.clone(),
            interval: Duration::from_secs(self.healthcheck_interval_secs),
            retries: self.healthcheck_retries,
        });
        CoordinatorConfig {
            max_concurrent_jobs: self.max_concurrent_jobs,
            message_capacity: self.queue_capacity,
            job_timeout: Duration::from_secs(self.job_timeout_secs),
            cleanup_timeout: Duration::from_secs(self.cleanup_timeout_secs),
            stop_grace: Duration::from_secs(self.stop_grace_secs),
            container_workdir: self.container_workdir.clone(),
            healthcheck,
        }
    }
}
