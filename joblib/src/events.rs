use crate::engine::EngineError;
use crate::types::{Artifact, ContainerId, JobId};
use std::fmt;

/// Lifecycle of a single job. Transitions are strictly forward; the first
/// failure ends the job wherever it happens to be.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    /// Waiting for an admission permit.
    Queued,
    Created,
    ImagePulled,
    ContainerCreated,
    Running,
    Awaited,
    LogsCollected,
    Stopped,
    Removed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Created => "created",
            Self::ImagePulled => "image_pulled",
            Self::ContainerCreated => "container_created",
            Self::Running => "running",
            Self::Awaited => "awaited",
            Self::LogsCollected => "logs_collected",
            Self::Stopped => "stopped",
            Self::Removed => "removed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CleanupOp {
    Stop,
    Remove,
}

/// A container teardown step that failed. Reported, never fatal.
#[derive(Debug)]
pub struct CleanupWarning {
    pub container_id: ContainerId,
    pub op: CleanupOp,
    pub error: EngineError,
}

impl fmt::Display for CleanupWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op {
            CleanupOp::Stop => "stop",
            CleanupOp::Remove => "remove",
        };
        write!(f, "failed to {} container {}: {}", op, self.container_id, self.error)
    }
}

/// Everything a successful job hands back.
#[derive(Debug)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub stdout: String,
    /// Archive of the workspace as the container left it.
    pub artifact: Artifact,
    pub exit_code: i64,
    pub warnings: Vec<CleanupWarning>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JobSummary {
    pub job_id: JobId,
    pub state: JobState,
}
