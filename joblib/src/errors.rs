use crate::archive::ArchiveError;
use crate::engine::EngineError;
use crate::events::JobState;
use std::{io, path::PathBuf, result};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("invalid job: {0}")]
    Validation(String),
    #[error("failed to stage workspace {path:?}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The submitted archive could not be extracted.
    #[error("input archive rejected: {0}")]
    InputArchive(#[source] ArchiveError),
    /// The finished workspace could not be packed.
    #[error("failed to pack workspace: {0}")]
    OutputArchive(#[source] ArchiveError),
    #[error("failed to pull image {image}: {source}")]
    ImagePull {
        image: String,
        #[source]
        source: EngineError,
    },
    #[error("failed to create container: {0}")]
    ContainerCreate(#[source] EngineError),
    #[error("failed to start container: {0}")]
    ContainerStart(#[source] EngineError),
    #[error("failed waiting for container: {0}")]
    ContainerWait(#[source] EngineError),
    #[error("failed to fetch container logs: {0}")]
    LogsFetch(#[source] EngineError),
    #[error("job timed out in state {state}")]
    Timeout { state: JobState },
    #[error("job cancelled by shutdown in state {state}")]
    Cancelled { state: JobState },
    #[error("job worker stopped before reporting a result")]
    Aborted,
    #[error("job coordinator is not running")]
    CoordinatorExited,
}

impl JobError {
    /// Whether the failure was caused by what the client submitted.
    pub fn is_client_error(&self) -> bool {
        matches!(self, JobError::Validation(_) | JobError::InputArchive(_))
    }
}

pub type Result<T> = result::Result<T, JobError>;
