use crate::errors;
use crate::events::{JobOutcome, JobSummary};
use crate::types::{Artifact, JobSpec};
use tokio::sync::oneshot;

#[derive(Debug)]
pub enum CoordinatorMessage {
    RunJob {
        spec: JobSpec,
        input: Artifact,
        response: oneshot::Sender<errors::Result<JobOutcome>>,
    },
    ListJobs {
        response: oneshot::Sender<Vec<JobSummary>>,
    },
    Shutdown {
        response: oneshot::Sender<()>,
    },
}
