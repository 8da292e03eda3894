mod actor;

use crate::config::CoordinatorConfig;
use crate::engine::ContainerEngine;
use crate::errors;
use crate::events::{JobOutcome, JobState};
use crate::types::{Artifact, JobId, JobSpec};
use crate::workspace::WorkspaceRoot;
use actor::Actor;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch, Semaphore};

/// Resources shared by every worker. Cloning is cheap.
#[derive(Clone)]
pub struct WorkerContext {
    pub engine: Arc<dyn ContainerEngine>,
    pub workspaces: Arc<WorkspaceRoot>,
    pub config: Arc<CoordinatorConfig>,
    pub permits: Arc<Semaphore>,
    pub shutdown: watch::Receiver<bool>,
}

pub struct Job {
    pub id: JobId,
    pub spec: JobSpec,
    pub input: Artifact,
}

/// Handle to the worker running one job.
///
/// The worker runs in its own task and sends its result straight to the
/// submitter, so dropping the submitter never interrupts container or
/// workspace teardown. The handle only exposes the job's current state.
pub struct WorkerHandle {
    state: watch::Receiver<JobState>,
}

impl WorkerHandle {
    pub fn spawn(
        context: WorkerContext,
        job: Job,
        response: oneshot::Sender<errors::Result<JobOutcome>>,
        finished: mpsc::UnboundedSender<JobId>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(JobState::Queued);
        Actor::spawn(context, job, state_tx, response, finished);
        Self { state: state_rx }
    }

    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }
}
