mod actor;
mod messages;

use self::{
    actor::JobCoordinator,
    messages::CoordinatorMessage::{self, ListJobs, RunJob, Shutdown},
};
use crate::config::CoordinatorConfig;
use crate::engine::ContainerEngine;
use crate::errors::{self, JobError};
use crate::events::{JobOutcome, JobSummary};
use crate::types::{Artifact, JobSpec};
use crate::workspace::WorkspaceRoot;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// A `JobCoordinator` which runs jobs and reports on the ones in flight.
///
/// This struct is an actor handle: the real work is done in the actor spawned by `JobCoordinator::spawn`,
/// and each job in turn runs in a worker of its own. The handle can be cloned freely
/// across tasks without an `Arc<Mutex>` or any other means of synchronization.
#[derive(Clone)]
pub struct JobCoordinatorHandle {
    sender: mpsc::Sender<CoordinatorMessage>,
}

impl JobCoordinatorHandle {
    /// Spawn a new coordinator.
    ///
    /// `config.message_capacity` limits the build-up of inbound messages.
    pub fn spawn(
        engine: Arc<dyn ContainerEngine>,
        workspaces: WorkspaceRoot,
        config: CoordinatorConfig,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.message_capacity.max(1));
        JobCoordinator::spawn(receiver, engine, workspaces, config);
        Self { sender }
    }

    /// Run one job to completion: stage `input`, run the container, collect
    /// its stdout and the final workspace archive.
    ///
    /// By the time this returns, the job's container and workspace are gone.
    pub async fn run_job(&self, spec: JobSpec, input: Artifact) -> errors::Result<JobOutcome> {
        let (tx, rx) = oneshot::channel();
        let msg = RunJob {
            spec,
            input,
            response: tx,
        };
        self.sender
            .send(msg)
            .await
            .map_err(|_| JobError::CoordinatorExited)?;
        rx.await.map_err(|_| JobError::Aborted)?
    }

    /// Jobs currently in flight, ordered by id.
    pub async fn list_jobs(&self) -> errors::Result<Vec<JobSummary>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ListJobs { response: tx })
            .await
            .map_err(|_| JobError::CoordinatorExited)?;
        rx.await.map_err(|_| JobError::CoordinatorExited)
    }

    /// Cancel every job in flight and refuse new ones.
    ///
    /// Cancelled jobs still stop and remove their containers and workspaces.
    /// Returns once all of them have, or after twice the configured
    /// `cleanup_timeout` if some teardown hangs.
    pub async fn shutdown(&self) -> errors::Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Shutdown { response: tx })
            .await
            .map_err(|_| JobError::CoordinatorExited)?;
        rx.await.map_err(|_| JobError::CoordinatorExited)
    }
}
