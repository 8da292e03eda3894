use super::{Job, WorkerContext};
use crate::engine::{self, ContainerSpec, EngineError};
use crate::errors::{self, JobError};
use crate::events::{CleanupOp, CleanupWarning, JobOutcome, JobState};
use crate::types::{JobId, JobSpec};
use crate::workspace::Workspace;

use std::future::Future;
use tokio::{
    select,
    sync::{mpsc, oneshot, watch, OwnedSemaphorePermit},
    time::{self, Instant},
};
use tracing::{debug, info, info_span, warn, Instrument};

struct ContainerRun {
    stdout: String,
    exit_code: i64,
    warnings: Vec<CleanupWarning>,
}

/// Reports the job as finished to the coordinator, also when the worker panics.
struct FinishGuard {
    job_id: JobId,
    finished: mpsc::UnboundedSender<JobId>,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        let _ = self.finished.send(self.job_id);
    }
}

/// Drives a single job: admission, staging, the container lifecycle, packing
/// and workspace removal, strictly in that order.
pub struct Actor {
    context: WorkerContext,
    job_id: JobId,
    state_tx: watch::Sender<JobState>,
    deadline: Instant,
}

impl Actor {
    pub fn spawn(
        context: WorkerContext,
        job: Job,
        state_tx: watch::Sender<JobState>,
        response: oneshot::Sender<errors::Result<JobOutcome>>,
        finished: mpsc::UnboundedSender<JobId>,
    ) {
        let job_id = job.id;
        let span = info_span!("job", %job_id);
        tokio::spawn(
            async move {
                let finish = FinishGuard { job_id, finished };
                let actor = Self {
                    deadline: Instant::now() + context.config.job_timeout,
                    context,
                    job_id,
                    state_tx,
                };
                let result = actor.run(job).await;
                match &result {
                    Ok(outcome) => info!(
                        exit_code = outcome.exit_code,
                        warnings = outcome.warnings.len(),
                        "job finished"
                    ),
                    Err(err) => warn!(error = %err, "job failed"),
                }
                drop(finish);
                // the submitter may be gone; the job is over either way
                let _ = response.send(result);
            }
            .instrument(span),
        );
    }

    async fn run(mut self, job: Job) -> errors::Result<JobOutcome> {
        let Job { spec, input, .. } = job;
        let _permit = self.admit().await?;
        self.deadline = Instant::now() + self.context.config.job_timeout;
        self.advance(JobState::Created);

        let workspace = self.context.workspaces.stage(self.job_id, input).await?;
        let result = match self.execute(&spec, &workspace).await {
            Ok(run) => workspace.pack().await.map(|artifact| JobOutcome {
                job_id: self.job_id,
                stdout: run.stdout,
                artifact,
                exit_code: run.exit_code,
                warnings: run.warnings,
            }),
            Err(err) => Err(err),
        };
        if let Err(err) = workspace.cleanup().await {
            warn!(error = %err, "failed to remove workspace");
        }
        result
    }

    async fn admit(&self) -> errors::Result<OwnedSemaphorePermit> {
        let cancelled = JobError::Cancelled {
            state: JobState::Queued,
        };
        if *self.context.shutdown.borrow() {
            return Err(cancelled);
        }
        let mut shutdown = self.context.shutdown.clone();
        select! {
            biased;
            _ = shutdown.wait_for(|stop| *stop) => Err(cancelled),
            permit = self.context.permits.clone().acquire_owned() => permit.map_err(|_| cancelled),
        }
    }

    /// Pull, create, then run the container; stop and remove it whenever it
    /// was created, whatever happened in between.
    async fn execute(&self, spec: &JobSpec, workspace: &Workspace) -> errors::Result<ContainerRun> {
        let engine = &self.context.engine;

        self.bounded(engine.pull_image(spec.image()))
            .await?
            .map_err(|source| JobError::ImagePull {
                image: spec.image().to_string(),
                source,
            })?;
        self.advance(JobState::ImagePulled);

        let container_spec = self.container_spec(spec, workspace);
        let container_id = match self.bounded(engine.create_container(&container_spec)).await {
            Ok(created) => created.map_err(JobError::ContainerCreate)?,
            Err(interrupted) => {
                // the runtime may still complete the create under our name
                self.attempt(CleanupOp::Remove, &container_spec.name).await;
                return Err(interrupted);
            }
        };
        self.advance(JobState::ContainerCreated);
        info!(%container_id, image = spec.image(), "container created");

        let run = self.drive(&container_id).await;
        let warnings = self.teardown(&container_id).await;
        run.map(|(stdout, exit_code)| ContainerRun {
            stdout,
            exit_code,
            warnings,
        })
    }

    async fn drive(&self, container_id: &str) -> errors::Result<(String, i64)> {
        let engine = &self.context.engine;

        self.bounded(engine.start_container(container_id))
            .await?
            .map_err(JobError::ContainerStart)?;
        self.advance(JobState::Running);

        let exit_code = self
            .bounded(engine.wait_container(container_id))
            .await?
            .map_err(JobError::ContainerWait)?;
        self.advance(JobState::Awaited);
        debug!(exit_code, "container exited");

        let stdout = self
            .bounded(engine.container_logs(container_id))
            .await?
            .map_err(JobError::LogsFetch)?;
        self.advance(JobState::LogsCollected);

        Ok((stdout, exit_code))
    }

    async fn teardown(&self, container_id: &str) -> Vec<CleanupWarning> {
        let mut warnings = Vec::new();
        warnings.extend(self.attempt(CleanupOp::Stop, container_id).await);
        self.advance(JobState::Stopped);
        warnings.extend(self.attempt(CleanupOp::Remove, container_id).await);
        self.advance(JobState::Removed);
        warnings
    }

    /// One teardown call, bounded by `cleanup_timeout` rather than the job deadline.
    async fn attempt(&self, op: CleanupOp, container_id: &str) -> Option<CleanupWarning> {
        let engine = &self.context.engine;
        let config = &self.context.config;
        let call = async {
            match op {
                CleanupOp::Stop => engine.stop_container(container_id, config.stop_grace).await,
                CleanupOp::Remove => engine.remove_container(container_id).await,
            }
        };
        let error = match time::timeout(config.cleanup_timeout, call).await {
            Ok(Ok(())) => return None,
            Ok(Err(err)) => err,
            Err(_) => EngineError::new(format!("gave up after {:?}", config.cleanup_timeout)),
        };
        let warning = CleanupWarning {
            container_id: container_id.to_string(),
            op,
            error,
        };
        warn!(%warning, status = ?warning.error.status(), "container cleanup failed");
        Some(warning)
    }

    /// Race an engine call against the job deadline and the shutdown signal.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = engine::Result<T>>,
    ) -> errors::Result<engine::Result<T>> {
        let state = self.state();
        let mut shutdown = self.context.shutdown.clone();
        select! {
            biased;
            _ = shutdown.wait_for(|stop| *stop) => Err(JobError::Cancelled { state }),
            _ = time::sleep_until(self.deadline) => Err(JobError::Timeout { state }),
            result = call => Ok(result),
        }
    }

    fn container_spec(&self, spec: &JobSpec, workspace: &Workspace) -> ContainerSpec {
        let config = &self.context.config;
        ContainerSpec {
            name: format!("exec-{}", self.job_id.simple()),
            image: spec.image().to_string(),
            command: spec.command().to_vec(),
            working_dir: config.container_workdir.clone(),
            host_dir: workspace.path().to_path_buf(),
            tty: true,
            healthcheck: config.healthcheck.clone(),
        }
    }

    fn advance(&self, state: JobState) {
        self.state_tx.send_replace(state);
        debug!(%state, "job state");
    }

    fn state(&self) -> JobState {
        *self.state_tx.borrow()
    }
}
