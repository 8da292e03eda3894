use super::messages::CoordinatorMessage;
use crate::actors::worker::{Job, WorkerContext, WorkerHandle};
use crate::config::CoordinatorConfig;
use crate::engine::ContainerEngine;
use crate::errors::{self, JobError};
use crate::events::{JobOutcome, JobState, JobSummary};
use crate::types::{Artifact, JobId, JobSpec};
use crate::workspace::WorkspaceRoot;
use std::{collections::HashMap, sync::Arc};
use tokio::{
    select,
    sync::{mpsc, oneshot, watch, Semaphore},
    time::{self, Instant},
};
use tracing::{debug, info, warn};

pub struct JobCoordinator {
    inbox: mpsc::Receiver<CoordinatorMessage>,
    finished_tx: mpsc::UnboundedSender<JobId>,
    finished_rx: mpsc::UnboundedReceiver<JobId>,
    workers: HashMap<JobId, WorkerHandle>,
    context: WorkerContext,
    shutdown_tx: watch::Sender<bool>,
    /// Shutdown callers waiting for the in-flight jobs to tear down.
    drain_waiters: Vec<oneshot::Sender<()>>,
    drain_deadline: Option<Instant>,
}

impl JobCoordinator {
    pub fn spawn(
        inbox: mpsc::Receiver<CoordinatorMessage>,
        engine: Arc<dyn ContainerEngine>,
        workspaces: WorkspaceRoot,
        config: CoordinatorConfig,
    ) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        let context = WorkerContext {
            engine,
            workspaces: Arc::new(workspaces),
            permits: Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1))),
            config: Arc::new(config),
            shutdown: shutdown_rx,
        };
        let actor = Self {
            inbox,
            finished_tx,
            finished_rx,
            workers: HashMap::new(),
            context,
            shutdown_tx,
            drain_waiters: Vec::new(),
            drain_deadline: None,
        };
        tokio::spawn(async move { actor.run().await });
    }

    async fn run(mut self) {
        use self::CoordinatorMessage::*;
        loop {
            select! {
                // drain completions first so listings never show finished jobs
                biased;
                Some(job_id) = self.finished_rx.recv() => {
                    self.workers.remove(&job_id);
                    debug!(%job_id, in_flight = self.workers.len(), "job released");
                    self.release_drained();
                }
                _ = time::sleep_until(self.drain_deadline.unwrap_or_else(Instant::now)),
                    if self.drain_deadline.is_some() =>
                {
                    warn!(in_flight = self.workers.len(), "gave up waiting for jobs to tear down");
                    self.release_waiters();
                }
                maybe_msg = self.inbox.recv() => {
                    match maybe_msg {
                        Some(RunJob { spec, input, response }) => self.run_job(spec, input, response),
                        Some(ListJobs { response }) => {
                            let _ = response.send(self.list_jobs());
                        }
                        Some(Shutdown { response }) => {
                            self.shutdown();
                            self.drain_waiters.push(response);
                            if self.drain_deadline.is_none() {
                                let bound = self.context.config.cleanup_timeout * 2;
                                self.drain_deadline = Some(Instant::now() + bound);
                            }
                            self.release_drained();
                        }
                        None => break,
                    }
                }
            }
        }
        // every handle is gone, nobody can collect results any more
        self.shutdown();
    }

    fn run_job(
        &mut self,
        spec: JobSpec,
        input: Artifact,
        response: oneshot::Sender<errors::Result<JobOutcome>>,
    ) {
        if *self.shutdown_tx.borrow() {
            let _ = response.send(Err(JobError::Cancelled {
                state: JobState::Queued,
            }));
            return;
        }

        let mut job_id = uuid::Uuid::new_v4();
        while self.workers.contains_key(&job_id) {
            job_id = uuid::Uuid::new_v4();
        }
        let job = Job {
            id: job_id,
            spec,
            input,
        };
        let worker = WorkerHandle::spawn(
            self.context.clone(),
            job,
            response,
            self.finished_tx.clone(),
        );
        self.workers.insert(job_id, worker);
        info!(%job_id, in_flight = self.workers.len(), "job accepted");
    }

    fn list_jobs(&self) -> Vec<JobSummary> {
        let mut jobs: Vec<JobSummary> = self
            .workers
            .iter()
            .map(|(job_id, worker)| JobSummary {
                job_id: *job_id,
                state: worker.state(),
            })
            .collect();
        jobs.sort_by_key(|job| job.job_id);
        jobs
    }

    /// Answer the shutdown callers once no job is left in flight.
    fn release_drained(&mut self) {
        if self.workers.is_empty() && !self.drain_waiters.is_empty() {
            info!("all jobs torn down");
            self.release_waiters();
        }
    }

    fn release_waiters(&mut self) {
        self.drain_deadline = None;
        for waiter in self.drain_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    fn shutdown(&mut self) {
        if !self.shutdown_tx.send_replace(true) {
            info!(in_flight = self.workers.len(), "shutting down job coordinator");
        }
    }
}
