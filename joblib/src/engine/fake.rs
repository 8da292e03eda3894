//! In-process stand-in for a container runtime.
//!
//! "Runs" a handful of commands directly against the bind-mounted host
//! directory (`echo`, `touch`, `sleep`, `true`, `false`), records every call,
//! and can be told to fail or slow down any operation.

use super::{ContainerEngine, ContainerSpec, EngineError, Result};
use crate::types::ContainerId;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EngineOp {
    Pull,
    Create,
    Start,
    Wait,
    Logs,
    Stop,
    Remove,
}

struct FakeContainer {
    spec: ContainerSpec,
    stdout: String,
    removed: bool,
}

#[derive(Default)]
pub struct FakeEngine {
    images: Mutex<HashSet<String>>,
    failures: Mutex<HashSet<EngineOp>>,
    delays: Mutex<HashMap<EngineOp, Duration>>,
    calls: Mutex<Vec<(EngineOp, String)>>,
    containers: Mutex<HashMap<ContainerId, FakeContainer>>,
    next_id: AtomicU64,
    live: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeEngine {
    /// An engine that knows the `alpine` image.
    pub fn new() -> Self {
        Self::default().with_image("alpine")
    }

    pub fn with_image(self, image: &str) -> Self {
        self.images.lock().unwrap().insert(image.to_string());
        self
    }

    /// Make every call of `op` fail.
    pub fn failing_at(self, op: EngineOp) -> Self {
        self.failures.lock().unwrap().insert(op);
        self
    }

    /// Make every call of `op` take at least `delay` before doing anything.
    pub fn delaying(self, op: EngineOp, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(op, delay);
        self
    }

    pub fn calls(&self) -> Vec<(EngineOp, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ops(&self) -> Vec<EngineOp> {
        self.calls().into_iter().map(|(op, _)| op).collect()
    }

    pub fn count(&self, op: EngineOp) -> usize {
        self.calls().iter().filter(|(o, _)| *o == op).count()
    }

    /// Containers created and not yet removed.
    pub fn live_containers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Most containers ever alive at once.
    pub fn peak_containers(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Specs of every container created so far.
    pub fn created_specs(&self) -> Vec<ContainerSpec> {
        self.containers
            .lock()
            .unwrap()
            .values()
            .map(|c| c.spec.clone())
            .collect()
    }

    fn record(&self, op: EngineOp, target: &str) -> Result<()> {
        self.calls.lock().unwrap().push((op, target.to_string()));
        if self.failures.lock().unwrap().contains(&op) {
            return Err(EngineError::new(format!("injected {:?} failure", op)));
        }
        Ok(())
    }

    async fn pause(&self, op: EngineOp) {
        let delay = self.delays.lock().unwrap().get(&op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn spec_of(&self, id: &str) -> Result<ContainerSpec> {
        self.containers
            .lock()
            .unwrap()
            .get(id)
            .map(|c| c.spec.clone())
            .ok_or_else(|| EngineError::new(format!("no such container: {}", id)))
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn pull_image(&self, image: &str) -> Result<()> {
        self.record(EngineOp::Pull, image)?;
        self.pause(EngineOp::Pull).await;
        if !self.images.lock().unwrap().contains(image) {
            return Err(EngineError::new(format!("pull access denied for {}", image)));
        }
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerId> {
        self.record(EngineOp::Create, &spec.name)?;
        self.pause(EngineOp::Create).await;
        let id = format!("fake-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.containers.lock().unwrap().insert(
            id.clone(),
            FakeContainer {
                spec: spec.clone(),
                stdout: String::new(),
                removed: false,
            },
        );
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(live, Ordering::SeqCst);
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.record(EngineOp::Start, id)?;
        self.pause(EngineOp::Start).await;
        self.spec_of(id).map(|_| ())
    }

    async fn wait_container(&self, id: &str) -> Result<i64> {
        self.record(EngineOp::Wait, id)?;
        self.pause(EngineOp::Wait).await;
        let spec = self.spec_of(id)?;
        let (program, args) = match spec.command.split_first() {
            Some((program, args)) => (program.as_str(), args),
            None => return Ok(127),
        };
        let (stdout, code) = match program {
            "echo" => (format!("{}\n", args.join(" ")), 0),
            "touch" => {
                for name in args {
                    std::fs::File::create(spec.host_dir.join(name))
                        .map_err(|err| EngineError::new(err.to_string()))?;
                }
                (String::new(), 0)
            }
            "sleep" => {
                let secs: f64 = args.first().and_then(|s| s.parse().ok()).unwrap_or(0.0);
                tokio::time::sleep(Duration::from_secs_f64(secs)).await;
                (String::new(), 0)
            }
            "true" => (String::new(), 0),
            "false" => (String::new(), 1),
            other => (format!("{}: not found\n", other), 127),
        };
        if let Some(container) = self.containers.lock().unwrap().get_mut(id) {
            container.stdout = stdout;
        }
        Ok(code)
    }

    async fn container_logs(&self, id: &str) -> Result<String> {
        self.record(EngineOp::Logs, id)?;
        self.pause(EngineOp::Logs).await;
        self.containers
            .lock()
            .unwrap()
            .get(id)
            .map(|c| c.stdout.clone())
            .ok_or_else(|| EngineError::new(format!("no such container: {}", id)))
    }

    async fn stop_container(&self, id: &str, _grace: Duration) -> Result<()> {
        self.record(EngineOp::Stop, id)?;
        self.pause(EngineOp::Stop).await;
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        self.record(EngineOp::Remove, id)?;
        self.pause(EngineOp::Remove).await;
        let mut containers = self.containers.lock().unwrap();
        match containers.get_mut(id) {
            Some(container) if !container.removed => {
                container.removed = true;
                self.live.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
            _ => Err(EngineError::new(format!("no such container: {}", id))),
        }
    }
}
