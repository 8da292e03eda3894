//! Ephemeral container jobs.
//!
//! A job stages an input archive into a fresh workspace, runs one command in
//! a container with that workspace mounted, and hands back the container's
//! stdout together with an archive of the workspace as the container left
//! it. Containers and workspaces never outlive their job.

mod actors;
pub mod archive;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod types;
pub mod workspace;

// re-export the job coord handle as if it is the job coordinator itself.
pub use actors::coordinator::JobCoordinatorHandle as JobCoordinator;
pub use config::CoordinatorConfig;
pub use events::{JobOutcome, JobState, JobSummary};
pub use types::JobSpec;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::FakeEngine;
    use crate::workspace::WorkspaceRoot;
    use std::sync::Arc;

    #[tokio::test]
    async fn basic() {
        let root = tempfile::tempdir().unwrap();
        let coordinator = JobCoordinator::spawn(
            Arc::new(FakeEngine::new()),
            WorkspaceRoot::create(root.path()).unwrap(),
            CoordinatorConfig::default(),
        );
        let echo_str = "hello world!";
        let input = archive::pack(tempfile::tempdir().unwrap().path()).unwrap();
        let spec = JobSpec::new("alpine".into(), vec!["echo".into(), echo_str.into()])
            .expect("job spec err");

        let outcome = coordinator
            .run_job(spec, input.into())
            .await
            .expect("job run err");

        assert_eq!(outcome.stdout, format!("{}\n", echo_str));
    }
}
