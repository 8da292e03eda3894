use super::AppState;
use crate::extractors::JobRequest;
use axum::{extract::State, http::StatusCode, Json};
use joblib::errors::JobError;
use protocol::{ExecResponse, JobListing};
use tracing::{error, info, warn};

/// Run one job and answer with its stdout and the final workspace archive.
///
/// Failure responses carry no body; the cause is logged.
pub async fn exec(
    State(state): State<AppState>,
    request: JobRequest,
) -> Result<Json<ExecResponse>, StatusCode> {
    let JobRequest { spec, input } = request;
    let image = spec.image().to_string();

    match state.coordinator.run_job(spec, input).await {
        Ok(outcome) => {
            info!(
                job_id = %outcome.job_id,
                %image,
                exit_code = outcome.exit_code,
                artifact_bytes = outcome.artifact.len(),
                "execution succeeded"
            );
            Ok(Json(ExecResponse {
                stdout: outcome.stdout,
                data: protocol::encode_artifact(&outcome.artifact),
            }))
        }
        Err(err) => {
            let status = status_for(&err);
            if status.is_server_error() {
                error!(%image, error = %err, "execution failed");
            } else {
                warn!(%image, error = %err, "execution rejected");
            }
            Err(status)
        }
    }
}

pub fn status_for(err: &JobError) -> StatusCode {
    match err {
        err if err.is_client_error() => StatusCode::BAD_REQUEST,
        JobError::Cancelled { .. } | JobError::CoordinatorExited => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Any verb other than POST on the execution route.
pub async fn wrong_method() -> StatusCode {
    StatusCode::BAD_REQUEST
}

pub async fn list_jobs(State(state): State<AppState>) -> Result<Json<Vec<JobListing>>, StatusCode> {
    let jobs = state
        .coordinator
        .list_jobs()
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(
        jobs.into_iter()
            .map(|job| JobListing {
                job_id: job.job_id.to_string(),
                state: job.state.to_string(),
            })
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use joblib::archive::ArchiveError;
    use joblib::engine::EngineError;
    use joblib::JobState;
    use std::io;

    #[test]
    fn client_mistakes_are_bad_requests() {
        assert_eq!(
            status_for(&JobError::Validation("empty".into())),
            StatusCode::BAD_REQUEST
        );
        let corrupt = ArchiveError::Malformed(io::Error::new(io::ErrorKind::InvalidData, "bad"));
        assert_eq!(
            status_for(&JobError::InputArchive(corrupt)),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn runtime_failures_are_server_errors() {
        let engine = || EngineError::new("boom");
        for err in [
            JobError::ImagePull {
                image: "alpine".into(),
                source: engine(),
            },
            JobError::ContainerStart(engine()),
            JobError::Timeout {
                state: JobState::Running,
            },
            JobError::Aborted,
        ] {
            assert_eq!(status_for(&err), StatusCode::INTERNAL_SERVER_ERROR, "{:?}", err);
        }
    }

    #[test]
    fn shutdown_is_unavailable() {
        assert_eq!(
            status_for(&JobError::Cancelled {
                state: JobState::Queued
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&JobError::CoordinatorExited),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
