mod config;
mod extractors;
mod services;

use axum::{extract::DefaultBodyLimit, routing::get, routing::post, Router};
use clap::Parser;
use config::ServerConfig;
use joblib::engine::DockerEngine;
use joblib::workspace::WorkspaceRoot;
use joblib::JobCoordinator;
use services::{execservice, status, AppState};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::parse();
    serve(config).await
}

pub fn router(state: AppState, max_request_bytes: usize) -> Router {
    Router::new()
        .route(
            protocol::EXEC_ROUTE,
            post(execservice::exec).fallback(execservice::wrong_method),
        )
        .route(protocol::JOBS_ROUTE, get(execservice::list_jobs))
        .route("/", get(status::health))
        .route(protocol::HEALTH_ROUTE, get(status::health))
        .route(protocol::CPU_ROUTE, get(status::cpu))
        .route(protocol::MEMORY_ROUTE, get(status::memory))
        .route(protocol::LOAD_ROUTE, get(status::load))
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .with_state(state)
}

async fn serve(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let engine = DockerEngine::connect()?;
    engine.ping().await?;

    let workspaces = WorkspaceRoot::create(&config.workspace_root)?;
    workspaces.sweep_stale();
    info!(root = ?workspaces.path(), "workspace root ready");

    let coordinator =
        JobCoordinator::spawn(Arc::new(engine), workspaces, config.coordinator_config());
    let app = router(
        AppState {
            coordinator: coordinator.clone(),
        },
        config.max_request_bytes,
    );

    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    info!(addr = %config.listen, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("shutdown requested, cancelling in-flight jobs");
            if let Err(err) = coordinator.shutdown().await {
                warn!(error = %err, "failed to signal the job coordinator");
            }
        })
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header::CONTENT_TYPE, Method, Request, StatusCode},
        response::Response,
    };
    use http_body_util::BodyExt;
    use joblib::archive;
    use joblib::engine::fake::{EngineOp, FakeEngine};
    use joblib::CoordinatorConfig;
    use protocol::{ExecResponse, JobListing, DATA_PART, RECIPE_PART};
    use std::fs;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "exec-test-boundary";

    struct TestApp {
        router: Router,
        engine: Arc<FakeEngine>,
        root: TempDir,
    }

    impl TestApp {
        fn new() -> Self {
            let root = tempfile::tempdir().unwrap();
            let engine = Arc::new(FakeEngine::new());
            let coordinator = JobCoordinator::spawn(
                engine.clone(),
                WorkspaceRoot::create(root.path()).unwrap(),
                CoordinatorConfig::default(),
            );
            let router = router(AppState { coordinator }, 1024 * 1024);
            Self {
                router,
                engine,
                root,
            }
        }

        async fn send(&self, request: Request<Body>) -> Response {
            self.router.clone().oneshot(request).await.unwrap()
        }

        fn assert_root_empty(&self) {
            assert_eq!(fs::read_dir(self.root.path()).unwrap().count(), 0);
        }
    }

    fn input_with(files: &[(&str, &str)]) -> Vec<u8> {
        let src = tempfile::tempdir().unwrap();
        for (name, contents) in files {
            fs::write(src.path().join(name), contents).unwrap();
        }
        archive::pack(src.path()).unwrap()
    }

    fn json_request(image: &str, command: &[&str], data: &str) -> Request<Body> {
        let body = serde_json::json!({
            "command": command,
            "image": image,
            "data": data,
        });
        Request::builder()
            .method(Method::POST)
            .uri(protocol::EXEC_ROUTE)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn recipe_json(image: &str, command: &[&str]) -> Vec<u8> {
        serde_json::json!({ "command": command, "image": image })
            .to_string()
            .into_bytes()
    }

    fn multipart_request(image: &str, command: &[&str], data: &[u8]) -> Request<Body> {
        let recipe = recipe_json(image, command);
        multipart_with_parts(&[(RECIPE_PART, &recipe[..]), (DATA_PART, data)])
    }

    fn multipart_with_parts(parts: &[(&str, &[u8])]) -> Request<Body> {
        let mut body = Vec::new();
        for (name, contents) in parts {
            let disposition = if *name == DATA_PART {
                format!(
                    "form-data; name=\"{}\"; filename=\"input.tar\"\r\n\
                     Content-Type: application/octet-stream",
                    name
                )
            } else {
                format!("form-data; name=\"{}\"", name)
            };
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: {}\r\n\r\n",
                    BOUNDARY, disposition
                )
                .as_bytes(),
            );
            body.extend_from_slice(contents);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri(protocol::EXEC_ROUTE)
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        response
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec()
    }

    async fn exec_response(response: Response) -> ExecResponse {
        assert_eq!(response.status(), StatusCode::OK);
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    fn unpacked_names(data: &str) -> Vec<String> {
        let bytes = protocol::decode_artifact(data).unwrap();
        let dest = tempfile::tempdir().unwrap();
        archive::unpack(&bytes, dest.path()).unwrap();
        let mut names: Vec<String> = fs::read_dir(dest.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn json_echo_returns_stdout_and_workspace() {
        let app = TestApp::new();
        let data = protocol::encode_artifact(&input_with(&[("a.txt", "")]));

        let response = app.send(json_request("alpine", &["echo", "hi"], &data)).await;
        let body = exec_response(response).await;

        assert_eq!(body.stdout, "hi\n");
        assert_eq!(unpacked_names(&body.data), vec!["a.txt"]);
        assert_eq!(app.engine.live_containers(), 0);
        app.assert_root_empty();
    }

    #[tokio::test]
    async fn multipart_echo_returns_stdout_and_workspace() {
        let app = TestApp::new();
        let input = input_with(&[("a.txt", "")]);

        let response = app
            .send(multipart_request("alpine", &["echo", "hi"], &input))
            .await;
        let body = exec_response(response).await;

        assert_eq!(body.stdout, "hi\n");
        assert_eq!(unpacked_names(&body.data), vec!["a.txt"]);
        app.assert_root_empty();
    }

    #[tokio::test]
    async fn files_created_by_the_command_are_returned() {
        let app = TestApp::new();
        let data = protocol::encode_artifact(&input_with(&[]));

        let response = app
            .send(json_request("alpine", &["touch", "out.txt"], &data))
            .await;
        let body = exec_response(response).await;

        assert_eq!(body.stdout, "");
        assert_eq!(unpacked_names(&body.data), vec!["out.txt"]);
    }

    #[tokio::test]
    async fn empty_command_is_rejected_before_any_work() {
        let app = TestApp::new();
        let data = protocol::encode_artifact(&input_with(&[]));

        let response = app.send(json_request("alpine", &[], &data)).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(app.engine.calls().is_empty());
        app.assert_root_empty();
    }

    #[tokio::test]
    async fn unknown_image_fails_without_leftovers() {
        let app = TestApp::new();
        let data = protocol::encode_artifact(&input_with(&[]));

        let response = app
            .send(json_request("nonexistent:tag", &["true"], &data))
            .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_bytes(response).await.is_empty());
        assert_eq!(app.engine.count(EngineOp::Create), 0);
        app.assert_root_empty();
    }

    #[tokio::test]
    async fn malformed_inputs_are_bad_requests() {
        let app = TestApp::new();

        let bad_base64 = app
            .send(json_request("alpine", &["true"], "not base64!"))
            .await;
        assert_eq!(bad_base64.status(), StatusCode::BAD_REQUEST);

        let corrupt = protocol::encode_artifact(&b"not a tar archive ".repeat(64));
        let corrupt_archive = app.send(json_request("alpine", &["true"], &corrupt)).await;
        assert_eq!(corrupt_archive.status(), StatusCode::BAD_REQUEST);

        let missing_data = app.send(json_request("alpine", &["true"], "")).await;
        assert_eq!(missing_data.status(), StatusCode::BAD_REQUEST);

        assert!(app.engine.calls().is_empty());
        app.assert_root_empty();
    }

    #[tokio::test]
    async fn multipart_rejections_match_json() {
        let app = TestApp::new();
        let input = input_with(&[("a.txt", "")]);
        let recipe = recipe_json("alpine", &["true"]);

        let cases = vec![
            ("empty command", multipart_request("alpine", &[], &input)),
            ("empty image", multipart_request("", &["true"], &input)),
            (
                "missing data part",
                multipart_with_parts(&[(RECIPE_PART, &recipe[..])]),
            ),
            (
                "missing recipe part",
                multipart_with_parts(&[(DATA_PART, &input[..])]),
            ),
            (
                "recipe is not json",
                multipart_with_parts(&[(RECIPE_PART, &b"{not json"[..]), (DATA_PART, &input[..])]),
            ),
            (
                "empty data part",
                multipart_with_parts(&[(RECIPE_PART, &recipe[..]), (DATA_PART, &b""[..])]),
            ),
        ];
        for (case, request) in cases {
            let response = app.send(request).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", case);
        }

        assert!(app.engine.calls().is_empty());
        app.assert_root_empty();
    }

    #[tokio::test]
    async fn json_rejects_an_empty_image() {
        let app = TestApp::new();
        let data = protocol::encode_artifact(&input_with(&[]));

        let response = app.send(json_request("", &["true"], &data)).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(app.engine.calls().is_empty());
        app.assert_root_empty();
    }

    #[tokio::test]
    async fn unsupported_content_type_is_rejected() {
        let app = TestApp::new();
        let request = Request::builder()
            .method(Method::POST)
            .uri(protocol::EXEC_ROUTE)
            .header(CONTENT_TYPE, "text/plain")
            .body(Body::from("echo hi"))
            .unwrap();

        let response = app.send(request).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn other_verbs_on_the_exec_route_are_rejected() {
        let app = TestApp::new();
        let request = Request::builder()
            .method(Method::GET)
            .uri(protocol::EXEC_ROUTE)
            .body(Body::empty())
            .unwrap();

        let response = app.send(request).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(app.engine.calls().is_empty());
    }

    #[tokio::test]
    async fn health_routes_answer_ok() {
        let app = TestApp::new();
        for uri in ["/", protocol::HEALTH_ROUTE] {
            let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let response = app.send(request).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_bytes(response).await, b"ok");
        }
    }

    #[tokio::test]
    async fn jobs_lists_nothing_when_idle() {
        let app = TestApp::new();
        let data = protocol::encode_artifact(&input_with(&[]));
        exec_response(app.send(json_request("alpine", &["true"], &data)).await).await;

        let request = Request::builder()
            .uri(protocol::JOBS_ROUTE)
            .body(Body::empty())
            .unwrap();
        let response = app.send(request).await;

        assert_eq!(response.status(), StatusCode::OK);
        let jobs: Vec<JobListing> = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert!(jobs.is_empty());
    }
}
