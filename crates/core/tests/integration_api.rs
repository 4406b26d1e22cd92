//! Integration tests for the HTTP control API.
//!
//! Requests go through the full router with `oneshot`, backed by the mock
//! runtime.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{controller, mock_with_image, test_config, CONTAINER, IMAGE};
use dockhand_core::api::create_router;
use dockhand_core::docker::mock::{MockContainer, MockDocker};
use dockhand_core::docker::ContainerState;
use dockhand_core::lifecycle::Controller;
use dockhand_core::poll::PollConfig;
use dockhand_core::runtime::RuntimeHandle;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tower::ServiceExt;

async fn send(controller: Controller, request: Request<Body>) -> (StatusCode, Value) {
    let app = create_router(Arc::new(controller));
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_status_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let mock = mock_with_image();

    let (status, json) = send(controller(&mock, temp_dir.path()), get("/status")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"status": "not_found"}));
}

#[tokio::test]
async fn test_status_running() {
    let temp_dir = TempDir::new().unwrap();
    let mock = mock_with_image();
    mock.add_container(MockContainer::new(CONTAINER, IMAGE));

    let (status, json) = send(controller(&mock, temp_dir.path()), get("/status")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json,
        json!({"container_name": CONTAINER, "status": "running"})
    );
}

#[tokio::test]
async fn test_start_fresh_container() {
    let temp_dir = TempDir::new().unwrap();
    let mock = mock_with_image();

    let (status, json) = send(controller(&mock, temp_dir.path()), post("/start")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"status": "started_and_running"}));
}

#[tokio::test]
async fn test_stop_running_container() {
    let temp_dir = TempDir::new().unwrap();
    let mock = mock_with_image();
    mock.add_container(MockContainer::new(CONTAINER, IMAGE));
    mock.update_config(|c| {
        c.after_stop = vec![ContainerState::Running, ContainerState::Exited]
    });

    let (status, json) = send(controller(&mock, temp_dir.path()), post("/stop")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"status": "stopped_and_verified"}));
}

#[tokio::test]
async fn test_restart_missing_container_is_404() {
    let temp_dir = TempDir::new().unwrap();
    let mock = mock_with_image();

    let (status, json) = send(controller(&mock, temp_dir.path()), post("/restart")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json, json!({"detail": "Container not found."}));
}

#[tokio::test]
async fn test_unavailable_runtime_is_503() {
    let temp_dir = TempDir::new().unwrap();
    let controller = Controller::new(
        RuntimeHandle::unavailable("Cannot connect to the Docker daemon"),
        test_config(temp_dir.path()),
    );

    let (status, json) = send(controller, post("/start")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json, json!({"detail": "Docker daemon is not available."}));
}

#[tokio::test]
async fn test_start_timeout_is_504() {
    let temp_dir = TempDir::new().unwrap();
    let mock = mock_with_image();
    mock.update_config(|c| c.after_run = vec![ContainerState::Created]);

    let (status, json) = send(controller(&mock, temp_dir.path()), post("/start")).await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(
        json,
        json!({"detail": "Container start timed out after 10 attempts"})
    );
}

#[tokio::test]
async fn test_start_failure_returns_logs() {
    let temp_dir = TempDir::new().unwrap();
    let mock = mock_with_image();
    mock.update_config(|c| {
        c.after_run = vec![ContainerState::Exited];
        c.run_logs = "KeyError: 'APPKEY'".to_string();
    });

    let (status, json) = send(controller(&mock, temp_dir.path()), post("/start")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json,
        json!({"detail": {"status": "container_failed_to_start", "logs": "KeyError: 'APPKEY'"}})
    );
}

#[tokio::test]
async fn test_start_missing_image_is_404() {
    let temp_dir = TempDir::new().unwrap();
    let mock = Arc::new(MockDocker::new());

    let (status, json) = send(controller(&mock, temp_dir.path()), post("/start")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        json,
        json!({"detail": "Image 'trading-bot' not found. Please build it first."})
    );
}

#[tokio::test]
async fn test_update_data_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let mock = mock_with_image();
    mock.add_container(MockContainer::new(CONTAINER, IMAGE));

    let (status, json) = send(
        controller(&mock, temp_dir.path()),
        post_json(
            "/update-data",
            json!({"filename": "dsl.txt", "content": "hold\n"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json,
        json!({"status": "data_updated_and_restarted", "filename": "dsl.txt"})
    );
    assert_eq!(
        std::fs::read_to_string(temp_dir.path().join("dsl.txt")).unwrap(),
        "hold\n"
    );
}

#[tokio::test]
async fn test_update_data_invalid_filename_is_400() {
    let temp_dir = TempDir::new().unwrap();
    let mock = mock_with_image();
    mock.add_container(MockContainer::new(CONTAINER, IMAGE));

    let (status, json) = send(
        controller(&mock, temp_dir.path()),
        post_json(
            "/update-data",
            json!({"filename": "../etc/passwd", "content": "x"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["detail"].as_str().unwrap().contains("../etc/passwd"));
    assert_eq!(mock.stop_count(), 0);
}

#[tokio::test]
async fn test_update_data_malformed_body_is_422() {
    let temp_dir = TempDir::new().unwrap();
    let mock = mock_with_image();
    mock.add_container(MockContainer::new(CONTAINER, IMAGE));

    let (status, json) = send(
        controller(&mock, temp_dir.path()),
        post_json("/update-data", json!({"filename": "dsl.txt"})),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let detail = json["detail"].as_str().unwrap();
    assert!(detail.starts_with("Invalid request body"));
    assert!(detail.contains("content"));

    let not_json = Request::builder()
        .method("POST")
        .uri("/update-data")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("filename=dsl.txt"))
        .unwrap();
    let (status, json) = send(controller(&mock, temp_dir.path()), not_json).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["detail"].is_string());
    assert!(mock.history().is_empty());
}

#[tokio::test]
async fn test_update_data_write_and_restart_failure_is_500() {
    let temp_dir = TempDir::new().unwrap();
    let missing_dir = temp_dir.path().join("missing");
    let mock = mock_with_image();
    mock.add_container(MockContainer::new(CONTAINER, IMAGE).with_logs("crash"));
    mock.update_config(|c| c.after_restart = vec![ContainerState::Dead]);

    let (status, json) = send(
        controller(&mock, &missing_dir),
        post_json(
            "/update-data",
            json!({"filename": "dsl.txt", "content": "x"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let detail = json["detail"].as_str().unwrap();
    assert!(detail.starts_with("Failed to write to file"));
    assert!(detail.contains("restart also failed: Container failed on restart"));
}

#[tokio::test]
async fn test_update_data_finishes_after_client_disconnects() {
    let temp_dir = TempDir::new().unwrap();
    let mock = mock_with_image();
    mock.add_container(MockContainer::new(CONTAINER, IMAGE));
    mock.update_config(|c| c.after_stop = vec![ContainerState::Running, ContainerState::Exited]);
    let controller = controller(&mock, temp_dir.path())
        .with_poll_config(PollConfig::new(10, Duration::from_millis(100)));
    let app = create_router(Arc::new(controller));

    // Give up while the stop is still being polled
    let request = post_json(
        "/update-data",
        json!({"filename": "dsl.txt", "content": "sell\n"}),
    );
    let dropped = tokio::time::timeout(Duration::from_millis(150), app.oneshot(request)).await;
    assert!(dropped.is_err());
    assert_eq!(mock.restart_count(), 0);

    let deadline = Instant::now() + Duration::from_secs(5);
    while !(mock.restart_count() == 1 && mock.container_state(CONTAINER) == ContainerState::Running)
    {
        assert!(Instant::now() < deadline, "update did not complete");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(mock.stop_count(), 1);
    assert_eq!(
        std::fs::read_to_string(temp_dir.path().join("dsl.txt")).unwrap(),
        "sell\n"
    );
}

#[tokio::test]
async fn test_rebuild_success_includes_build_logs() {
    let temp_dir = TempDir::new().unwrap();
    let mock = Arc::new(MockDocker::new());

    let (status, json) = send(controller(&mock, temp_dir.path()), post("/rebuild")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "rebuild_and_restart_successful");
    assert_eq!(
        json["final_container_status"],
        json!({"status": "started_and_running"})
    );
    assert!(json["build_logs"]
        .as_str()
        .unwrap()
        .contains("Successfully tagged"));
}

#[tokio::test]
async fn test_rebuild_failure_returns_build_logs() {
    let temp_dir = TempDir::new().unwrap();
    let mock = mock_with_image();
    mock.update_config(|c| c.build_failure = Some("ERROR: failed to solve".to_string()));

    let (status, json) = send(controller(&mock, temp_dir.path()), post("/rebuild")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json,
        json!({"detail": {"status": "build_failed", "logs": "ERROR: failed to solve"}})
    );
    assert_eq!(mock.run_count(), 0);
}
