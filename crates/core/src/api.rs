//! HTTP control surface.
//!
//! JSON endpoints over a shared [`Controller`]. Error bodies carry a `detail`
//! field: a message string, or an object with `status` and `logs` when the
//! failure captured container or build output.

use crate::errors::{DockerError, DockhandError};
use crate::lifecycle::{
    Controller, DataUpdateOutcome, RebuildOutcome, RestartOutcome, StartOutcome, StatusReport,
    StopOutcome,
};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<Controller>,
}

/// Body of `POST /update-data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataUpdateRequest {
    pub filename: String,
    pub content: String,
}

/// Creates the control API router.
pub fn create_router(controller: Arc<Controller>) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/start", post(start_container))
        .route("/stop", post(stop_container))
        .route("/restart", post(restart_container))
        .route("/update-data", post(update_data))
        .route("/rebuild", post(rebuild_and_redeploy))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { controller })
}

/// Binds `listen` and serves until Ctrl-C.
pub async fn serve(controller: Arc<Controller>, listen: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!("Control API listening on {}", listener.local_addr()?);
    axum::serve(listener, create_router(controller))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn get_status(State(state): State<AppState>) -> Result<Json<StatusReport>, DockhandError> {
    Ok(Json(state.controller.status().await?))
}

async fn start_container(
    State(state): State<AppState>,
) -> Result<Json<StartOutcome>, DockhandError> {
    Ok(Json(
        detached(&state, |controller| async move { controller.start().await }).await?,
    ))
}

async fn stop_container(State(state): State<AppState>) -> Result<Json<StopOutcome>, DockhandError> {
    Ok(Json(
        detached(&state, |controller| async move { controller.stop().await }).await?,
    ))
}

async fn restart_container(
    State(state): State<AppState>,
) -> Result<Json<RestartOutcome>, DockhandError> {
    Ok(Json(
        detached(&state, |controller| async move { controller.restart().await }).await?,
    ))
}

async fn update_data(
    State(state): State<AppState>,
    payload: Result<Json<DataUpdateRequest>, JsonRejection>,
) -> Result<Json<DataUpdateOutcome>, DockhandError> {
    let Json(request) = payload.map_err(|rejection| DockhandError::InvalidRequest {
        message: rejection.body_text(),
    })?;
    Ok(Json(
        detached(&state, |controller| async move {
            controller
                .update_data(&request.filename, &request.content)
                .await
        })
        .await?,
    ))
}

async fn rebuild_and_redeploy(
    State(state): State<AppState>,
) -> Result<Json<RebuildOutcome>, DockhandError> {
    Ok(Json(
        detached(&state, |controller| async move { controller.rebuild().await }).await?,
    ))
}

/// Runs a mutating operation on its own task.
///
/// Axum drops the handler future when the client disconnects; the spawned task
/// keeps going so a stop is never left without its matching restart.
async fn detached<T, F, Fut>(state: &AppState, operation: F) -> Result<T, DockhandError>
where
    F: FnOnce(Arc<Controller>) -> Fut,
    Fut: Future<Output = Result<T, DockhandError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(operation(state.controller.clone()))
        .await
        .map_err(|e| DockhandError::Internal(format!("Operation task failed: {}", e)))?
}

/// `detail` payload for an error response.
pub fn error_detail(err: &DockhandError) -> serde_json::Value {
    match err {
        DockhandError::RuntimeUnavailable { .. } => json!("Docker daemon is not available."),
        DockhandError::FailedToStart { logs } => {
            json!({"status": "container_failed_to_start", "logs": logs})
        }
        DockhandError::FailedOnRestart { logs } => {
            json!({"status": "container_failed_on_restart", "logs": logs})
        }
        DockhandError::Docker(DockerError::BuildFailed { logs }) => {
            json!({"status": "build_failed", "logs": logs})
        }
        DockhandError::Docker(DockerError::ContainerNotFound { .. }) => {
            json!("Container not found.")
        }
        DockhandError::Docker(inner @ DockerError::ImageNotFound { .. }) => {
            json!(inner.to_string())
        }
        DockhandError::DataWrite {
            restart: Some(restart),
            ..
        } => json!(format!("{}; restart also failed: {}", err, restart)),
        other => json!(other.to_string()),
    }
}

impl IntoResponse for DockhandError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(json!({ "detail": error_detail(&self) }))).into_response()
    }
}
