//! HTTP surface of the dispatch service
//!
//! Thin layer over the dispatcher and the computation watcher: submission
//! mints a computation id, creates the jobs, and spawns the watcher task;
//! status and delete operate on the computation's label set.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::{error, info};
use uuid::Uuid;

use solvent_common::models::{ComputationRequest, ComputationStatus};
use solvent_common::Error;

use crate::dispatcher::Dispatcher;
use crate::watcher::ComputationWatcher;

/// Shared handles the handlers operate on
#[derive(Clone)]
pub struct AppState {
    /// Job submission and listing
    pub dispatcher: Arc<Dispatcher>,
    /// Per-computation reconciliation loops
    pub watcher: Arc<ComputationWatcher>,
}

/// Error wrapper mapping service errors onto HTTP statuses
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Orchestrator { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error!(error = %self.0, "request failed");
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Build the service router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_jobs))
        .route("/run", post(run_computation))
        .route("/status/{computation_id}", get(computation_status))
        .route("/delete/{computation_id}", post(delete_computation))
        .with_state(state)
}

/// List the names of every job carrying the system tag
async fn list_jobs(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let handles = state.dispatcher.list(None).await?;
    let names: Vec<&str> = handles.iter().map(|h| h.name()).collect();
    Ok(Json(serde_json::json!({ "jobs": names })))
}

/// Submit a computation: one job per solver, then watch until termination
async fn run_computation(
    State(state): State<AppState>,
    Json(request): Json<ComputationRequest>,
) -> Result<Json<ComputationStatus>, ApiError> {
    let computation_id = Uuid::new_v4().to_string();
    let handles = state.dispatcher.submit(&request, &computation_id).await?;
    info!(
        computation_id = %computation_id,
        user_id = %request.user_id,
        solvers = handles.len(),
        "computation submitted"
    );

    let watcher = state.watcher.clone();
    let id = computation_id.clone();
    let user_id = request.user_id.clone();
    tokio::spawn(async move {
        match watcher.run(&id, &user_id).await {
            Ok(outcome) => {
                info!(computation_id = %id, outcome = %outcome, "computation reported")
            }
            Err(e) => {
                error!(computation_id = %id, error = %e, "computation watcher failed")
            }
        }
    });

    Ok(Json(ComputationStatus {
        computation_id,
        solvers: handles.iter().map(|h| h.solver()).collect(),
    }))
}

/// Snapshot of one computation's solvers
async fn computation_status(
    State(state): State<AppState>,
    Path(computation_id): Path<String>,
) -> Result<Json<ComputationStatus>, ApiError> {
    let handles = state.dispatcher.list(Some(&computation_id)).await?;
    Ok(Json(ComputationStatus {
        computation_id,
        solvers: handles.iter().map(|h| h.solver()).collect(),
    }))
}

/// Delete all of a computation's jobs without notifying the scheduler
async fn delete_computation(
    State(state): State<AppState>,
    Path(computation_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = state.dispatcher.delete_computation(&computation_id).await?;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}
