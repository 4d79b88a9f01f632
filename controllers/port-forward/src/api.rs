//! Admin HTTP API
//!
//! Every orchestrator call runs on its own spawned task, so a client that
//! disconnects mid-request cannot abandon an operation half way. Reconciliation
//! is asynchronous: `POST /v1/reconcile` answers 202 with a task id and the
//! report is read back from `GET /v1/tasks/{id}`.

use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::provisioner::{CreatePoolRequest, PortForwardOptions, ProvisionRequest, Provisioner};
use crate::reconciler::Reconciler;
use crate::tasks::TaskStore;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;
use vyos_commands::PortKind;

/// Shared handles of the running controller
#[derive(Clone)]
pub struct AppState {
    pub provisioner: Arc<Provisioner>,
    pub reconciler: Arc<Reconciler>,
    pub tasks: Arc<TaskStore>,
    pub metrics: Metrics,
}

impl ControllerError {
    /// HTTP status reported for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ControllerError::NotFound(_) => StatusCode::NOT_FOUND,
            ControllerError::Conflict(_) => StatusCode::CONFLICT,
            ControllerError::ResourceExhausted(_)
            | ControllerError::Busy(_)
            | ControllerError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            ControllerError::Device(_) => StatusCode::BAD_GATEWAY,
            ControllerError::InvalidRequest(_) | ControllerError::Command(_) => StatusCode::BAD_REQUEST,
            ControllerError::InconsistentState(_)
            | ControllerError::DecommissionIncomplete { .. }
            | ControllerError::Store(_)
            | ControllerError::InvalidConfig(_)
            | ControllerError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ControllerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ControllerError>;

/// Run `operation` to completion on its own task
async fn detached<T, F>(operation: F) -> Result<T, ControllerError>
where
    F: Future<Output = Result<T, ControllerError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(operation)
        .await
        .map_err(|e| ControllerError::Server(format!("operation task failed: {}", e)))?
}

/// Admin API routes over `state`
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/v1/pools", post(create_pool).get(list_pools))
        .route("/v1/endpoints", post(provision))
        .route("/v1/endpoints/{machine_id}", get(get_endpoint).delete(decommission))
        .route(
            "/v1/endpoints/{machine_id}/ports/{kind}",
            post(add_port_forward).delete(remove_port_forward),
        )
        .route("/v1/endpoints/{machine_id}/ports/{kind}/enable", post(enable_rule))
        .route("/v1/endpoints/{machine_id}/ports/{kind}/disable", post(disable_rule))
        .route("/v1/reconcile", post(reconcile))
        .route("/v1/tasks/{id}", get(get_task))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics(State(state): State<AppState>) -> Result<Response, ControllerError> {
    let body = state.metrics.render()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response())
}

async fn create_pool(
    State(state): State<AppState>,
    Json(request): Json<CreatePoolRequest>,
) -> Result<impl IntoResponse, ControllerError> {
    let provisioner = state.provisioner.clone();
    let pool = detached(async move { provisioner.create_pool(request).await }).await?;
    Ok((StatusCode::CREATED, Json(pool)))
}

async fn list_pools(State(state): State<AppState>) -> ApiResult<Vec<inventory::AddressPool>> {
    Ok(Json(state.provisioner.list_pools().await?))
}

async fn provision(
    State(state): State<AppState>,
    Json(request): Json<ProvisionRequest>,
) -> Result<impl IntoResponse, ControllerError> {
    let provisioner = state.provisioner.clone();
    let response = detached(async move { provisioner.provision(request).await }).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn get_endpoint(
    State(state): State<AppState>,
    Path(machine_id): Path<String>,
) -> ApiResult<crate::provisioner::EndpointView> {
    Ok(Json(state.provisioner.get_endpoint(&machine_id).await?))
}

async fn decommission(
    State(state): State<AppState>,
    Path(machine_id): Path<String>,
) -> ApiResult<crate::provisioner::DecommissionResponse> {
    let provisioner = state.provisioner.clone();
    Ok(Json(
        detached(async move { provisioner.decommission(&machine_id).await }).await?,
    ))
}

async fn add_port_forward(
    State(state): State<AppState>,
    Path((machine_id, kind)): Path<(String, PortKind)>,
    Json(options): Json<PortForwardOptions>,
) -> Result<impl IntoResponse, ControllerError> {
    let provisioner = state.provisioner.clone();
    let rule = detached(async move { provisioner.add_port_forward(&machine_id, kind, options).await }).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

async fn remove_port_forward(
    State(state): State<AppState>,
    Path((machine_id, kind)): Path<(String, PortKind)>,
) -> ApiResult<inventory::PortForwardRule> {
    let provisioner = state.provisioner.clone();
    Ok(Json(
        detached(async move { provisioner.remove_port_forward(&machine_id, kind).await }).await?,
    ))
}

async fn set_rule_enabled(
    state: AppState,
    machine_id: String,
    kind: PortKind,
    enabled: bool,
) -> ApiResult<inventory::PortForwardRule> {
    let provisioner = state.provisioner.clone();
    Ok(Json(
        detached(async move { provisioner.set_rule_enabled(&machine_id, kind, enabled).await }).await?,
    ))
}

async fn enable_rule(
    State(state): State<AppState>,
    Path((machine_id, kind)): Path<(String, PortKind)>,
) -> ApiResult<inventory::PortForwardRule> {
    set_rule_enabled(state, machine_id, kind, true).await
}

async fn disable_rule(
    State(state): State<AppState>,
    Path((machine_id, kind)): Path<(String, PortKind)>,
) -> ApiResult<inventory::PortForwardRule> {
    set_rule_enabled(state, machine_id, kind, false).await
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskAccepted {
    task_id: Uuid,
}

async fn reconcile(State(state): State<AppState>) -> Result<impl IntoResponse, ControllerError> {
    let id = state.tasks.start("reconcile")?;
    let reconciler = state.reconciler.clone();
    let tasks = state.tasks.clone();
    tokio::spawn(async move {
        match reconciler.run().await {
            Ok(report) => match serde_json::to_value(&report) {
                Ok(value) => tasks.complete(id, value),
                Err(e) => tasks.fail(id, e.to_string()),
            },
            Err(e) => {
                error!("Reconciliation task {} failed: {}", id, e);
                tasks.fail(id, e.to_string());
            }
        }
    });
    info!("Started reconciliation task {}", id);
    Ok((StatusCode::ACCEPTED, Json(TaskAccepted { task_id: id })))
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<crate::tasks::TaskRecord> {
    state
        .tasks
        .get(id)
        .map(Json)
        .ok_or_else(|| ControllerError::NotFound(format!("task {}", id)))
}
