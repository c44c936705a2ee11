//! REST surface of the lifecycle contract.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/v1/vnfr/instantiate` | Instantiate a record on a venue pool |
//! | POST | `/api/v1/vnfr/{id}/start` | Start a record |
//! | POST | `/api/v1/vnfr/{id}/modify` | Record a dependency update |
//! | POST | `/api/v1/vnfr/{id}/scale` | Scale out or in |
//! | POST | `/api/v1/vnfr/{id}/terminate` | Terminate a record |
//! | GET | `/api/v1/records` | IDs of persisted records |
//! | GET | `/api/v1/records/{id}` | Persisted instance config |
//! | GET | `/healthz` | Liveness |

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::warn;
use vnfm_catalogue::{
    ScaleDirection, ScaleTarget, VenuePool, VirtualNetworkFunctionRecord, VnfRecordDependency,
};
use vnfm_driver::{DriverError, DriverResult, ErrorKind, VnfmHandler};
use vnfm_state::RecordStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<dyn VnfmHandler>,
    pub store: RecordStore,
    pub name: String,
}

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/vnfr/instantiate", post(instantiate))
        .route("/vnfr/{id}/start", post(start))
        .route("/vnfr/{id}/modify", post(modify))
        .route("/vnfr/{id}/scale", post(scale))
        .route("/vnfr/{id}/terminate", post(terminate))
        .route("/records", get(list_records))
        .route("/records/{id}", get(get_record))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(healthz).with_state(state))
}

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Input => StatusCode::BAD_REQUEST,
        ErrorKind::Missing => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Resolution | ErrorKind::Backend | ErrorKind::Store => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn lifecycle_response(result: DriverResult<VirtualNetworkFunctionRecord>) -> Response {
    match result {
        Ok(vnfr) => ApiResponse::ok(vnfr).into_response(),
        Err(e) => driver_error(e),
    }
}

fn driver_error(e: DriverError) -> Response {
    let status = status_for(e.kind());
    if status.is_server_error() {
        warn!(error = %e, %status, "lifecycle call failed");
    }
    error_response(&e.to_string(), status)
}

/// The record in the body must be the one named by the path.
fn check_id(path_id: &str, vnfr: &VirtualNetworkFunctionRecord) -> Result<(), Response> {
    if path_id == vnfr.id {
        Ok(())
    } else {
        Err(error_response(
            &format!("path names record {path_id} but body carries {}", vnfr.id),
            StatusCode::BAD_REQUEST,
        ))
    }
}

// ── Lifecycle ──────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct InstantiateRequest {
    pub vnfr: VirtualNetworkFunctionRecord,
    /// Candidate venues keyed by parent deployment unit.
    #[serde(default)]
    pub venues: VenuePool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModifyRequest {
    pub vnfr: VirtualNetworkFunctionRecord,
    pub dependency: VnfRecordDependency,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScaleRequest {
    pub direction: ScaleDirection,
    pub vnfr: VirtualNetworkFunctionRecord,
    pub target: ScaleTarget,
    #[serde(default)]
    pub dependency: Option<VnfRecordDependency>,
}

/// POST /api/v1/vnfr/instantiate
pub async fn instantiate(
    State(state): State<AppState>,
    Json(req): Json<InstantiateRequest>,
) -> impl IntoResponse {
    let result = state.handler.instantiate(req.vnfr, &req.venues).await;
    match result {
        Ok(vnfr) => (StatusCode::CREATED, ApiResponse::ok(vnfr)).into_response(),
        Err(e) => driver_error(e),
    }
}

/// POST /api/v1/vnfr/{id}/start
pub async fn start(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(vnfr): Json<VirtualNetworkFunctionRecord>,
) -> impl IntoResponse {
    if let Err(resp) = check_id(&id, &vnfr) {
        return resp;
    }
    lifecycle_response(state.handler.start(vnfr).await)
}

/// POST /api/v1/vnfr/{id}/modify
pub async fn modify(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ModifyRequest>,
) -> impl IntoResponse {
    if let Err(resp) = check_id(&id, &req.vnfr) {
        return resp;
    }
    lifecycle_response(state.handler.modify(req.vnfr, &req.dependency).await)
}

/// POST /api/v1/vnfr/{id}/scale
pub async fn scale(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ScaleRequest>,
) -> impl IntoResponse {
    if let Err(resp) = check_id(&id, &req.vnfr) {
        return resp;
    }
    let result = state
        .handler
        .scale(req.direction, req.vnfr, req.target, req.dependency.as_ref())
        .await;
    lifecycle_response(result)
}

/// POST /api/v1/vnfr/{id}/terminate
pub async fn terminate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(vnfr): Json<VirtualNetworkFunctionRecord>,
) -> impl IntoResponse {
    if let Err(resp) = check_id(&id, &vnfr) {
        return resp;
    }
    lifecycle_response(state.handler.terminate(vnfr).await)
}

// ── Records ────────────────────────────────────────────────────

/// GET /api/v1/records
pub async fn list_records(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.list_ids() {
        Ok(ids) => ApiResponse::ok(ids).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// GET /api/v1/records/{id}
pub async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get(&id) {
        Ok(Some(config)) => ApiResponse::ok(config).into_response(),
        Ok(None) => error_response("record not found", StatusCode::NOT_FOUND),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// GET /healthz
pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    ApiResponse::ok(serde_json::json!({
        "status": "ok",
        "name": state.name,
    }))
}
