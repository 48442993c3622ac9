use std::sync::Arc;

use axum::extract::{Extension, Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use gatehouse_core::{Actor, ListParams, Role, ServiceError};

use crate::model::{
    CreateLocalLeave, CreateOutstationLeave, GatepassSummary, LocalDecideRequest, LocalLeave,
    OutstationLeave, StageDecideRequest,
};
use crate::service::WorkflowService;

type SvcState = Arc<WorkflowService>;

pub fn router(svc: Arc<WorkflowService>) -> Router {
    Router::new()
        .route("/local", post(create_local).get(my_local))
        .route("/local/queue", get(local_queue))
        .route("/local/decided", get(local_decided))
        .route("/local/{id}", get(get_local).delete(withdraw_local))
        .route("/local/{id}/@decide", post(decide_local))
        .route("/outstation", post(create_outstation).get(my_outstation))
        .route("/outstation/queue", get(outstation_queue))
        .route("/outstation/decided", get(outstation_decided))
        .route("/outstation/{id}", get(get_outstation))
        .route("/outstation/{id}/@decide", post(decide_outstation))
        .route("/records/{number}", get(lookup_record))
        .with_state(svc)
}

// ---------------------------------------------------------------------------
// POST /local
// ---------------------------------------------------------------------------

async fn create_local(
    State(svc): State<SvcState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CreateLocalLeave>,
) -> Result<Json<LocalLeave>, ServiceError> {
    let rec = svc.create_local(&actor, req)?;
    Ok(Json(rec))
}

// ---------------------------------------------------------------------------
// GET /local
// ---------------------------------------------------------------------------

async fn my_local(
    State(svc): State<SvcState>,
    Extension(actor): Extension<Actor>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let result = svc.my_local(&actor, &params)?;
    Ok(Json(serde_json::json!({
        "items": result.items,
        "total": result.total,
    })))
}

// ---------------------------------------------------------------------------
// GET /local/queue
// ---------------------------------------------------------------------------

async fn local_queue(
    State(svc): State<SvcState>,
    Extension(actor): Extension<Actor>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let result = svc.local_queue(&actor, &params)?;
    Ok(Json(serde_json::json!({
        "items": result.items,
        "total": result.total,
    })))
}

// ---------------------------------------------------------------------------
// GET /local/decided
// ---------------------------------------------------------------------------

async fn local_decided(
    State(svc): State<SvcState>,
    Extension(actor): Extension<Actor>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let result = svc.local_decided(&actor, &params)?;
    Ok(Json(serde_json::json!({
        "items": result.items,
        "total": result.total,
    })))
}

// ---------------------------------------------------------------------------
// GET /local/:id
// ---------------------------------------------------------------------------

async fn get_local(
    State(svc): State<SvcState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<LocalLeave>, ServiceError> {
    let rec = svc.get_local(&actor, &id)?;
    Ok(Json(rec))
}

// ---------------------------------------------------------------------------
// POST /local/:id/@decide
// ---------------------------------------------------------------------------

async fn decide_local(
    State(svc): State<SvcState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(req): Json<LocalDecideRequest>,
) -> Result<Json<LocalLeave>, ServiceError> {
    let rec = svc.decide_local(&actor, &id, req)?;
    Ok(Json(rec))
}

// ---------------------------------------------------------------------------
// DELETE /local/:id
// ---------------------------------------------------------------------------

async fn withdraw_local(
    State(svc): State<SvcState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    svc.withdraw_local(&actor, &id)?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

// ---------------------------------------------------------------------------
// POST /outstation
// ---------------------------------------------------------------------------

async fn create_outstation(
    State(svc): State<SvcState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CreateOutstationLeave>,
) -> Result<Json<OutstationLeave>, ServiceError> {
    let rec = svc.create_outstation(&actor, req)?;
    Ok(Json(rec))
}

// ---------------------------------------------------------------------------
// GET /outstation
// ---------------------------------------------------------------------------

async fn my_outstation(
    State(svc): State<SvcState>,
    Extension(actor): Extension<Actor>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let result = svc.my_outstation(&actor, &params)?;
    Ok(Json(serde_json::json!({
        "items": result.items,
        "total": result.total,
    })))
}

// ---------------------------------------------------------------------------
// GET /outstation/queue
// ---------------------------------------------------------------------------

async fn outstation_queue(
    State(svc): State<SvcState>,
    Extension(actor): Extension<Actor>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let result = svc.outstation_queue(&actor, &params)?;
    Ok(Json(serde_json::json!({
        "items": result.items,
        "total": result.total,
    })))
}

// ---------------------------------------------------------------------------
// GET /outstation/decided
// ---------------------------------------------------------------------------

async fn outstation_decided(
    State(svc): State<SvcState>,
    Extension(actor): Extension<Actor>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let result = svc.outstation_decided(&actor, &params)?;
    Ok(Json(serde_json::json!({
        "items": result.items,
        "total": result.total,
    })))
}

// ---------------------------------------------------------------------------
// GET /outstation/:id
// ---------------------------------------------------------------------------

async fn get_outstation(
    State(svc): State<SvcState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<OutstationLeave>, ServiceError> {
    let rec = svc.get_outstation(&actor, &id)?;
    Ok(Json(rec))
}

// ---------------------------------------------------------------------------
// POST /outstation/:id/@decide
// ---------------------------------------------------------------------------

async fn decide_outstation(
    State(svc): State<SvcState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(req): Json<StageDecideRequest>,
) -> Result<Json<OutstationLeave>, ServiceError> {
    let rec = svc.decide_outstation(&actor, &id, req)?;
    Ok(Json(rec))
}

// ---------------------------------------------------------------------------
// GET /records/:number
// ---------------------------------------------------------------------------

/// Record summary by number, as the gate shows it. Guards and
/// approvers see any record; students only their own.
async fn lookup_record(
    State(svc): State<SvcState>,
    Extension(actor): Extension<Actor>,
    Path(number): Path<String>,
) -> Result<Json<GatepassSummary>, ServiceError> {
    let summary = svc.lookup_gatepass(&number)?;
    if actor.role != Role::Guard && !actor.role.is_approver() && summary.student_id != actor.id {
        return Err(ServiceError::Forbidden(format!(
            "record {number} is not visible to you"
        )));
    }
    Ok(Json(summary))
}
