use std::sync::Arc;

use axum::extract::{Extension, Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use gatehouse_core::{Actor, ListParams, ServiceError};

use crate::model::{
    CrossingResult, DecideRequest, IssueTokenRequest, ManualCrossingRequest, ResolveRequest,
    Student, TokenGrant, TokenPreview,
};
use crate::service::GateService;

type SvcState = Arc<GateService>;

pub fn router(svc: Arc<GateService>) -> Router {
    Router::new()
        .route("/token", post(issue_token))
        .route("/token/@resolve", post(resolve_token))
        .route("/token/{id}/@decide", post(decide_token))
        .route("/crossings/@manual", post(manual_crossing))
        .route("/presence", get(my_presence))
        .route("/presence/outside", get(list_outside))
        .route("/presence/{student_id}", get(student_presence))
        .route("/logs", get(list_logs))
        .with_state(svc)
}

// ---------------------------------------------------------------------------
// POST /token
// ---------------------------------------------------------------------------

async fn issue_token(
    State(svc): State<SvcState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<IssueTokenRequest>,
) -> Result<Json<TokenGrant>, ServiceError> {
    let grant = svc.issue(&actor, req)?;
    Ok(Json(grant))
}

// ---------------------------------------------------------------------------
// POST /token/@resolve
// ---------------------------------------------------------------------------

async fn resolve_token(
    State(svc): State<SvcState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<ResolveRequest>,
) -> Result<Json<TokenPreview>, ServiceError> {
    let preview = svc.resolve(&actor, &req)?;
    Ok(Json(preview))
}

// ---------------------------------------------------------------------------
// POST /token/:id/@decide
// ---------------------------------------------------------------------------

async fn decide_token(
    State(svc): State<SvcState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(req): Json<DecideRequest>,
) -> Result<Json<CrossingResult>, ServiceError> {
    let outcome = svc.decide(&actor, &id, &req)?;
    Ok(Json(outcome))
}

// ---------------------------------------------------------------------------
// POST /crossings/@manual
// ---------------------------------------------------------------------------

async fn manual_crossing(
    State(svc): State<SvcState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<ManualCrossingRequest>,
) -> Result<Json<CrossingResult>, ServiceError> {
    let outcome = svc.record_manual(&actor, req)?;
    Ok(Json(outcome))
}

// ---------------------------------------------------------------------------
// GET /presence
// ---------------------------------------------------------------------------

async fn my_presence(
    State(svc): State<SvcState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Student>, ServiceError> {
    let student = svc.my_presence(&actor)?;
    Ok(Json(student))
}

// ---------------------------------------------------------------------------
// GET /presence/outside
// ---------------------------------------------------------------------------

async fn list_outside(
    State(svc): State<SvcState>,
    Extension(actor): Extension<Actor>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let result = svc.list_outside(&actor, &params)?;
    Ok(Json(serde_json::json!({
        "items": result.items,
        "total": result.total,
    })))
}

// ---------------------------------------------------------------------------
// GET /presence/:student_id
// ---------------------------------------------------------------------------

async fn student_presence(
    State(svc): State<SvcState>,
    Extension(actor): Extension<Actor>,
    Path(student_id): Path<String>,
) -> Result<Json<Student>, ServiceError> {
    let student = svc.student_presence(&actor, &student_id)?;
    Ok(Json(student))
}

// ---------------------------------------------------------------------------
// GET /logs
// ---------------------------------------------------------------------------

async fn list_logs(
    State(svc): State<SvcState>,
    Extension(actor): Extension<Actor>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let result = svc.list_logs(&actor, &params)?;
    Ok(Json(serde_json::json!({
        "items": result.items,
        "total": result.total,
    })))
}
