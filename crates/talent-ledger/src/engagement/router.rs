use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::approval::TaskDecision;
use super::domain::{Actor, ApplicationId, Decision, PostingId, Role, TaskId, UserId};
use super::engine::EngagementEngine;
use super::error::EngineError;
use super::tracker::TaskSubmission;

/// Header carrying the upstream-verified user id.
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
/// Header carrying the upstream-verified role (`candidate`, `employer`, `admin`).
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub decision: Decision,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProgressRequest {
    pub progress_percent: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SettlementRequest {
    pub is_paid: bool,
}

/// Router exposing the application, task and settlement operations.
pub fn engagement_router(engine: Arc<EngagementEngine>) -> Router {
    Router::new()
        .route(
            "/api/v1/postings/:posting_id/applications",
            post(apply_handler).get(posting_applications_handler),
        )
        .route("/api/v1/me/applications", get(my_applications_handler))
        .route(
            "/api/v1/applications/:application_id",
            get(application_handler),
        )
        .route(
            "/api/v1/applications/:application_id/withdraw",
            post(withdraw_handler),
        )
        .route(
            "/api/v1/applications/:application_id/approval",
            post(approval_handler),
        )
        .route(
            "/api/v1/applications/:application_id/tasks",
            post(submit_task_handler).get(list_tasks_handler),
        )
        .route(
            "/api/v1/applications/:application_id/settlement",
            post(settlement_handler),
        )
        .route(
            "/api/v1/applications/:application_id/payments",
            get(payments_handler),
        )
        .route("/api/v1/tasks/:task_id", get(task_handler))
        .route("/api/v1/tasks/:task_id/progress", post(progress_handler))
        .route(
            "/api/v1/tasks/:task_id/decision",
            post(task_decision_handler),
        )
        .with_state(engine)
}

/// Resolve the verified identity forwarded by the gateway.
pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, EngineError> {
    let id = headers
        .get(ACTOR_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| EngineError::unauthorized("missing verified actor id"))?;
    let role = headers
        .get(ACTOR_ROLE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| EngineError::unauthorized("missing verified actor role"))?
        .parse::<Role>()
        .map_err(EngineError::unauthorized)?;

    Ok(Actor {
        id: UserId::new(id),
        role,
    })
}

pub(crate) async fn apply_handler(
    State(engine): State<Arc<EngagementEngine>>,
    headers: HeaderMap,
    Path(posting_id): Path<String>,
) -> Result<Response, EngineError> {
    let actor = actor_from_headers(&headers)?;
    let application = engine
        .lifecycle()
        .apply(&actor, &PostingId(posting_id))
        .await?;
    Ok((StatusCode::CREATED, Json(application)).into_response())
}

pub(crate) async fn posting_applications_handler(
    State(engine): State<Arc<EngagementEngine>>,
    headers: HeaderMap,
    Path(posting_id): Path<String>,
) -> Result<Response, EngineError> {
    let actor = actor_from_headers(&headers)?;
    let applications = engine
        .lifecycle()
        .list_for_posting(&actor, &PostingId(posting_id))
        .await?;
    Ok(Json(applications).into_response())
}

pub(crate) async fn my_applications_handler(
    State(engine): State<Arc<EngagementEngine>>,
    headers: HeaderMap,
) -> Result<Response, EngineError> {
    let actor = actor_from_headers(&headers)?;
    let applications = engine
        .lifecycle()
        .list_for_candidate(&actor, &actor.id)
        .await?;
    Ok(Json(applications).into_response())
}

pub(crate) async fn application_handler(
    State(engine): State<Arc<EngagementEngine>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
) -> Result<Response, EngineError> {
    let actor = actor_from_headers(&headers)?;
    let application = engine
        .lifecycle()
        .get(&actor, &ApplicationId(application_id))
        .await?;
    Ok(Json(application).into_response())
}

pub(crate) async fn withdraw_handler(
    State(engine): State<Arc<EngagementEngine>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
) -> Result<Response, EngineError> {
    let actor = actor_from_headers(&headers)?;
    let application = engine
        .lifecycle()
        .withdraw(&actor, &ApplicationId(application_id))
        .await?;
    Ok(Json(application).into_response())
}

pub(crate) async fn approval_handler(
    State(engine): State<Arc<EngagementEngine>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
    body: Result<Json<ApprovalRequest>, JsonRejection>,
) -> Result<Response, EngineError> {
    let actor = actor_from_headers(&headers)?;
    let Json(request) = body?;
    let change = engine
        .lifecycle()
        .decide_approval(&actor, &ApplicationId(application_id), request.decision)
        .await?;
    Ok(Json(change).into_response())
}

pub(crate) async fn submit_task_handler(
    State(engine): State<Arc<EngagementEngine>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
    body: Result<Json<TaskSubmission>, JsonRejection>,
) -> Result<Response, EngineError> {
    let actor = actor_from_headers(&headers)?;
    let Json(submission) = body?;
    let task = engine
        .tracker()
        .submit(&actor, &ApplicationId(application_id), submission)
        .await?;
    Ok((StatusCode::CREATED, Json(task)).into_response())
}

pub(crate) async fn list_tasks_handler(
    State(engine): State<Arc<EngagementEngine>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
) -> Result<Response, EngineError> {
    let actor = actor_from_headers(&headers)?;
    let tasks = engine
        .tracker()
        .list(&actor, &ApplicationId(application_id))
        .await?;
    Ok(Json(tasks).into_response())
}

pub(crate) async fn task_handler(
    State(engine): State<Arc<EngagementEngine>>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
) -> Result<Response, EngineError> {
    let actor = actor_from_headers(&headers)?;
    let task = engine.tracker().get(&actor, &TaskId(task_id)).await?;
    Ok(Json(task).into_response())
}

pub(crate) async fn progress_handler(
    State(engine): State<Arc<EngagementEngine>>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
    body: Result<Json<ProgressRequest>, JsonRejection>,
) -> Result<Response, EngineError> {
    let actor = actor_from_headers(&headers)?;
    let Json(request) = body?;
    let task = engine
        .tracker()
        .update_progress(&actor, &TaskId(task_id), request.progress_percent)
        .await?;
    Ok(Json(task).into_response())
}

pub(crate) async fn task_decision_handler(
    State(engine): State<Arc<EngagementEngine>>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
    body: Result<Json<TaskDecision>, JsonRejection>,
) -> Result<Response, EngineError> {
    let actor = actor_from_headers(&headers)?;
    let Json(decision) = body?;
    let change = engine
        .approvals()
        .decide(&actor, &TaskId(task_id), decision)
        .await?;
    Ok(Json(change).into_response())
}

pub(crate) async fn settlement_handler(
    State(engine): State<Arc<EngagementEngine>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
    body: Result<Json<SettlementRequest>, JsonRejection>,
) -> Result<Response, EngineError> {
    let actor = actor_from_headers(&headers)?;
    let Json(request) = body?;
    let outcome = engine
        .settlement()
        .set_paid_flag(&actor, &ApplicationId(application_id), request.is_paid)
        .await?;
    Ok(Json(outcome).into_response())
}

pub(crate) async fn payments_handler(
    State(engine): State<Arc<EngagementEngine>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
) -> Result<Response, EngineError> {
    let actor = actor_from_headers(&headers)?;
    let history = engine
        .settlement()
        .history(&actor, &ApplicationId(application_id))
        .await?;
    Ok(Json(history).into_response())
}
