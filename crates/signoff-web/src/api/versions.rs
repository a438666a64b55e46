use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use signoff_core::{AggregateView, AuditEntry, Registration, Replacement, TransitionOutcome};
use uuid::Uuid;

use crate::actor::ActorContext;
use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(get_aggregate))
        .route("/{id}/actionable", get(get_actionable))
        .route("/{id}/history", get(get_history))
        .route("/{id}/replace", post(replace_version))
        .route("/{id}/registration", post(retry_registration))
        .route("/{id}/signatures/{sig}/approve", post(approve))
        .route("/{id}/signatures/{sig}/reject", post(reject))
        .route("/{id}/signatures/{sig}/reconsider", post(reconsider))
        .route("/{id}/signatures/{sig}/remind", post(remind))
        .route("/{id}/signatures/{sig}/assign", post(assign))
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    #[serde(default)]
    pub justification: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub justification: String,
}

#[derive(Debug, Deserialize)]
pub struct ReconsiderRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub approver_id: String,
}

async fn get_aggregate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AggregateView>, ApiError> {
    Ok(Json(state.engine.get_aggregate(id).await?))
}

async fn get_actionable(
    State(state): State<AppState>,
    ActorContext(actor): ActorContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Uuid>>, ApiError> {
    Ok(Json(state.engine.evaluable_signatures(&actor, id).await?))
}

async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    Ok(Json(state.engine.history(id).await?))
}

async fn replace_version(
    State(state): State<AppState>,
    ActorContext(actor): ActorContext,
    Path(id): Path<Uuid>,
    Json(req): Json<Replacement>,
) -> Result<(StatusCode, Json<TransitionOutcome>), ApiError> {
    let outcome = state.engine.replace_with_new_version(&actor, id, req).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn retry_registration(
    State(state): State<AppState>,
    ActorContext(actor): ActorContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Registration>, ApiError> {
    Ok(Json(state.engine.retry_registration(&actor, id).await?))
}

async fn approve(
    State(state): State<AppState>,
    ActorContext(actor): ActorContext,
    Path((id, sig)): Path<(Uuid, Uuid)>,
    Json(req): Json<ApproveRequest>,
) -> Result<Json<TransitionOutcome>, ApiError> {
    Ok(Json(
        state
            .engine
            .approve(&actor, id, sig, req.justification)
            .await?,
    ))
}

async fn reject(
    State(state): State<AppState>,
    ActorContext(actor): ActorContext,
    Path((id, sig)): Path<(Uuid, Uuid)>,
    Json(req): Json<RejectRequest>,
) -> Result<Json<TransitionOutcome>, ApiError> {
    Ok(Json(
        state
            .engine
            .reject(&actor, id, sig, req.justification)
            .await?,
    ))
}

async fn reconsider(
    State(state): State<AppState>,
    ActorContext(actor): ActorContext,
    Path((id, sig)): Path<(Uuid, Uuid)>,
    Json(req): Json<ReconsiderRequest>,
) -> Result<Json<TransitionOutcome>, ApiError> {
    Ok(Json(
        state
            .engine
            .request_reconsideration(&actor, id, sig, req.reason)
            .await?,
    ))
}

async fn remind(
    State(state): State<AppState>,
    ActorContext(actor): ActorContext,
    Path((id, sig)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    state.engine.notify_approver(&actor, id, sig).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn assign(
    State(state): State<AppState>,
    ActorContext(actor): ActorContext,
    Path((id, sig)): Path<(Uuid, Uuid)>,
    Json(req): Json<AssignRequest>,
) -> Result<Json<TransitionOutcome>, ApiError> {
    Ok(Json(
        state
            .engine
            .assign_approver(&actor, id, sig, req.approver_id)
            .await?,
    ))
}
