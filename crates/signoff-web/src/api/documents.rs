use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use signoff_core::{Submission, TransitionOutcome, VersionSummary};
use uuid::Uuid;

use crate::actor::ActorContext;
use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(submit_document))
        .route("/{id}/versions", get(list_versions))
}

async fn submit_document(
    State(state): State<AppState>,
    ActorContext(actor): ActorContext,
    Json(req): Json<Submission>,
) -> Result<(StatusCode, Json<TransitionOutcome>), ApiError> {
    let outcome = state.engine.submit(&actor, req).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn list_versions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<VersionSummary>>, ApiError> {
    Ok(Json(state.engine.list_versions(id).await?))
}
