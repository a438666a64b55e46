use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use signoff_core::{DocumentSummary, SignatureStatus};

use crate::actor::ActorContext;
use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_inbox))
}

#[derive(Debug, Deserialize)]
pub struct InboxQuery {
    #[serde(default)]
    status: Option<String>,
}

/// The "pending mine / approved / rejected" tabs
async fn list_inbox(
    State(state): State<AppState>,
    ActorContext(actor): ActorContext,
    Query(query): Query<InboxQuery>,
) -> Result<Json<Vec<DocumentSummary>>, ApiError> {
    let tab = query
        .status
        .as_deref()
        .unwrap_or("pending")
        .parse::<SignatureStatus>()?;

    Ok(Json(state.engine.list_by_status(&actor, tab).await?))
}
