use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_config))
}

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub port: u16,
    pub webhook_notifications: bool,
    pub notify_timeout_secs: u64,
}

async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(ConfigResponse {
        port: state.config.port,
        webhook_notifications: state.config.webhook_url.is_some(),
        notify_timeout_secs: state.config.notify_timeout_secs,
    })
}
