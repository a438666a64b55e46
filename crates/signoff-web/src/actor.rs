use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use signoff_core::Actor;

use crate::state::AppState;

pub const ACTOR_HEADER: &str = "x-actor-id";

/// Extractor for the person a request acts on behalf of.
///
/// Identity is established upstream; this only reads the forwarded id.
pub struct ActorContext(pub Actor);

impl FromRequestParts<AppState> for ActorContext {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or((StatusCode::UNAUTHORIZED, "Missing x-actor-id header"))?;

        Ok(Self(Actor::new(id)))
    }
}
