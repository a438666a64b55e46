mod config;
mod documents;
mod inbox;
mod versions;

use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/config", config::router())
        .nest("/documents", documents::router())
        .nest("/inbox", inbox::router())
        .nest("/versions", versions::router())
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::actor::ACTOR_HEADER;
    use crate::config::ServerConfig;

    async fn app() -> Router {
        app_with_state().await.0
    }

    async fn app_with_state() -> (Router, AppState) {
        let state = AppState::in_memory(ServerConfig::default()).await.unwrap();
        let app = Router::new().nest("/api", router()).with_state(state.clone());
        (app, state)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        actor: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(actor) = actor {
            builder = builder.header(ACTOR_HEADER, actor);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn signature_id(outcome: &Value, role: &str) -> String {
        outcome["version"]["signatures"]
            .as_array()
            .unwrap()
            .iter()
            .find(|s| s["role"] == role)
            .and_then(|s| s["id"].as_str())
            .unwrap()
            .to_string()
    }

    async fn submit(app: &Router) -> Value {
        let (status, body) = send(
            app,
            "POST",
            "/api/documents",
            Some("stu"),
            Some(json!({
                "title": "Sparse Solvers",
                "file": { "name": "thesis.pdf", "location": "store://thesis.pdf" },
                "signers": [
                    { "role": "advisor", "approver_id": "ana" },
                    { "role": "coordinator", "approver_id": "carla" }
                ]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body
    }

    #[tokio::test]
    async fn full_sign_off_over_http() {
        let app = app().await;
        let submitted = submit(&app).await;
        let version = submitted["version"]["id"].as_str().unwrap().to_string();
        let advisor = signature_id(&submitted, "advisor");
        let coordinator = signature_id(&submitted, "coordinator");

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/versions/{version}/signatures/{coordinator}/approve"),
            Some("carla"),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "waiting_on_other_approvals");
        assert_eq!(body["retryable"], false);

        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/versions/{version}/signatures/{advisor}/approve"),
            Some("ana"),
            Some(json!({ "justification": "solid" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/versions/{version}/signatures/{coordinator}/approve"),
            Some("carla"),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["aggregate"], "approved");
        assert!(body["registration"]["receipt"].is_string());

        let (status, body) = send(&app, "GET", &format!("/api/versions/{version}"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "approved");
        assert_eq!(body["approved_count"], 2);

        let (status, body) = send(
            &app,
            "GET",
            &format!("/api/versions/{version}/history"),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn actor_header_is_required() {
        let app = app().await;
        let (status, _) = send(&app, "GET", "/api/inbox", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn reject_without_justification_is_unprocessable() {
        let app = app().await;
        let submitted = submit(&app).await;
        let version = submitted["version"]["id"].as_str().unwrap().to_string();
        let advisor = signature_id(&submitted, "advisor");

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/versions/{version}/signatures/{advisor}/reject"),
            Some("ana"),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "missing_justification");
    }

    #[tokio::test]
    async fn inbox_lists_pending_work() {
        let app = app().await;
        submit(&app).await;

        let (status, body) = send(&app, "GET", "/api/inbox?status=pending", Some("ana"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["my_status"], "pending");

        let (status, body) = send(&app, "GET", "/api/inbox?status=maybe", Some("ana"), None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "invalid_status");
    }

    #[tokio::test]
    async fn closed_ledger_is_service_unavailable() {
        let (app, state) = app_with_state().await;
        let submitted = submit(&app).await;
        let version = submitted["version"]["id"].as_str().unwrap().to_string();
        let advisor = signature_id(&submitted, "advisor");

        state.storage.close().await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/versions/{version}/signatures/{advisor}/approve"),
            Some("ana"),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "persistence_unavailable");
    }

    #[tokio::test]
    async fn unknown_version_is_not_found() {
        let app = app().await;
        let (status, body) = send(
            &app,
            "GET",
            &format!("/api/versions/{}", uuid::Uuid::now_v7()),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "version_not_found");
    }
}
