use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::{error::PasteError, lifecycle::NewPaste, AppState};

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

// ── Create ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateRequest {
    pub encrypted_content: Option<String>,
    pub iv: Option<String>,
    pub password_iv: Option<String>,
    pub salt: Option<String>,
    pub has_password: Option<bool>,
    pub burn_after_reading: Option<bool>,
    pub expires_in: Option<String>,
}

impl From<CreateRequest> for NewPaste {
    fn from(body: CreateRequest) -> Self {
        Self {
            encrypted_content: body.encrypted_content,
            iv: body.iv,
            password_iv: body.password_iv,
            salt: body.salt,
            has_password: body.has_password.unwrap_or(false),
            burn_after_reading: body.burn_after_reading.unwrap_or(false),
            expires_in: body.expires_in,
        }
    }
}

pub async fn create_paste(
    State(state): State<AppState>,
    body: Result<Json<CreateRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => {
            return PasteError::InvalidRequest(rejection.body_text()).into_response();
        }
    };

    match state.pastes.create(body.into()) {
        Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
        Err(e) => e.into_response(),
    }
}

// ── Resolve ───────────────────────────────────────────────────────────────────

pub async fn resolve_short_id(
    State(state): State<AppState>,
    Path(short_id): Path<String>,
) -> Response {
    match state.pastes.resolve_short_id(&short_id) {
        Ok(id) => Json(json!({ "id": id })).into_response(),
        Err(e) => e.into_response(),
    }
}

// ── Retrieve ──────────────────────────────────────────────────────────────────

pub async fn get_paste(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.pastes.retrieve(&id) {
        Ok(body) => Json(body).into_response(),
        Err(e) => e.into_response(),
    }
}

// ── Prune ─────────────────────────────────────────────────────────────────────

pub async fn prune_pastes(State(state): State<AppState>) -> Response {
    match state.pastes.prune() {
        Ok(n) => {
            info!(pruned = n, "audit: paste.prune");
            Json(json!({"pruned": n})).into_response()
        }
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::{header::AUTHORIZATION, HeaderValue};
    use axum_test::TestServer;
    use rand::{rngs::StdRng, SeedableRng};
    use serde_json::{json, Value};

    use crate::clock::ManualClock;
    use crate::lifecycle::Pastes;
    use crate::server::router;
    use crate::store::MemoryStore;
    use crate::AppState;

    fn test_server(api_key: Option<&str>) -> (TestServer, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let pastes = Pastes::with_parts(
            Arc::new(MemoryStore::new()),
            clock.clone(),
            StdRng::seed_from_u64(11),
        );
        let state = AppState {
            pastes,
            api_key: api_key.map(str::to_owned),
        };
        let server = TestServer::new(router(state, None)).unwrap();
        (server, clock)
    }

    #[tokio::test]
    async fn health_ok() {
        let (server, _) = test_server(None);
        let res = server.get("/health").await;
        res.assert_status_ok();
        res.assert_json(&json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn burn_after_reading_over_http() {
        let (server, _) = test_server(None);
        let res = server
            .post("/api/paste")
            .json(&json!({"encryptedContent": "AQID", "iv": "c2FsdA", "burnAfterReading": true}))
            .await;
        res.assert_status(axum::http::StatusCode::CREATED);
        let created: Value = res.json();
        let id = created["id"].as_str().unwrap().to_owned();
        let short_id = created["shortId"].as_str().unwrap().to_owned();
        assert_eq!(short_id.len(), 7);

        let resolved: Value = server.get(&format!("/api/paste/short/{short_id}")).await.json();
        assert_eq!(resolved["id"], id.as_str());

        let res = server.get(&format!("/api/paste/{id}")).await;
        res.assert_status_ok();
        res.assert_json(&json!({
            "encryptedContent": "AQID",
            "iv": "c2FsdA",
            "passwordIv": null,
            "salt": null,
            "hasPassword": false,
            "burnAfterReading": true,
        }));

        server
            .get(&format!("/api/paste/{id}"))
            .await
            .assert_status_not_found();
        server
            .get(&format!("/api/paste/short/{short_id}"))
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn expired_paste_is_gone() {
        let (server, clock) = test_server(None);
        let created: Value = server
            .post("/api/paste")
            .json(&json!({"encryptedContent": "AQID", "iv": "c2FsdA", "expiresIn": "1h"}))
            .await
            .json();
        let id = created["id"].as_str().unwrap().to_owned();

        clock.advance(61 * 60);
        let res = server.get(&format!("/api/paste/{id}")).await;
        res.assert_status(axum::http::StatusCode::GONE);
        assert!(!res.text().contains("AQID"));

        let status = server.get(&format!("/api/paste/{id}")).await.status_code();
        assert!(status == 404 || status == 410, "{status}");
    }

    #[tokio::test]
    async fn validation_errors_are_bad_requests() {
        let (server, _) = test_server(None);
        server
            .post("/api/paste")
            .json(&json!({"iv": "c2FsdA"}))
            .await
            .assert_status_bad_request();
        server
            .post("/api/paste")
            .json(&json!({"encryptedContent": "AQID", "iv": "c2FsdA", "expiresIn": "3y"}))
            .await
            .assert_status_bad_request();
        server
            .post("/api/paste")
            .text("not json")
            .await
            .assert_status_bad_request();

        let big = "A".repeat(100 * 1024 + 1);
        let res = server
            .post("/api/paste")
            .json(&json!({"encryptedContent": big, "iv": "c2FsdA"}))
            .await;
        res.assert_status_bad_request();
        assert!(res.text().contains("KiB"));
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let (server, _) = test_server(None);
        server.get("/api/paste/nope").await.assert_status_not_found();
        server
            .get("/api/paste/short/nope123")
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn prune_requires_operator_key() {
        let (server, clock) = test_server(Some("op-key"));
        server
            .post("/api/paste")
            .json(&json!({"encryptedContent": "AQID", "iv": "c2FsdA", "expiresIn": "1h"}))
            .await
            .assert_status(axum::http::StatusCode::CREATED);
        clock.advance(2 * 3600);

        server
            .post("/admin/prune")
            .await
            .assert_status_unauthorized();
        let res = server
            .post("/admin/prune")
            .add_header(AUTHORIZATION, HeaderValue::from_static("Bearer op-key"))
            .await;
        res.assert_status_ok();
        res.assert_json(&json!({"pruned": 1}));
    }
}
