//! Axum request handlers for all service endpoints.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use common::protocol::{
    ApiEnvelope, DecryptRequest, EncryptRequest, ErrorResponse, HealthResponse, IssuedKey,
    PayloadResponse, PolicyResponse,
};
use common::ServiceError;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use super::state::AppState;
use crate::codec::IvHandling;
use crate::policy::normalize_path;

/// Render a [`ServiceError`] as its status code and JSON body.
fn error_response(err: ServiceError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err.to_response())).into_response()
}

fn require_fields(fields: &[String]) -> Result<(), ServiceError> {
    if fields.is_empty() {
        return Err(ServiceError::BadRequest("fields must not be empty".into()));
    }
    Ok(())
}

/// `POST /encrypt`: encrypt the named fields of a record for storage.
pub async fn encrypt(
    State(state): State<AppState>,
    body: Result<Json<EncryptRequest>, JsonRejection>,
) -> Response {
    let req = match body {
        Ok(Json(req)) => req,
        Err(e) => return error_response(ServiceError::BadRequest(e.body_text())),
    };
    if let Err(e) = require_fields(&req.fields) {
        return error_response(e);
    }
    let mut record = match req.payload {
        Value::Object(record) => record,
        _ => {
            return error_response(ServiceError::BadRequest(
                "payload must be a JSON object".into(),
            ))
        }
    };

    if let Err(e) = state.codec.encode(&mut record, &req.fields) {
        warn!(error = %e, "storage encryption failed");
        return error_response(ServiceError::EncryptionFailure(e.to_string()));
    }

    let body = PayloadResponse {
        payload: Value::Object(record),
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// `POST /decrypt`: decrypt the named fields at every level of a stored value.
///
/// `<field>_iv` siblings are stripped unless `keepIv` is set.
pub async fn decrypt(
    State(state): State<AppState>,
    body: Result<Json<DecryptRequest>, JsonRejection>,
) -> Response {
    let req = match body {
        Ok(Json(req)) => req,
        Err(e) => return error_response(ServiceError::BadRequest(e.body_text())),
    };
    if let Err(e) = require_fields(&req.fields) {
        return error_response(e);
    }

    let handling = if req.keep_iv {
        IvHandling::Keep
    } else {
        IvHandling::Strip
    };
    let mut payload = req.payload;
    state.codec.decode(&mut payload, &req.fields, handling);
    (StatusCode::OK, Json(PayloadResponse { payload })).into_response()
}

/// `GET /api/system/encryption-key`: hand out the shared key with an expiry.
pub async fn issue_key(State(state): State<AppState>) -> Response {
    let Some(key) = state.issued_key.as_deref() else {
        return error_response(ServiceError::KeyUnavailable(
            "no encryption key configured".into(),
        ));
    };
    let ttl = match chrono::Duration::from_std(state.issued_key_ttl) {
        Ok(ttl) => ttl,
        Err(e) => return error_response(ServiceError::Internal(e.to_string())),
    };

    let expire_time = Utc::now() + ttl;
    info!(expires_at = %expire_time, "issued encryption key");
    let body = ApiEnvelope::ok(IssuedKey {
        key: key.to_owned(),
        expire_time,
    });
    (StatusCode::OK, Json(body)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct PolicyQuery {
    pub path: String,
}

/// `GET /policy?path=...`: the field policy that applies to a path.
pub async fn policy(State(state): State<AppState>, Query(q): Query<PolicyQuery>) -> Response {
    let policy = state.policies.policy_for(&q.path);
    let body = PolicyResponse {
        path: normalize_path(&q.path).to_owned(),
        matched: policy.is_some(),
        encrypt_fields: policy
            .as_ref()
            .map(|p| p.encrypt_on_send.clone())
            .unwrap_or_default(),
        decrypt_fields: policy.map(|p| p.decrypt_on_receive).unwrap_or_default(),
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// `GET /health`: liveness and readiness check.
///
/// Returns `200 OK` when a real key is configured and at least one policy is
/// loaded, `503 Service Unavailable` otherwise.
pub async fn health(State(state): State<AppState>) -> Response {
    let key_configured = state.codec.is_configured();
    let policies_loaded = state.policies.len();

    let (status_code, status_str) = if key_configured && policies_loaded > 0 {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let body = HealthResponse {
        status: status_str.into(),
        key_configured,
        policies_loaded,
    };
    (status_code, Json(body)).into_response()
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ErrorResponse::new("not_found", "the requested resource does not exist");
    (StatusCode::NOT_FOUND, Json(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{FieldPolicy, PolicyStore, PolicyTable};
    use axum::routing::{get, post};
    use axum::{body::Body, http::Request, Router};
    use axum_test::TestServer;
    use serde_json::json;
    use std::time::Duration;
    use tower::ServiceExt;

    fn keyed_state() -> AppState {
        let table = PolicyTable::from_entries([(
            "/api/leave/:id/detail",
            FieldPolicy::new(["reason"], ["reason", "comment"]),
        )])
        .unwrap();
        AppState::new(
            Some("server-side-key"),
            PolicyStore::new(table),
            Duration::from_secs(60),
        )
    }

    fn app(state: AppState) -> Router {
        Router::new()
            .route("/encrypt", post(encrypt))
            .route("/decrypt", post(decrypt))
            .route("/api/system/encryption-key", get(issue_key))
            .route("/policy", get(policy))
            .route("/health", get(health))
            .with_state(state)
    }

    #[tokio::test]
    async fn health_returns_503_when_not_ready() {
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app(AppState::default()).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn health_ok_with_key_and_policies() {
        let server = TestServer::new(app(keyed_state())).unwrap();
        let resp = server.get("/health").await;
        resp.assert_status_ok();
        let body: HealthResponse = resp.json();
        assert!(body.key_configured);
        assert_eq!(body.policies_loaded, 1);
    }

    #[tokio::test]
    async fn encrypt_then_decrypt_round_trip() {
        let server = TestServer::new(app(keyed_state())).unwrap();
        let resp = server
            .post("/encrypt")
            .json(&json!({"payload": {"studentNo": "2024001", "name": "张三"}, "fields": ["studentNo"]}))
            .await;
        resp.assert_status_ok();
        let stored: PayloadResponse = resp.json();
        assert_ne!(stored.payload["studentNo"], "2024001");
        assert!(stored.payload["studentNo_iv"].is_string());

        let resp = server
            .post("/decrypt")
            .json(&json!({"payload": [stored.payload], "fields": ["studentNo"]}))
            .await;
        resp.assert_status_ok();
        let restored: PayloadResponse = resp.json();
        assert_eq!(restored.payload, json!([{"studentNo": "2024001", "name": "张三"}]));
    }

    #[tokio::test]
    async fn decrypt_keep_iv_retains_sibling() {
        let server = TestServer::new(app(keyed_state())).unwrap();
        let stored: PayloadResponse = server
            .post("/encrypt")
            .json(&json!({"payload": {"phone": "13800138000"}, "fields": ["phone"]}))
            .await
            .json();
        let restored: PayloadResponse = server
            .post("/decrypt")
            .json(&json!({"payload": stored.payload, "fields": ["phone"], "keepIv": true}))
            .await
            .json();
        assert_eq!(restored.payload["phone"], "13800138000");
        assert!(restored.payload["phone_iv"].is_string());
    }

    #[tokio::test]
    async fn encrypt_rejects_bad_input() {
        let server = TestServer::new(app(keyed_state())).unwrap();
        let resp = server
            .post("/encrypt")
            .json(&json!({"payload": [1, 2], "fields": ["x"]}))
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        let err: ErrorResponse = resp.json();
        assert_eq!(err.code, "bad_request");

        let resp = server
            .post("/encrypt")
            .json(&json!({"payload": {"x": "y"}, "fields": []}))
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);

        let resp = server.post("/decrypt").text("not json").await;
        resp.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn issue_key_returns_envelope() {
        let server = TestServer::new(app(keyed_state())).unwrap();
        let resp = server.get("/api/system/encryption-key").await;
        resp.assert_status_ok();
        let env: ApiEnvelope<IssuedKey> = resp.json();
        assert_eq!(env.code, 200);
        let issued = env.data.unwrap();
        assert_eq!(issued.key, "server-side-key");
        assert!(issued.expire_time > Utc::now());
    }

    #[tokio::test]
    async fn issue_key_unavailable_without_key() {
        let req = Request::builder()
            .uri("/api/system/encryption-key")
            .body(Body::empty())
            .unwrap();
        let resp = app(AppState::default()).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn policy_lookup() {
        let server = TestServer::new(app(keyed_state())).unwrap();
        let body: PolicyResponse = server
            .get("/policy")
            .add_query_param("path", "/api/leave/42/detail?x=1")
            .await
            .json();
        assert!(body.matched);
        assert_eq!(body.path, "/api/leave/42/detail");
        assert_eq!(body.decrypt_fields, ["reason", "comment"]);

        let body: PolicyResponse = server
            .get("/policy")
            .add_query_param("path", "/api/other")
            .await
            .json();
        assert!(!body.matched);
        assert!(body.encrypt_fields.is_empty());
    }
}
