//! End-to-end tests of the HTTP surface against a scripted bot transport.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use dnit_gateway::api::{build_router, AppState};
use dnit_gateway::config::Settings;
use dnit_gateway::dnit::LookupService;
use dnit_gateway::keys::{ApiKeyStore, InvalidKeyCache};
use dnit_gateway::telegram::{BotMessage, BotTransport, TransportError};

const REPORT: &str = "RENIEC ONLINE\nDNI ➾ 46027897\nNOMBRES ➾ MARIA ELENA\n";

/// Transport that always answers with one fresh report message.
struct FixedTransport {
    history: Vec<BotMessage>,
}

impl FixedTransport {
    fn with_report() -> Self {
        Self {
            history: vec![BotMessage {
                id: 10,
                text: REPORT.to_string(),
                timestamp: Utc::now(),
                outgoing: false,
                has_photo: false,
            }],
        }
    }
}

#[async_trait]
impl BotTransport for FixedTransport {
    async fn send_command(&self, _text: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn recent_messages(&self, _limit: usize) -> Result<Vec<BotMessage>, TransportError> {
        Ok(self.history.clone())
    }

    async fn messages_before(
        &self,
        _message_id: i32,
        _limit: usize,
    ) -> Result<Vec<BotMessage>, TransportError> {
        Ok(Vec::new())
    }

    async fn download_photo(&self, _message_id: i32) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(None)
    }

    async fn is_connected(&self) -> bool {
        true
    }
}

fn test_settings(dir: &tempfile::TempDir) -> Settings {
    Settings {
        api_id: 1,
        api_hash: "0123456789abcdef0123456789abcdef".to_string(),
        target_bot: "OlimpoDataBot".to_string(),
        port: 0,
        session_file: dir
            .path()
            .join("test.session")
            .to_string_lossy()
            .into_owned(),
        api_keys_file: dir
            .path()
            .join("keys.json")
            .to_string_lossy()
            .into_owned(),
    }
}

async fn test_app(dir: &tempfile::TempDir, transport: Arc<dyn BotTransport>) -> Router {
    let settings = Arc::new(test_settings(dir));
    let keys = Arc::new(ApiKeyStore::load(settings.api_keys_file.clone()).await);
    keys.register(
        "test-key".to_string(),
        "integration tests".to_string(),
        Utc::now() + chrono::Duration::hours(1),
    )
    .await;

    build_router(AppState {
        settings,
        keys,
        lookup: Arc::new(LookupService::new(transport, 4)),
        invalid_keys: Arc::new(InvalidKeyCache::new(60)),
    })
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body is JSON")
}

#[tokio::test]
async fn test_root_reports_metadata() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = test_app(&dir, Arc::new(FixedTransport::with_report())).await;

    let response = app
        .oneshot(Request::get("/").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["service"], "dnit-gateway");
    assert!(body["usage"].as_str().expect("usage").contains("/dnit"));
}

#[tokio::test]
async fn test_health_reflects_session() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = test_app(&dir, Arc::new(FixedTransport::with_report())).await;

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["session"], "authorized");
    assert_eq!(body["queue_depth"], 0);
}

#[tokio::test]
async fn test_dnit_happy_path_with_query_key() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = test_app(&dir, Arc::new(FixedTransport::with_report())).await;

    let response = app
        .oneshot(
            Request::get("/dnit?dni=46027897&key=test-key")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["dni"], "46027897");
    assert_eq!(body["data"]["DNI"], "46027897");
    assert_eq!(body["data"]["NOMBRES"], "MARIA ELENA");
    // No photos were downloadable, so the field is omitted entirely.
    assert!(body.get("images").is_none());
}

#[tokio::test]
async fn test_dnit_accepts_header_key() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = test_app(&dir, Arc::new(FixedTransport::with_report())).await;

    let response = app
        .oneshot(
            Request::get("/dnit?dni=46027897")
                .header("X-API-Key", "test-key")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_dnit_rejects_missing_and_unknown_keys() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = test_app(&dir, Arc::new(FixedTransport::with_report())).await;

    let missing = app
        .clone()
        .oneshot(
            Request::get("/dnit?dni=46027897")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let unknown = app
        .oneshot(
            Request::get("/dnit?dni=46027897&key=wrong")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(unknown).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_dnit_rejects_malformed_dni() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = test_app(&dir, Arc::new(FixedTransport::with_report())).await;

    for bad in ["123", "1234567a", "123456789", ""] {
        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/dnit?dni={bad}&key=test-key"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "dni={bad:?}");
    }
}

#[tokio::test]
async fn test_register_and_delete_key_flow() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = test_app(&dir, Arc::new(FixedTransport::with_report())).await;

    let register = app
        .clone()
        .oneshot(
            Request::post("/register-key")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"key":"fresh","description":"new client"}"#,
                ))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(register.status(), StatusCode::OK);
    let body = body_json(register).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["key"], "fresh");
    assert!(body["expires_at"].is_string());

    // The fresh key works immediately.
    let lookup = app
        .clone()
        .oneshot(
            Request::get("/dnit?dni=46027897&key=fresh")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(lookup.status(), StatusCode::OK);

    let delete = app
        .clone()
        .oneshot(
            Request::post("/delete-key")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"key":"fresh"}"#))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(delete.status(), StatusCode::OK);

    // Deleting twice reports not-found.
    let again = app
        .oneshot(
            Request::post("/delete-key")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"key":"fresh"}"#))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_key_endpoints_require_key_field() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = test_app(&dir, Arc::new(FixedTransport::with_report())).await;

    // Blank and absent keys both get the JSON 400 shape, never a bare 422.
    for (uri, payload) in [
        ("/register-key", r#"{"key":"  "}"#),
        ("/register-key", "{}"),
        ("/delete-key", "{}"),
    ] {
        let response = app
            .clone()
            .oneshot(
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(payload))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(
            response.status(),
            StatusCode::BAD_REQUEST,
            "{uri} {payload}"
        );
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());
    }
}
