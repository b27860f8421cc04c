//! Request handlers.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{ApiError, AppState};
use crate::config::get_api_key_default_ttl_secs;
use crate::keys::KeyValidation;
use crate::utils::{is_valid_dni, truncate_str};

#[derive(Debug, Deserialize)]
pub struct DnitParams {
    pub dni: Option<String>,
    pub key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterKeyBody {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteKeyBody {
    #[serde(default)]
    pub key: Option<String>,
}

/// A missing or blank `key` field is the caller's mistake, not a 422.
fn require_key(key: Option<String>) -> Result<String, ApiError> {
    key.filter(|k| !k.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Campo 'key' requerido".to_string()))
}

/// `GET /` service metadata.
pub async fn root() -> Json<Value> {
    Json(json!({
        "service": "dnit-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "usage": "GET /dnit?dni=12345678&key=API_KEY",
    }))
}

/// `GET /health` liveness and session status.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let session_up = state.lookup.session_up().await;
    Json(json!({
        "status": if session_up { "ok" } else { "degraded" },
        "service": "dnit-gateway",
        "timestamp": Utc::now().to_rfc3339(),
        "session": if session_up { "authorized" } else { "down" },
        "queue_depth": state.lookup.queue_depth(),
    }))
}

/// `GET /dnit?dni=...` authenticated lookup.
pub async fn dnit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<DnitParams>,
) -> Result<Json<Value>, ApiError> {
    let header_key = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let key = params.key.or(header_key);

    let verdict = state.keys.validate(key.as_deref()).await;
    if verdict != KeyValidation::Valid {
        if let Some(key) = key.as_deref() {
            if state.invalid_keys.should_log(key).await {
                warn!("Rejected API key '{}'", truncate_str(key, 8));
            }
        }
        return Err(ApiError::Key(verdict));
    }

    let dni = params.dni.unwrap_or_default();
    if !is_valid_dni(&dni) {
        return Err(ApiError::InvalidDni);
    }

    info!("Lookup requested for DNI {dni}");
    let report = state.lookup.lookup(&dni).await?;

    let mut body = json!({
        "success": true,
        "dni": dni,
        "timestamp": Utc::now().to_rfc3339(),
        "data": report.data,
    });
    if !report.images.is_empty() {
        body["images"] = serde_json::to_value(&report.images)
            .map_err(|e| ApiError::Internal(e.to_string()))?;
    }
    Ok(Json(body))
}

/// `POST /register-key` adds or replaces an API key.
pub async fn register_key(
    State(state): State<AppState>,
    Json(body): Json<RegisterKeyBody>,
) -> Result<Json<Value>, ApiError> {
    let key = require_key(body.key)?;

    // Malformed expiry dates fall back to the default lifetime.
    let expires_at = body
        .expires_at
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map_or_else(
            || Utc::now() + chrono::Duration::seconds(get_api_key_default_ttl_secs()),
            |dt| dt.with_timezone(&Utc),
        );

    let description = body.description.unwrap_or_default();
    info!(
        "Registering API key '{}' (expires {expires_at})",
        truncate_str(&key, 8)
    );
    state
        .keys
        .register(key.clone(), description, expires_at)
        .await;

    Ok(Json(json!({
        "success": true,
        "key": key,
        "expires_at": expires_at.to_rfc3339(),
    })))
}

/// `POST /delete-key` removes an API key.
pub async fn delete_key(
    State(state): State<AppState>,
    Json(body): Json<DeleteKeyBody>,
) -> Result<Json<Value>, ApiError> {
    let key = require_key(body.key)?;
    if !state.keys.delete(&key).await {
        return Err(ApiError::KeyNotFound);
    }
    info!("Deleted API key '{}'", truncate_str(&key, 8));
    Ok(Json(json!({
        "success": true,
        "key": key,
    })))
}
