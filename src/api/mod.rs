//! HTTP surface of the gateway.

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::Settings;
use crate::dnit::LookupService;
use crate::keys::{ApiKeyStore, InvalidKeyCache};

pub use error::ApiError;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub keys: Arc<ApiKeyStore>,
    pub lookup: Arc<LookupService>,
    pub invalid_keys: Arc<InvalidKeyCache>,
}

/// Builds the router with all routes and request tracing.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/dnit", get(handlers::dnit))
        .route("/register-key", post(handlers::register_key))
        .route("/delete-key", post(handlers::delete_key))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
