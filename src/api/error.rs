//! Mapping of domain errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::dnit::LookupError;
use crate::keys::KeyValidation;

/// Errors a handler can surface to the client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{}", .0.error_message())]
    Key(KeyValidation),

    #[error("DNI inválido: debe tener exactamente 8 dígitos")]
    InvalidDni,

    #[error("{0}")]
    BadRequest(String),

    #[error("Key no encontrada")]
    KeyNotFound,

    #[error("Error interno del servidor: {0}")]
    Internal(String),

    #[error(transparent)]
    Lookup(#[from] LookupError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Key(_) => StatusCode::UNAUTHORIZED,
            Self::InvalidDni | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::KeyNotFound => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Lookup(LookupError::Busy) => StatusCode::TOO_MANY_REQUESTS,
            Self::Lookup(LookupError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            Self::Lookup(LookupError::NoResponse(_) | LookupError::Transport(_)) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "success": false,
            "error": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::Key(KeyValidation::Unknown).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::InvalidDni.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Lookup(LookupError::Busy).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::Lookup(LookupError::Timeout(35)).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ApiError::Lookup(LookupError::NoResponse(3)).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::Internal("boom".to_string()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
