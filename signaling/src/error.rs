use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

use protocol::signaling::ErrorResponse;
use session_store::StoreError;

/// Request-terminal errors for the signaling surface. Every variant maps
/// onto exactly one HTTP status; the body is always `{"error": ...}`.
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Authorization(String),
    #[error("{0}")]
    NotFound(String),
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("internal error")]
    Internal(#[from] StoreError),
}

impl SignalingError {
    pub fn status(&self) -> StatusCode {
        match self {
            SignalingError::Validation(_) => StatusCode::BAD_REQUEST,
            SignalingError::Authorization(_) => StatusCode::FORBIDDEN,
            SignalingError::NotFound(_) => StatusCode::NOT_FOUND,
            SignalingError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            SignalingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for SignalingError {
    fn into_response(self) -> Response {
        if let SignalingError::Internal(err) = &self {
            error!(%err, "signaling store failure");
        }
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_taxonomy() {
        assert_eq!(
            SignalingError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SignalingError::Authorization("x".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            SignalingError::NotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            SignalingError::RateLimited.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }
}
