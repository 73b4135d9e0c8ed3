use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use crate::matcher::MatcherError;
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Invalid address format")]
    InvalidAddress,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Matcher unavailable")]
    Unavailable,

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::InvalidAddress => (StatusCode::BAD_REQUEST, "Invalid Solana address format".to_string()),
            ApiError::InvalidParameter(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Unavailable => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string()),
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::InvalidSolanaAddress(_) => ApiError::InvalidAddress,
            ValidationError::InvalidSide(side) => ApiError::InvalidParameter(format!("side '{}' must be buy or sell", side)),
            ValidationError::MissingParameter(param) => ApiError::BadRequest(format!("Missing parameter: {}", param)),
            ValidationError::InvalidParameter(msg) => ApiError::InvalidParameter(msg),
        }
    }
}

impl From<MatcherError> for ApiError {
    fn from(err: MatcherError) -> Self {
        match err {
            MatcherError::Closed => ApiError::Unavailable,
            MatcherError::InvalidPrice(msg) => ApiError::InvalidParameter(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
