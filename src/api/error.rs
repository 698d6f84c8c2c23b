use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    auth::{error::json_error, AuthError},
    store::StoreError,
};

/// Errors returned by route handlers.
///
/// Only user-actionable messages reach the client; everything else becomes a
/// generic 500 with the detail kept in the logs.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Auth(err) => err.into_response(),
            Self::Validation(message) => json_error(StatusCode::BAD_REQUEST, message),
            Self::NotFound(message) => json_error(StatusCode::NOT_FOUND, message),
            Self::Internal(detail) => AuthError::Internal { detail }.into_response(),
        }
    }
}
