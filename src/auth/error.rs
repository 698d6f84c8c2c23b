//! Error kinds raised by login, rotation and the access gate.
//!
//! Every variant renders as `{"error": "<message>"}`. Messages of the
//! user-actionable kinds are shown verbatim; `Internal` keeps its detail for the
//! logs and answers with a generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt::Display;
use thiserror::Error;
use tracing::error;

use super::login::{LOCKOUT_DURATION, MAX_FAILED_ATTEMPTS};
use crate::store::StoreError;

pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No `Authorization` header.
    #[error("Unauthorized")]
    MissingToken,
    /// Malformed, forged or expired token.
    #[error("Invalid token")]
    InvalidToken,
    #[error("You must change your password before continuing")]
    MustRotatePassword,
    #[error("Insufficient permissions")]
    ForbiddenRole,
    /// Wrong password or unknown e-mail. `attempt` is only known for existing accounts.
    #[error("{}", invalid_credentials_message(*.attempt))]
    InvalidCredentials { attempt: Option<u8> },
    /// The failure that just triggered a lock.
    #[error(
        "Account locked for {} seconds after too many failed attempts",
        LOCKOUT_DURATION.as_secs()
    )]
    LockedOut,
    /// An attempt made while a lock is still running.
    #[error("Account locked. Try again in {remaining_seconds} seconds")]
    AccountLocked { remaining_seconds: u64 },
    #[error("{0}")]
    Validation(String),
    #[error("{INTERNAL_ERROR_MESSAGE}")]
    Internal { detail: String },
}

fn invalid_credentials_message(attempt: Option<u8>) -> String {
    match attempt {
        Some(attempt) => {
            format!("Invalid credentials. Attempt {attempt} of {MAX_FAILED_ATTEMPTS}")
        }
        None => "Invalid credentials".to_string(),
    }
}

impl AuthError {
    pub fn internal(detail: impl Display) -> Self {
        Self::Internal {
            detail: detail.to_string(),
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingToken
            | Self::InvalidToken
            | Self::InvalidCredentials { .. }
            | Self::LockedOut
            | Self::AccountLocked { .. } => StatusCode::UNAUTHORIZED,
            Self::MustRotatePassword | Self::ForbiddenRole => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        Self::internal(err)
    }
}

/// JSON error body shared by every error response.
pub fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let Self::Internal { detail } = &self {
            error!("Internal error: {detail}");
        }
        json_error(self.status(), self.to_string())
    }
}
