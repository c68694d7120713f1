//! Error taxonomy for the session lifecycle.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use super::store::StoreError;

/// All failures the session manager can report.
///
/// Credential failures stay deliberately generic: the same error covers an
/// unknown email, an inactive account, and a wrong password, so responses
/// cannot be used for account enumeration.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("already exists")]
    AlreadyExists,

    #[error("invalid token")]
    InvalidToken,

    #[error("token revoked")]
    TokenRevoked,

    #[error("forbidden")]
    Forbidden,

    #[error("token store unavailable")]
    StoreUnavailable(#[from] StoreError),

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("database error: {0}")]
    Database(#[source] anyhow::Error),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::AuthenticationFailed | Self::InvalidToken | Self::TokenRevoked => {
                StatusCode::UNAUTHORIZED
            }
            Self::AlreadyExists => StatusCode::CONFLICT,
            Self::Forbidden => StatusCode::FORBIDDEN,
            // Store unreachable is never treated as success: the operation
            // fails closed with a 5xx instead of honoring untracked tokens.
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Hashing(_) | Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("{self:#}");
            // No internal detail crosses the boundary.
            return (status, status.canonical_reason().unwrap_or("error")).into_response();
        }

        (status, self.to_string()).into_response()
    }
}
