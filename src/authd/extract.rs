//! Bearer-token request admission.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::error;

use crate::session::{error::AuthError, tokens::Claims, SessionManager};

/// Claims of a validated access token.
///
/// Validation covers signature, expiry, token type, and the blacklist; a
/// token-store outage rejects the request instead of letting a possibly
/// revoked token through.
pub struct AuthUser(pub Claims);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(manager) = parts.extensions.get::<Arc<SessionManager>>().cloned() else {
            error!("session manager extension missing");
            return Err(StatusCode::INTERNAL_SERVER_ERROR.into_response());
        };

        let token = bearer_token(&parts.headers)
            .ok_or_else(|| AuthError::InvalidToken.into_response())?;

        let claims = manager
            .authorize_access(&token)
            .await
            .map_err(IntoResponse::into_response)?;

        Ok(Self(claims))
    }
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
