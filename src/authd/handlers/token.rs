use axum::{
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};
use utoipa::{IntoParams, ToSchema};

use super::{client_ip, normalize_email, user_agent};
use crate::authd::extract::{bearer_token, AuthUser};
use crate::session::{error::AuthError, SessionManager, TokenPair};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenInPassword {
    grant_type: String,
    email: String,
    password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenGrantOut {
    access_token: String,
    refresh_token: String,
    token_type: String,
    /// Access-token TTL in seconds.
    expires: u64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenRevokeIn {
    token: String,
}

#[derive(IntoParams, Debug, Deserialize, Default)]
#[into_params(parameter_in = Query)]
pub struct RevokeArgs {
    /// Whether to logout from all devices.
    all: Option<bool>,
}

fn grant_response(manager: &SessionManager, pair: TokenPair) -> Response {
    Json(TokenGrantOut {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        token_type: "bearer".to_string(),
        expires: manager.access_ttl().as_secs(),
    })
    .into_response()
}

#[utoipa::path(
    post,
    path= "/api/v1/token",
    request_body = TokenInPassword,
    responses (
        (status = 200, description = "New token pair for the calling device", body = TokenGrantOut),
        (status = 400, description = "Malformed grant request", body = String),
        (status = 401, description = "Authentication failed", body = String),
        (status = 503, description = "Token store unavailable", body = String),
    ),
    tag = "token"
)]
#[instrument(skip(manager, headers, payload))]
pub async fn token_grant(
    Extension(manager): Extension<Arc<SessionManager>>,
    headers: HeaderMap,
    payload: Option<Json<TokenInPassword>>,
) -> Response {
    let Some(Json(grant)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    if grant.grant_type != "password" {
        return (StatusCode::BAD_REQUEST, "Unsupported grant type".to_string()).into_response();
    }

    debug!("password grant");

    let email = normalize_email(&grant.email);
    let ip = client_ip(&headers);

    match manager
        .authenticate(
            &email,
            &grant.password,
            user_agent(&headers),
            ip.as_deref(),
        )
        .await
    {
        Ok(pair) => grant_response(&manager, pair),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path= "/api/v1/refresh_token",
    responses (
        (status = 200, description = "Rotated token pair; the presented refresh token is no longer live", body = TokenGrantOut),
        (status = 401, description = "Invalid or revoked refresh token", body = String),
        (status = 503, description = "Token store unavailable", body = String),
    ),
    tag = "token"
)]
#[instrument(skip(manager, headers))]
pub async fn refresh_token(
    Extension(manager): Extension<Arc<SessionManager>>,
    headers: HeaderMap,
) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return AuthError::InvalidToken.into_response();
    };

    debug!("refresh token rotation");

    match manager.refresh(&token).await {
        Ok(pair) => grant_response(&manager, pair),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    delete,
    path= "/api/v1/refresh_token",
    params(RevokeArgs),
    responses (
        (status = 200, description = "Device session revoked"),
        (status = 401, description = "Unauthorized", body = String),
        (status = 503, description = "Token store unavailable", body = String),
    ),
    tag = "token"
)]
#[instrument(skip(manager, claims, headers))]
pub async fn revoke_refresh_token(
    Extension(manager): Extension<Arc<SessionManager>>,
    AuthUser(claims): AuthUser,
    Query(args): Query<RevokeArgs>,
    headers: HeaderMap,
) -> Response {
    debug!("logout");

    let result = if args.all.unwrap_or(false) {
        manager.revoke_all_devices(claims.sub).await
    } else {
        manager.revoke_device(claims.sub, user_agent(&headers)).await
    };

    match result {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    delete,
    path= "/api/v1/token",
    request_body = TokenRevokeIn,
    responses (
        (status = 200, description = "Token blacklisted until its natural expiry"),
        (status = 401, description = "Unauthorized", body = String),
        (status = 503, description = "Token store unavailable", body = String),
    ),
    tag = "token"
)]
#[instrument(skip(manager, _claims, payload))]
pub async fn revoke_token(
    Extension(manager): Extension<Arc<SessionManager>>,
    AuthUser(_claims): AuthUser,
    payload: Option<Json<TokenRevokeIn>>,
) -> Response {
    let Some(Json(revoke)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    match manager.blacklist_token(&revoke.token).await {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(err) => err.into_response(),
    }
}
