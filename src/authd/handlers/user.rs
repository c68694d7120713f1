use axum::{
    extract::{Extension, Path},
    http::{header::LOCATION, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{normalize_email, valid_email, valid_password};
use crate::authd::extract::AuthUser;
use crate::session::{error::AuthError, SessionManager};
use crate::storage::LoginRecord;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserIn {
    email: String,
    password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserInfoOut {
    id: String,
    email: String,
    registered_at: String,
    active: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct UserPatchIn {
    email: Option<String>,
    new_password: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserLoginRecord {
    timestamp: String,
    ip: Option<String>,
    user_agent: String,
    platform: Option<String>,
    browser: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserLoginRecordsOut {
    logins: Vec<UserLoginRecord>,
}

impl From<LoginRecord> for UserLoginRecord {
    fn from(record: LoginRecord) -> Self {
        Self {
            timestamp: record.timestamp.to_rfc3339(),
            ip: record.ip,
            user_agent: record.user_agent,
            platform: record.platform,
            browser: record.browser,
        }
    }
}

#[utoipa::path(
    post,
    path= "/api/v1/user",
    request_body = UserIn,
    responses (
        (status = 201, description = "User created"),
        (status = 400, description = "Invalid email or password", body = String),
        (status = 409, description = "User with the specified email already exists", body = String),
    ),
    tag= "user"
)]
#[instrument(skip(manager, payload))]
pub async fn create_user(
    Extension(manager): Extension<Arc<SessionManager>>,
    payload: Option<Json<UserIn>>,
) -> Response {
    let Some(Json(user)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    let email = normalize_email(&user.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }
    if !valid_password(&user.password) {
        return (
            StatusCode::BAD_REQUEST,
            "Password must be 8 to 100 characters".to_string(),
        )
            .into_response();
    }

    debug!("registration for {email}");

    match manager.create_user(&email, &user.password).await {
        Ok(user) => {
            let mut headers = HeaderMap::new();
            if let Ok(location) = format!("/api/v1/user/{}", user.id).parse() {
                headers.insert(LOCATION, location);
            }
            (StatusCode::CREATED, headers, "Created").into_response()
        }
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path= "/api/v1/user/{id}",
    params(("id" = String, Path, description = "user id")),
    responses (
        (status = 200, description = "Detailed user info", body = UserInfoOut),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
    ),
    tag= "user"
)]
#[instrument(skip(manager, claims))]
pub async fn user_info(
    Extension(manager): Extension<Arc<SessionManager>>,
    AuthUser(claims): AuthUser,
    Path(user_id): Path<Uuid>,
) -> Response {
    if claims.sub != user_id {
        return AuthError::Forbidden.into_response();
    }

    match manager.user_info(user_id).await {
        Ok(Some(user)) => Json(UserInfoOut {
            id: user.id.to_string(),
            email: user.email,
            registered_at: user.registered_at.to_rfc3339(),
            active: user.active,
        })
        .into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    patch,
    path= "/api/v1/user/{id}",
    params(("id" = String, Path, description = "user id")),
    request_body = UserPatchIn,
    responses (
        (status = 200, description = "User updated"),
        (status = 400, description = "Invalid email or password", body = String),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
    ),
    tag= "user"
)]
#[instrument(skip(manager, claims, payload))]
pub async fn patch_user(
    Extension(manager): Extension<Arc<SessionManager>>,
    AuthUser(claims): AuthUser,
    Path(user_id): Path<Uuid>,
    payload: Option<Json<UserPatchIn>>,
) -> Response {
    if claims.sub != user_id {
        return AuthError::Forbidden.into_response();
    }

    let Some(Json(patch)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    if let Some(email) = patch.email {
        let email = normalize_email(&email);
        if !valid_email(&email) {
            return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
        }
        if let Err(err) = manager.update_email(user_id, &email).await {
            return err.into_response();
        }
    }

    if let Some(new_password) = patch.new_password {
        if !valid_password(&new_password) {
            return (
                StatusCode::BAD_REQUEST,
                "Password must be 8 to 100 characters".to_string(),
            )
                .into_response();
        }
        if let Err(err) = manager.change_password(user_id, &new_password).await {
            return err.into_response();
        }
    }

    (StatusCode::OK, "OK").into_response()
}

#[utoipa::path(
    get,
    path= "/api/v1/user/{id}/login_history",
    params(("id" = String, Path, description = "user id")),
    responses (
        (status = 200, description = "Login history", body = UserLoginRecordsOut),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
    ),
    tag= "login_history"
)]
#[instrument(skip(manager, claims))]
pub async fn login_history(
    Extension(manager): Extension<Arc<SessionManager>>,
    AuthUser(claims): AuthUser,
    Path(user_id): Path<Uuid>,
) -> Response {
    if claims.sub != user_id {
        return AuthError::Forbidden.into_response();
    }

    match manager.login_history(user_id).await {
        Ok(records) => Json(UserLoginRecordsOut {
            logins: records.into_iter().map(UserLoginRecord::from).collect(),
        })
        .into_response(),
        Err(err) => err.into_response(),
    }
}
