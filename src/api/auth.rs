use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use ulid::Ulid;

use crate::auth;
use crate::limits::MIN_PASSWORD_LEN;
use crate::observability::AUTH_FAILURES_TOTAL;

use super::{require_principal, ApiError, AppState};

fn missing(field: &str) -> ApiError {
    ApiError::Validation(format!("{field}: this field is required."))
}

#[derive(Deserialize)]
pub(super) struct RegisterRequest {
    username: Option<String>,
    password1: Option<String>,
    password2: Option<String>,
}

pub(super) async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<StatusCode, ApiError> {
    let username = req.username.filter(|u| !u.is_empty()).ok_or_else(|| missing("username"))?;
    let password1 = req.password1.filter(|p| !p.is_empty()).ok_or_else(|| missing("password1"))?;
    let password2 = req.password2.filter(|p| !p.is_empty()).ok_or_else(|| missing("password2"))?;

    if password1 != password2 {
        return Err(ApiError::Validation(
            "The two password fields didn't match.".into(),
        ));
    }
    if password1.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "This password is too short. It must contain at least {MIN_PASSWORD_LEN} characters."
        )));
    }

    let hash = auth::hash_password(&password1);
    state
        .engine
        .register_user(Ulid::new(), username, hash, false)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub(super) struct LoginRequest {
    username: Option<String>,
    password: Option<String>,
}

#[derive(Serialize)]
pub(super) struct LoginResponse {
    key: String,
}

pub(super) async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let username = req.username.ok_or_else(|| missing("username"))?;
    let password = req.password.ok_or_else(|| missing("password"))?;

    let user = state.engine.find_user(&username);
    let valid = user
        .as_ref()
        .is_some_and(|u| auth::verify_password(&password, &u.password_hash));
    let Some(user) = user.filter(|_| valid) else {
        metrics::counter!(AUTH_FAILURES_TOTAL).increment(1);
        return Err(ApiError::Validation(
            "Unable to log in with provided credentials.".into(),
        ));
    };

    let key = state.sessions.issue(user.id);
    Ok(Json(LoginResponse { key }))
}

pub(super) async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    // Authenticate first so a stale token still gets a clean 401.
    require_principal(&state, &headers)?;
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(auth::token_from_header)
        .ok_or(ApiError::Unauthorized)?;
    state.sessions.revoke(token);
    Ok(Json(json!({ "detail": "Successfully logged out." })))
}

#[derive(Serialize)]
pub(super) struct UserResponse {
    id: String,
    username: String,
    is_superuser: bool,
}

pub(super) async fn user_detail(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserResponse>, ApiError> {
    let p = require_principal(&state, &headers)?;
    Ok(Json(UserResponse {
        id: p.user_id.to_string(),
        username: p.username,
        is_superuser: p.is_superuser,
    }))
}

#[derive(Deserialize)]
pub(super) struct UserWrite {
    username: Option<String>,
}

pub(super) async fn user_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UserWrite>,
) -> Result<Json<UserResponse>, ApiError> {
    let p = require_principal(&state, &headers)?;
    let username = req.username.ok_or_else(|| missing("username"))?;
    state.engine.rename_user(p.user_id, username.clone()).await?;
    Ok(Json(UserResponse {
        id: p.user_id.to_string(),
        username,
        is_superuser: p.is_superuser,
    }))
}

pub(super) async fn user_patch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UserWrite>,
) -> Result<Json<UserResponse>, ApiError> {
    let p = require_principal(&state, &headers)?;
    let username = match req.username {
        Some(username) => {
            state.engine.rename_user(p.user_id, username.clone()).await?;
            username
        }
        None => p.username,
    };
    Ok(Json(UserResponse {
        id: p.user_id.to_string(),
        username,
        is_superuser: p.is_superuser,
    }))
}
