//! Registration, login and the current-user lookup

use axum::{extract::State, http::StatusCode, Extension, Json};
use serde_json::{json, Value};

use super::JsonBody;
use crate::auth::{decoy_hash, hash_password, verify_password, AuthUser};
use crate::db;
use crate::error::{AppError, AppResult};
use crate::models::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, UserInfo};
use crate::state::SharedState;

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Create an account
pub async fn register(
    State(state): State<SharedState>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    let name = req.name.trim().to_string();
    let email = normalize_email(&req.email);

    if name.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(AppError::bad_request("Name, email and password are required"));
    }

    // Argon2 is CPU-bound
    let password = req.password;
    let hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(format!("Password hashing task failed: {e}")))??;

    let user_id = db::users::create_user(&state.db, &name, &email, &hash).await?;
    tracing::info!("Registered user {}", user_id);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User created successfully".to_string(),
            user_id,
        }),
    ))
}

/// Exchange credentials for a bearer token
pub async fn login(
    State(state): State<SharedState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let email = normalize_email(&req.email);
    if email.is_empty() || req.password.is_empty() {
        return Err(AppError::bad_request("Email and password are required"));
    }

    let user = db::users::find_by_email(&state.db, &email).await?;

    // Unknown emails are checked against a decoy so both failures take as long
    let stored_hash = match &user {
        Some(user) => user.password_hash.clone(),
        None => decoy_hash().to_string(),
    };
    let password = req.password;
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(|e| AppError::Internal(format!("Password check task failed: {e}")))?;

    let user = match user {
        Some(user) if valid => user,
        Some(user) => {
            tracing::warn!("Failed login attempt for user {}", user.id);
            return Err(AppError::InvalidCredentials);
        }
        None => return Err(AppError::InvalidCredentials),
    };

    let token = state.tokens.issue(user.id, &user.email)?;
    tracing::info!("User {} logged in", user.id);

    Ok(Json(LoginResponse {
        message: "Login successful".to_string(),
        token,
        user: UserInfo::from(user),
    }))
}

/// The authenticated caller's profile
pub async fn me(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    let info = db::users::find_by_id(&state.db, user.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    Ok(Json(json!({ "user": info })))
}
