//! Auth gate for protected routes

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use super::token::bearer_token;
use crate::error::AppError;
use crate::state::SharedState;

/// Validate the bearer token and attach the caller's `AuthUser` to the request
pub async fn require_auth(
    State(state): State<SharedState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_token)
        .ok_or(AppError::NotAuthenticated)?;

    let user = state.tokens.verify(token)?;
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}
