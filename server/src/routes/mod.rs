//! HTTP routes
//!
//! Everything under `/api` except register/login sits behind the auth gate.

pub mod auth;
pub mod contacts;
pub mod notifications;
pub mod socket;
pub mod statuses;

use std::time::Duration;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Query, Request,
    },
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        request::Parts,
        HeaderValue, Method,
    },
    middleware,
    routing::{delete, get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::auth::require_auth;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::state::SharedState;

pub const HEALTH_TEXT: &str = "Timeline server is running";

/// Build the application router
pub fn router(state: SharedState) -> Router {
    let protected = Router::new()
        .route("/api/auth/me", get(auth::me))
        .route(
            "/api/contacts",
            get(contacts::list_contacts).post(contacts::create_contact),
        )
        .route("/api/contacts/potential", get(contacts::potential_contacts))
        .route("/api/contacts/{contact_id}", delete(contacts::delete_contact))
        .route(
            "/api/statuses",
            get(statuses::get_feed).post(statuses::create_status),
        )
        .route("/api/statuses/{status_id}", delete(statuses::delete_status))
        .route("/api/statuses/{status_id}/like", post(statuses::like_status))
        .route("/api/statuses/{status_id}/view", post(statuses::record_view))
        .route("/api/statuses/{status_id}/viewers", get(statuses::list_viewers))
        .route("/api/notifications", get(notifications::list_notifications))
        .route("/api/notifications/read", post(notifications::mark_all_read))
        .route(
            "/api/notifications/register-token",
            post(notifications::register_token),
        )
        .route(
            "/api/notifications/send-test",
            post(notifications::send_test_notification),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/", get(health))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/ws", get(socket::upgrade))
        .merge(protected)
        .with_state(state)
}

async fn health() -> &'static str {
    HEALTH_TEXT
}

/// CORS policy for the browser client
pub fn cors_layer(config: &Config) -> AppResult<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let layer = match &config.cors_origin {
        Some(origin) => {
            let value = HeaderValue::from_str(origin)
                .map_err(|e| AppError::Config(format!("Invalid CORS_ORIGIN: {e}")))?;
            layer.allow_origin(AllowOrigin::exact(value))
        }
        None => layer.allow_origin(Any),
    };

    Ok(layer)
}

/// JSON body extractor whose rejections use the API's error format
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> AppError {
    AppError::bad_request(format!("Malformed request body: {}", rejection.body_text()))
}

/// Query string extractor whose rejections use the API's error format
pub struct QueryParams<T>(pub T);

impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(query_rejection(rejection)),
        }
    }
}

fn query_rejection(rejection: QueryRejection) -> AppError {
    AppError::bad_request(format!("Malformed query string: {}", rejection.body_text()))
}

/// Parse a numeric path segment
pub fn parse_id(raw: &str, what: &str) -> AppResult<i64> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::bad_request(format!("Invalid {what} id")))
}
