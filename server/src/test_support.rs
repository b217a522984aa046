//! Shared fixtures for unit tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;

use crate::auth::hash_password;
use crate::config::Config;
use crate::db;
use crate::notify::{PushError, PushMessage, PushSender};
use crate::routes;
use crate::state::{AppState, SharedState};

type Sent = (String, PushMessage);

/// Records every push; tokens starting with "dead" are reported invalid
#[derive(Clone)]
pub struct RecordingPush {
    sent: Arc<Mutex<Vec<Sent>>>,
    tx: mpsc::UnboundedSender<Sent>,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Sent>>>,
}

impl Default for RecordingPush {
    fn default() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sent: Arc::default(),
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
        }
    }
}

impl RecordingPush {
    pub fn sent_tokens(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(token, _)| token.clone())
            .collect()
    }

    /// Wait for the next push attempt
    pub async fn next(&self) -> Option<Sent> {
        self.rx.lock().await.recv().await
    }
}

#[async_trait]
impl PushSender for RecordingPush {
    async fn send(&self, token: &str, message: &PushMessage) -> Result<(), PushError> {
        let entry = (token.to_string(), message.clone());
        self.sent.lock().unwrap().push(entry.clone());
        let _ = self.tx.send(entry);

        if token.starts_with("dead") {
            Err(PushError::InvalidToken)
        } else {
            Ok(())
        }
    }
}

pub fn test_config() -> Config {
    Config {
        port: 0,
        bind_address: "127.0.0.1".into(),
        database_url: "sqlite::memory:".into(),
        jwt_secret: "test-secret".into(),
        jwt_expires_in: Duration::from_secs(3600),
        cors_origin: None,
        fcm_service_account: None,
    }
}

pub async fn test_state() -> (SharedState, RecordingPush) {
    let pool = db::pool::memory_pool().await;
    let push = RecordingPush::default();
    let state = AppState::with_parts(pool, test_config(), Arc::new(push.clone()));
    (Arc::new(state), push)
}

/// Create a user directly and return `(id, bearer token)`
pub async fn seed_user(state: &SharedState, name: &str) -> (i64, String) {
    let email = format!("{}@example.com", name.to_lowercase());
    let hash = hash_password("password").unwrap();
    let id = db::users::create_user(&state.db, name, &email, &hash).await.unwrap();
    let token = state.tokens.issue(id, &email).unwrap();
    (id, token)
}

/// Test client over the full router
pub struct TestApp {
    pub state: SharedState,
    pub push: RecordingPush,
    router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        let (state, push) = test_state().await;
        let router = routes::router(state.clone());
        Self {
            state,
            push,
            router,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));

        (status, value)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, Some(token), None).await
    }
}
