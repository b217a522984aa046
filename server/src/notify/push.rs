//! Push delivery seam

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Push delivery errors
#[derive(Debug, Error)]
pub enum PushError {
    /// The device token is unregistered or malformed; it should be forgotten
    #[error("Device token is no longer valid")]
    InvalidToken,

    /// The provider rejected the message for another reason
    #[error("Push rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Could not obtain provider credentials
    #[error("Push authentication failed: {0}")]
    Auth(String),

    #[error("Push transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// A notification addressed to one device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    /// Custom key/value payload; push providers only accept string values
    pub data: BTreeMap<String, String>,
}

impl PushMessage {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            data: BTreeMap::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// Delivers a push message to a single device token
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, token: &str, message: &PushMessage) -> Result<(), PushError>;
}

/// Used when no push credentials are configured
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledPush;

#[async_trait]
impl PushSender for DisabledPush {
    async fn send(&self, token: &str, message: &PushMessage) -> Result<(), PushError> {
        tracing::debug!(
            "Push disabled, dropping \"{}\" for device {}",
            message.title,
            token_fingerprint(token)
        );
        Ok(())
    }
}

/// Outcome of sending one message to several devices
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PushReport {
    pub success_count: usize,
    pub failure_count: usize,
    /// Tokens the provider reported as dead
    pub invalid_tokens: Vec<String>,
}

/// Send `message` to every token concurrently and collect the outcome
pub async fn send_to_tokens(
    sender: &dyn PushSender,
    tokens: &[String],
    message: &PushMessage,
) -> PushReport {
    let results = join_all(tokens.iter().map(|t| sender.send(t, message))).await;

    let mut report = PushReport::default();
    for (token, result) in tokens.iter().zip(results) {
        match result {
            Ok(()) => report.success_count += 1,
            Err(PushError::InvalidToken) => {
                report.failure_count += 1;
                report.invalid_tokens.push(token.clone());
            }
            Err(e) => {
                report.failure_count += 1;
                tracing::error!("Push to device {} failed: {}", token_fingerprint(token), e);
            }
        }
    }

    report
}

/// Short stable identifier for logging a device token without leaking it
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..6])
}
