//! Firebase Cloud Messaging client (HTTP v1 API)
//!
//! Authenticates with a service account: an RS256-signed JWT assertion is
//! exchanged for a short-lived OAuth2 access token, which is cached and
//! reused until shortly before it expires.

use std::{
    path::Path,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;

use super::push::{token_fingerprint, PushError, PushMessage, PushSender};
use crate::error::AppResult;

const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const FCM_BASE_URL: &str = "https://fcm.googleapis.com";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Refresh the access token this long before it expires
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Subset of a Google service account key file
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccount {
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// FCM error body: `{"error": {"code", "message", "status", "details": [...]}}`
#[derive(Debug, Default, Deserialize)]
struct FcmErrorBody {
    #[serde(default)]
    error: FcmErrorStatus,
}

#[derive(Debug, Default, Deserialize)]
struct FcmErrorStatus {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    details: Vec<FcmErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FcmErrorDetail {
    #[serde(default)]
    error_code: Option<String>,
}

/// Push sender backed by FCM
pub struct FcmClient {
    client: Client,
    account: ServiceAccount,
    signing_key: EncodingKey,
    access_token: Mutex<Option<CachedToken>>,
}

impl FcmClient {
    pub fn new(account: ServiceAccount) -> AppResult<Self> {
        let signing_key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())?;
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            account,
            signing_key,
            access_token: Mutex::new(None),
        })
    }

    pub fn from_file(path: &Path) -> AppResult<Self> {
        let account = ServiceAccount::from_file(path)?;
        tracing::info!(
            "Loaded FCM service account {} for project {}",
            account.client_email,
            account.project_id
        );
        Self::new(account)
    }

    fn send_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/messages:send",
            FCM_BASE_URL, self.account.project_id
        )
    }

    /// Current access token, minting a new one when missing or near expiry
    async fn access_token(&self) -> Result<String, PushError> {
        let mut cached = self.access_token.lock().await;

        if let Some(token) = cached.as_ref() {
            if Instant::now() + TOKEN_REFRESH_MARGIN < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.fetch_access_token().await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    async fn fetch_access_token(&self) -> Result<CachedToken, PushError> {
        let iat = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.account.client_email,
            scope: FCM_SCOPE,
            aud: &self.account.token_uri,
            iat,
            exp: iat + 3600,
        };

        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| PushError::Auth(format!("Failed to sign assertion: {e}")))?;

        let response = self
            .client
            .post(&self.account.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(PushError::Auth(format!(
                "Token exchange failed ({}): {}",
                status, error_text
            )));
        }

        let token: AccessTokenResponse = response.json().await?;
        tracing::debug!("Obtained FCM access token valid for {}s", token.expires_in);

        Ok(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }
}

#[async_trait]
impl PushSender for FcmClient {
    async fn send(&self, token: &str, message: &PushMessage) -> Result<(), PushError> {
        let access_token = self.access_token().await?;

        let body = json!({
            "message": {
                "token": token,
                "notification": {
                    "title": message.title,
                    "body": message.body,
                },
                "data": message.data,
            }
        });

        let response = self
            .client
            .post(self.send_url())
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!("Push delivered to device {}", token_fingerprint(token));
            return Ok(());
        }

        if status == StatusCode::UNAUTHORIZED {
            // Force a fresh access token on the next send
            self.access_token.lock().await.take();
        }

        let error_text = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &error_text))
    }
}

/// Map an FCM error response to a `PushError`
fn classify_failure(status: StatusCode, body: &str) -> PushError {
    let parsed: FcmErrorBody = serde_json::from_str(body).unwrap_or_default();
    let error = parsed.error;

    let unregistered = error
        .details
        .iter()
        .any(|d| d.error_code.as_deref() == Some("UNREGISTERED"));

    let bad_token = error.status == "INVALID_ARGUMENT"
        && error.message.to_lowercase().contains("registration token");

    // A bare NOT_FOUND can also mean a wrong project id
    if unregistered || bad_token {
        return PushError::InvalidToken;
    }

    let message = if error.message.is_empty() {
        body.to_string()
    } else {
        error.message
    };

    PushError::Rejected {
        status: status.as_u16(),
        message,
    }
}
