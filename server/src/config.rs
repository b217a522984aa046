//! Environment-driven server configuration

use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use tracing::{info, warn};

use crate::error::{AppError, AppResult};

pub const DEFAULT_DATABASE_URL: &str = "sqlite:timeline.db?mode=rwc";

/// Server configuration, loaded once at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expires_in: Duration,
    /// Allowed CORS origin; any origin when unset
    pub cors_origin: Option<String>,
    /// Path to the Firebase service account JSON; push is disabled when unset
    pub fcm_service_account: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the process environment and an optional `.env` file
    pub fn from_env() -> AppResult<Self> {
        match dotenvy::dotenv() {
            Ok(path) => info!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => warn!("Failed to read .env file: {}", e),
        }

        let jwt_secret = var("JWT_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Config("JWT_SECRET must be set".into()))?;

        let expires_raw = var("JWT_EXPIRES_IN").unwrap_or_else(|| "1d".to_string());
        let jwt_expires_in = parse_duration(&expires_raw).ok_or_else(|| {
            AppError::Config(format!("Invalid JWT_EXPIRES_IN value: {expires_raw}"))
        })?;

        Ok(Self {
            port: try_load("PORT", "3000")?,
            bind_address: try_load("BIND_ADDRESS", "0.0.0.0")?,
            database_url: try_load("DATABASE_URL", DEFAULT_DATABASE_URL)?,
            jwt_secret,
            jwt_expires_in,
            cors_origin: var("CORS_ORIGIN").filter(|s| !s.is_empty()),
            fcm_service_account: var("FCM_SERVICE_ACCOUNT")
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
        })
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn try_load<T: FromStr>(key: &str, default: &str) -> AppResult<T>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| AppError::Config(format!("Invalid {key} value: {e}")))
}

/// Parse a lifetime such as `3600`, `45s`, `30m`, `12h` or `7d`
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (digits, unit) = match raw.char_indices().last()? {
        (idx, c) if c.is_ascii_alphabetic() => (&raw[..idx], c),
        _ => (raw, 's'),
    };

    let amount: u64 = digits.trim().parse().ok()?;
    let seconds = match unit.to_ascii_lowercase() {
        's' => amount,
        'm' => amount.checked_mul(60)?,
        'h' => amount.checked_mul(60 * 60)?,
        'd' => amount.checked_mul(24 * 60 * 60)?,
        _ => return None,
    };

    // Token expiry is an i64 timestamp
    (seconds > 0 && i64::try_from(seconds).is_ok()).then(|| Duration::from_secs(seconds))
}
