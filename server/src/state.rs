//! Application state management
//!
//! One `AppState` is built at startup and shared by every request handler
//! and socket task through an `Arc`.

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::auth::TokenService;
use crate::config::Config;
use crate::db;
use crate::error::AppResult;
use crate::notify::{DisabledPush, FcmClient, Notifier, PushSender, RealtimeHub};

/// Global application state
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,

    pub config: Config,

    /// Bearer token signer/verifier
    pub tokens: TokenService,

    /// Fan-out to notification rows, push and real-time rooms
    pub notifier: Notifier,
}

impl AppState {
    /// Connect to the database, run migrations and set up push delivery
    pub async fn new(config: Config) -> AppResult<Self> {
        let db = db::connect(&config.database_url).await?;
        db::migrate(&db).await?;

        let push: Arc<dyn PushSender> = match &config.fcm_service_account {
            Some(path) => Arc::new(FcmClient::from_file(path)?),
            None => {
                tracing::warn!("FCM_SERVICE_ACCOUNT not set, push notifications are disabled");
                Arc::new(DisabledPush)
            }
        };

        Ok(Self::with_parts(db, config, push))
    }

    /// Assemble state from already-initialized parts
    pub fn with_parts(db: SqlitePool, config: Config, push: Arc<dyn PushSender>) -> Self {
        let tokens = TokenService::new(&config.jwt_secret, config.jwt_expires_in);
        let notifier = Notifier::new(db.clone(), RealtimeHub::default(), push);

        Self {
            db,
            config,
            tokens,
            notifier,
        }
    }

    pub fn hub(&self) -> &RealtimeHub {
        self.notifier.hub()
    }
}

/// Thread-safe shared state type
pub type SharedState = Arc<AppState>;

/// Create a new shared state instance
pub async fn create_shared_state(config: Config) -> AppResult<SharedState> {
    let state = AppState::new(config).await?;
    Ok(Arc::new(state))
}
