//! Shared data types for database rows and JSON payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ============================================================================
// User Types
// ============================================================================

/// Full user row, including the password hash
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Public user information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserInfo {
    pub id: i64,
    pub name: String,
    pub email: String,
}

impl From<UserRecord> for UserInfo {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
        }
    }
}

/// Owner/actor summary attached to statuses and notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
}

// ============================================================================
// Auth Types
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub message: String,
    pub user_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
    pub user: UserInfo,
}

// ============================================================================
// Contact Types
// ============================================================================

/// A user in the caller's contact list
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    pub id: i64,
    pub name: String,
    pub email: String,
    /// Id of the contact edge itself
    pub contact_record_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateContactRequest {
    #[serde(default, deserialize_with = "lenient_id")]
    pub contact_id: Option<i64>,
}

// ============================================================================
// Status Types
// ============================================================================

/// Status visibility policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Contacts,
    SpecificUsers,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Contacts => "contacts",
            Visibility::SpecificUsers => "specific_users",
        }
    }
}

impl std::str::FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "contacts" => Ok(Visibility::Contacts),
            "specific_users" => Ok(Visibility::SpecificUsers),
            other => Err(format!("Unknown visibility: {other}")),
        }
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bare status row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StatusRecord {
    pub id: i64,
    pub owner_id: i64,
    pub content_url: String,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
}

/// Like and view totals of a status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub likes: i64,
    pub views: i64,
}

/// Status as it appears in a feed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusItem {
    pub id: i64,
    #[serde(rename = "content_url")]
    pub content_url: String,
    pub visibility: Visibility,
    pub owner_id: i64,
    pub created_at: DateTime<Utc>,
    pub owner: UserSummary,
    #[serde(rename = "_count")]
    pub counts: StatusCounts,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateStatusRequest {
    #[serde(default)]
    pub content_url: String,
    #[serde(default)]
    pub visibility: String,
    #[serde(default, deserialize_with = "lenient_ids")]
    pub user_ids: Vec<i64>,
}

/// Feed pagination
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct FeedQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl FeedQuery {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 200;

    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeResponse {
    pub message: String,
    pub like_count: i64,
}

/// Payload of `status_like_updated` / `status_view_updated`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CountUpdate {
    pub status_id: i64,
    pub new_count: i64,
}

// ============================================================================
// Notification Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum NotificationType {
    Like,
    View,
}

impl NotificationType {
    /// Sentence fragment following the actor's name
    pub fn action_text(&self) -> &'static str {
        match self {
            NotificationType::Like => "liked your status.",
            NotificationType::View => "viewed your status.",
        }
    }

    /// Push notification title
    pub fn push_title(&self) -> &'static str {
        match self {
            NotificationType::Like => "Your status was liked",
            NotificationType::View => "Your status was viewed",
        }
    }
}

/// Flat notification row joined with actor and status details
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NotificationRow {
    pub id: i64,
    #[sqlx(rename = "type")]
    pub kind: NotificationType,
    pub user_id: i64,
    pub actor_id: i64,
    pub status_id: i64,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub actor_name: String,
    pub status_content_url: String,
}

/// Status reference attached to a notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationStatus {
    pub id: i64,
    pub content_url: String,
}

/// Display text of a notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationData {
    pub liker_name: String,
    pub message: String,
}

/// Notification as delivered to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub user_id: i64,
    pub actor_id: i64,
    pub status_id: i64,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub actor: UserSummary,
    pub status: NotificationStatus,
    pub data: NotificationData,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        let message = format!("{} {}", row.actor_name, row.kind.action_text());
        Self {
            id: row.id,
            kind: row.kind,
            user_id: row.user_id,
            actor_id: row.actor_id,
            status_id: row.status_id,
            is_read: row.is_read,
            created_at: row.created_at,
            actor: UserSummary {
                id: row.actor_id,
                name: row.actor_name.clone(),
            },
            status: NotificationStatus {
                id: row.status_id,
                content_url: row.status_content_url,
            },
            data: NotificationData {
                liker_name: row.actor_name,
                message,
            },
        }
    }
}

/// Notifications split by read state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationFeed {
    pub unread: Vec<Notification>,
    pub read: Vec<Notification>,
}

impl FromIterator<Notification> for NotificationFeed {
    fn from_iter<I: IntoIterator<Item = Notification>>(iter: I) -> Self {
        let (read, unread) = iter.into_iter().partition(|n| n.is_read);
        Self { unread, read }
    }
}

// ============================================================================
// Push Token Types
// ============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PushTokenRecord {
    pub id: i64,
    pub token: String,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterTokenRequest {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestNotificationRequest {
    pub title: Option<String>,
    pub body: Option<String>,
}

// ============================================================================
// Generic Responses
// ============================================================================

/// Plain `{ "message": ... }` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ============================================================================
// Lenient id decoding
// ============================================================================

/// Ids arrive from forms as either numbers or numeric strings
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Int(i64),
    Text(String),
}

impl RawId {
    fn into_id(self) -> Option<i64> {
        match self {
            RawId::Int(id) => Some(id),
            RawId::Text(s) => s.trim().parse().ok(),
        }
    }
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    // Values of any other shape read as absent and the handler answers 400
    let raw = Option::<RawId>::deserialize(deserializer).ok().flatten();
    Ok(raw.and_then(RawId::into_id))
}

fn lenient_ids<'de, D>(deserializer: D) -> Result<Vec<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<RawId>>::deserialize(deserializer)?.unwrap_or_default();
    raw.into_iter()
        .map(|id| {
            id.into_id()
                .ok_or_else(|| serde::de::Error::custom("user_ids must contain numeric ids"))
        })
        .collect()
}
