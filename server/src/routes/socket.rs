//! WebSocket transport for real-time events
//!
//! A client connects with `GET /ws?token=<jwt>` and is placed in its own
//! room. From then on it receives every envelope addressed to everyone or to
//! a room it has joined, as `{"event": ..., "data": ...}` text frames.

use std::collections::HashSet;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header::AUTHORIZATION, HeaderMap},
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use super::QueryParams;
use crate::auth::{bearer_token, AuthUser, TokenService};
use crate::error::{AppError, AppResult};
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct SocketQuery {
    pub token: Option<String>,
}

/// Frame sent by the client
#[derive(Debug, Deserialize)]
struct ClientFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

/// What a client frame did to the connection
#[derive(Debug, PartialEq, Eq)]
enum FrameOutcome {
    Joined(i64),
    Refused(Option<i64>),
    Ignored,
}

/// Authenticate, then upgrade
pub async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    QueryParams(query): QueryParams<SocketQuery>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let user = authenticate(&query, &headers, &state.tokens)?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user)))
}

/// Resolve the caller from `?token=`, falling back to a Bearer header
fn authenticate(
    query: &SocketQuery,
    headers: &HeaderMap,
    tokens: &TokenService,
) -> AppResult<AuthUser> {
    let header_token = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_token);

    let token = query
        .token
        .as_deref()
        .or(header_token)
        .ok_or(AppError::NotAuthenticated)?;

    tokens.verify(token)
}

async fn handle_socket(socket: WebSocket, state: SharedState, user: AuthUser) {
    let connection_id = Uuid::new_v4();
    let mut rooms = HashSet::from([user.user_id]);
    let mut events = state.hub().subscribe();
    let (mut sender, mut receiver) = socket.split();

    tracing::info!(
        "Socket {} connected for user {} ({} connected)",
        connection_id,
        user.user_id,
        state.hub().connected()
    );

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    match apply_client_frame(text.as_str(), &user, &mut rooms) {
                        FrameOutcome::Joined(room) => {
                            tracing::debug!("Socket {} joined room {}", connection_id, room);
                        }
                        FrameOutcome::Refused(room) => {
                            tracing::warn!(
                                "Socket {} of user {} may not join room {:?}",
                                connection_id,
                                user.user_id,
                                room
                            );
                        }
                        FrameOutcome::Ignored => {}
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("Socket {} errored: {}", connection_id, e);
                    break;
                }
            },
            event = events.recv() => match event {
                Ok(envelope) => {
                    if !envelope.is_for(&rooms) {
                        continue;
                    }
                    if sender.send(Message::Text(envelope.frame.to_string().into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Socket {} lagged, skipped {} event(s)", connection_id, skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    tracing::info!("Socket {} disconnected", connection_id);
}

/// Apply a client frame; only `join_room` for the caller's own id is honored
fn apply_client_frame(raw: &str, user: &AuthUser, rooms: &mut HashSet<i64>) -> FrameOutcome {
    let frame: ClientFrame = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(_) => return FrameOutcome::Ignored,
    };

    if frame.event != "join_room" {
        return FrameOutcome::Ignored;
    }

    let room = match &frame.data {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };

    match room {
        Some(id) if id == user.user_id => {
            rooms.insert(id);
            FrameOutcome::Joined(id)
        }
        other => FrameOutcome::Refused(other),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::{HeaderValue, Method, StatusCode};

    use super::*;
    use crate::test_support::TestApp;

    fn tokens() -> TokenService {
        TokenService::new("socket-secret", Duration::from_secs(60))
    }

    fn query(token: Option<&str>) -> SocketQuery {
        SocketQuery {
            token: token.map(str::to_string),
        }
    }

    fn alice() -> AuthUser {
        AuthUser {
            user_id: 7,
            email: "alice@example.com".into(),
        }
    }

    #[test]
    fn test_join_own_room_accepts_number_or_string() {
        let mut rooms = HashSet::new();
        assert_eq!(
            apply_client_frame(r#"{"event":"join_room","data":7}"#, &alice(), &mut rooms),
            FrameOutcome::Joined(7)
        );
        assert_eq!(
            apply_client_frame(r#"{"event":"join_room","data":"7"}"#, &alice(), &mut rooms),
            FrameOutcome::Joined(7)
        );
        assert_eq!(rooms, HashSet::from([7]));
    }

    #[test]
    fn test_foreign_rooms_are_refused() {
        let mut rooms = HashSet::from([7]);
        assert_eq!(
            apply_client_frame(r#"{"event":"join_room","data":8}"#, &alice(), &mut rooms),
            FrameOutcome::Refused(Some(8))
        );
        assert_eq!(
            apply_client_frame(r#"{"event":"join_room"}"#, &alice(), &mut rooms),
            FrameOutcome::Refused(None)
        );
        assert_eq!(rooms, HashSet::from([7]));
    }

    #[test]
    fn test_unknown_frames_are_ignored() {
        let mut rooms = HashSet::new();
        assert_eq!(
            apply_client_frame("not json", &alice(), &mut rooms),
            FrameOutcome::Ignored
        );
        assert_eq!(
            apply_client_frame(r#"{"event":"typing","data":1}"#, &alice(), &mut rooms),
            FrameOutcome::Ignored
        );
        assert!(rooms.is_empty());
    }

    #[test]
    fn test_missing_token_is_unauthorized() {
        let err = authenticate(&query(None), &HeaderMap::new(), &tokens()).unwrap_err();
        assert!(matches!(err, AppError::NotAuthenticated));
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_garbage_token_is_unauthorized() {
        let err = authenticate(&query(Some("not.a.jwt")), &HeaderMap::new(), &tokens()).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);

        let foreign = TokenService::new("other-secret", Duration::from_secs(60))
            .issue(7, "alice@example.com")
            .unwrap();
        let err = authenticate(&query(Some(&foreign)), &HeaderMap::new(), &tokens()).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_valid_token_from_query_or_header() {
        let service = tokens();
        let token = service.issue(7, "alice@example.com").unwrap();

        let user = authenticate(&query(Some(&token)), &HeaderMap::new(), &service).unwrap();
        assert_eq!(user, alice());

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        let user = authenticate(&query(None), &headers, &service).unwrap();
        assert_eq!(user, alice());
    }

    #[tokio::test]
    async fn test_upgrade_requires_websocket_request() {
        let app = TestApp::new().await;
        let (status, _) = app.request(Method::GET, "/ws", None, None).await;
        assert!(status.is_client_error());
    }
}
