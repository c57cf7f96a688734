use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Path, Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::validate_ws_token;
use crate::relay::{ClientEvent, RelayEvent, Room};
use crate::server::AppState;
use crate::server::validation::MAX_MESSAGE_LEN;
use crate::types::{StreamMessage, User};

#[derive(Debug, Default, Deserialize)]
pub struct WsAuthParams {
    #[serde(default)]
    pub token: Option<String>,
}

pub fn ws_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/feed", get(feed_handler))
        .route("/streams/{id}", get(stream_handler))
}

fn auth_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// GET /ws/feed
///
/// Read-only firehose: new public loops plus the caller's own
/// notifications. Client frames are ignored.
async fn feed_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<WsAuthParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let user = match validate_ws_token(&state, auth_header(&headers), params.token.as_deref()) {
        Ok(user) => user,
        Err(_) => return StatusCode::UNAUTHORIZED.into_response(),
    };

    ws.on_upgrade(move |socket| feed_socket(state, socket, user))
}

async fn feed_socket(state: Arc<AppState>, socket: WebSocket, user: User) {
    let feed_room = Room::feed();
    let user_room = Room::user(&user.id);
    let (feed_sub, mut feed_rx) = state.relay.subscribe(&feed_room).await;
    let (user_sub, mut user_rx) = state.relay.subscribe(&user_room).await;

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            Some(payload) = feed_rx.recv() => {
                if sink.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            Some(payload) = user_rx.recv() => {
                if sink.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.relay.unsubscribe(&feed_room, feed_sub).await;
    state.relay.unsubscribe(&user_room, user_sub).await;
    debug!("feed socket closed for {}", user.username);
}

/// GET /ws/streams/{id}
///
/// Joins a live stream's room: chat, typing signals, gifts, and join or
/// leave announcements with audience counts. Joining requires the
/// stream to still be live.
async fn stream_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Query(params): Query<WsAuthParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let user = match validate_ws_token(&state, auth_header(&headers), params.token.as_deref()) {
        Ok(user) => user,
        Err(_) => return StatusCode::UNAUTHORIZED.into_response(),
    };

    let stream = match state.store.get_stream(&id) {
        Ok(Some(stream)) => stream,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!("failed to load stream {id}: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    if !stream.live {
        return StatusCode::GONE.into_response();
    }

    ws.on_upgrade(move |socket| stream_socket(state, socket, user, id))
}

async fn stream_socket(state: Arc<AppState>, socket: WebSocket, user: User, stream_id: String) {
    let stream_room = Room::stream(&stream_id);
    let user_room = Room::user(&user.id);
    let (stream_sub, mut stream_rx) = state.relay.subscribe(&stream_room).await;
    let (user_sub, mut user_rx) = state.relay.subscribe(&user_room).await;

    let viewer_count = state.relay.subscriber_count(&stream_room).await;
    state
        .relay
        .broadcast(
            &stream_room,
            &RelayEvent::StreamJoined {
                stream_id: stream_id.clone(),
                user_id: user.id.clone(),
                username: user.username.clone(),
                viewer_count,
            },
        )
        .await;

    let (mut sink, mut incoming) = socket.split();

    loop {
        tokio::select! {
            Some(payload) = stream_rx.recv() => {
                if sink.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            Some(payload) = user_rx.recv() => {
                if sink.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            frame = incoming.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_frame(&state, &user, &stream_id, &stream_room, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.relay.unsubscribe(&stream_room, stream_sub).await;
    state.relay.unsubscribe(&user_room, user_sub).await;

    let viewer_count = state.relay.subscriber_count(&stream_room).await;
    state
        .relay
        .broadcast(
            &stream_room,
            &RelayEvent::StreamLeft {
                stream_id: stream_id.clone(),
                user_id: user.id.clone(),
                username: user.username.clone(),
                viewer_count,
            },
        )
        .await;
}

async fn handle_client_frame(
    state: &Arc<AppState>,
    user: &User,
    stream_id: &str,
    stream_room: &Room,
    text: &str,
) {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            debug!("dropping malformed client frame: {e}");
            return;
        }
    };

    match event {
        ClientEvent::Chat { content } => {
            let content = content.trim().to_string();
            if content.is_empty() || content.len() > MAX_MESSAGE_LEN {
                return;
            }

            // Chat on an ended stream is dropped, not persisted.
            match state.store.get_stream(stream_id) {
                Ok(Some(stream)) if stream.live => {}
                Ok(_) => return,
                Err(e) => {
                    warn!("failed to check stream {stream_id}: {e}");
                    return;
                }
            }

            let message = StreamMessage {
                id: Uuid::new_v4().to_string(),
                stream_id: stream_id.to_string(),
                sender_id: user.id.clone(),
                content: content.clone(),
                created_at: Utc::now(),
            };
            if let Err(e) = state.store.create_stream_message(&message) {
                warn!("failed to persist stream message: {e}");
                return;
            }

            state
                .relay
                .broadcast(
                    stream_room,
                    &RelayEvent::Chat {
                        stream_id: stream_id.to_string(),
                        message_id: message.id,
                        sender_id: message.sender_id,
                        username: user.username.clone(),
                        content: message.content,
                        sent_at: message.created_at,
                    },
                )
                .await;
        }
        ClientEvent::TypingStart => {
            state
                .relay
                .broadcast(
                    stream_room,
                    &RelayEvent::TypingStart {
                        stream_id: stream_id.to_string(),
                        user_id: user.id.clone(),
                        username: user.username.clone(),
                    },
                )
                .await;
        }
        ClientEvent::TypingStop => {
            state
                .relay
                .broadcast(
                    stream_room,
                    &RelayEvent::TypingStop {
                        stream_id: stream_id.to_string(),
                        user_id: user.id.clone(),
                        username: user.username.clone(),
                    },
                )
                .await;
        }
    }
}
