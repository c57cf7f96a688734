use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::RequireUser;
use crate::relay::{RelayEvent, Room};
use crate::server::AppState;
use crate::server::dto::{CreateStreamRequest, PaginationParams, StreamResponse};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreOptionExt, StoreResultExt,
    paginate,
};
use crate::server::validation::{validate_category, validate_content};
use crate::types::Stream;

const MAX_TITLE_LEN: usize = 200;

pub async fn create_stream(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateStreamRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    validate_content(&req.title, MAX_TITLE_LEN)?;
    if let Some(ref category) = req.category {
        validate_category(category)?;
    }

    if store
        .get_live_stream_by_host(&auth.user.id)
        .api_err("Failed to check live streams")?
        .is_some()
    {
        return Err(ApiError::conflict("Already hosting a live stream"));
    }

    let stream = Stream {
        id: Uuid::new_v4().to_string(),
        host_id: auth.user.id.clone(),
        title: req.title,
        category: req.category,
        live: true,
        started_at: Utc::now(),
        ended_at: None,
    };

    store.create_stream(&stream).map_err(ApiError::from)?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(stream))))
}

pub async fn list_live(
    _auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let cursor = params.cursor.as_deref().unwrap_or("");

    let streams = state
        .store
        .list_live_streams(cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list streams")?;

    let (streams, next_cursor, has_more) =
        paginate(streams, DEFAULT_PAGE_SIZE as usize, |s| {
            format!("{},{}", s.started_at.to_rfc3339(), s.id)
        });

    let mut responses = Vec::with_capacity(streams.len());
    for stream in streams {
        let viewer_count = state.relay.subscriber_count(&Room::stream(&stream.id)).await;
        responses.push(StreamResponse {
            stream,
            viewer_count,
        });
    }

    Ok::<_, ApiError>(Json(PaginatedResponse::new(
        responses,
        next_cursor,
        has_more,
    )))
}

pub async fn get_stream(
    _auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let stream = state
        .store
        .get_stream(&id)
        .api_err("Failed to get stream")?
        .or_not_found("Stream not found")?;

    let viewer_count = state.relay.subscriber_count(&Room::stream(&stream.id)).await;

    Ok::<_, ApiError>(Json(ApiResponse::success(StreamResponse {
        stream,
        viewer_count,
    })))
}

/// POST /streams/{id}/end
///
/// Ends the broadcast and tells the room. Chat sockets stay open until
/// clients hang up, but the stream no longer accepts messages.
pub async fn end_stream(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let stream = store
        .get_stream(&id)
        .api_err("Failed to get stream")?
        .or_not_found("Stream not found")?;

    if stream.host_id != auth.user.id {
        return Err(ApiError::forbidden("Only the host can end a stream"));
    }

    let ended = store.end_stream(&id).map_err(ApiError::from)?;
    if !ended {
        return Err(ApiError::conflict("Stream already ended"));
    }

    state
        .relay
        .broadcast(
            &Room::stream(&id),
            &RelayEvent::StreamEnded {
                stream_id: id.clone(),
            },
        )
        .await;

    let stream = store
        .get_stream(&id)
        .api_err("Failed to read back stream")?
        .or_not_found("Stream not found")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(stream)))
}

pub async fn list_messages(
    _auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let cursor = params.cursor.as_deref().unwrap_or("");

    store
        .get_stream(&id)
        .api_err("Failed to get stream")?
        .or_not_found("Stream not found")?;

    let messages = store
        .list_stream_messages(&id, cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list messages")?;

    let (messages, next_cursor, has_more) =
        paginate(messages, DEFAULT_PAGE_SIZE as usize, |m| {
            format!("{},{}", m.created_at.to_rfc3339(), m.id)
        });

    Ok::<_, ApiError>(Json(PaginatedResponse::new(messages, next_cursor, has_more)))
}
