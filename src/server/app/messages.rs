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
use crate::server::AppState;
use crate::server::dto::{CreateMessageRequest, PaginationParams};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreOptionExt, StoreResultExt,
    paginate,
};
use crate::server::validation::{MAX_MESSAGE_LEN, validate_content};
use crate::types::CircleMessage;

use super::access::require_circle_member;

// The message board is member space even in public circles.

pub async fn create_message(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CreateMessageRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    store
        .get_circle(&id)
        .api_err("Failed to get circle")?
        .or_not_found("Circle not found")?;
    require_circle_member(store, &id, &auth.user.id)?;

    validate_content(&req.content, MAX_MESSAGE_LEN)?;

    let message = CircleMessage {
        id: Uuid::new_v4().to_string(),
        circle_id: id,
        sender_id: auth.user.id.clone(),
        content: req.content,
        created_at: Utc::now(),
    };

    store.create_circle_message(&message).map_err(ApiError::from)?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(message))))
}

pub async fn list_messages(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let cursor = params.cursor.as_deref().unwrap_or("");

    store
        .get_circle(&id)
        .api_err("Failed to get circle")?
        .or_not_found("Circle not found")?;
    require_circle_member(store, &id, &auth.user.id)?;

    let messages = store
        .list_circle_messages(&id, cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list messages")?;

    let (messages, next_cursor, has_more) =
        paginate(messages, DEFAULT_PAGE_SIZE as usize, |m| {
            format!("{},{}", m.created_at.to_rfc3339(), m.id)
        });

    Ok::<_, ApiError>(Json(PaginatedResponse::new(messages, next_cursor, has_more)))
}
