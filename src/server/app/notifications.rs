use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};

use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::{MarkAllReadResponse, PaginationParams, UnreadCountResponse};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreResultExt, paginate,
};

pub async fn list_notifications(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let cursor = params.cursor.as_deref().unwrap_or("");

    let notifications = state
        .store
        .list_notifications(&auth.user.id, cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list notifications")?;

    let (notifications, next_cursor, has_more) =
        paginate(notifications, DEFAULT_PAGE_SIZE as usize, |n| {
            format!("{},{}", n.created_at.to_rfc3339(), n.id)
        });

    Ok::<_, ApiError>(Json(PaginatedResponse::new(
        notifications,
        next_cursor,
        has_more,
    )))
}

pub async fn unread_count(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let count = state
        .store
        .count_unread_notifications(&auth.user.id)
        .api_err("Failed to count notifications")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(UnreadCountResponse { count })))
}

pub async fn mark_read(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let marked = state
        .store
        .mark_notification_read(&id, &auth.user.id)
        .api_err("Failed to mark notification")?;

    if !marked {
        return Err(ApiError::not_found("Notification not found"));
    }

    Ok::<_, ApiError>(Json(ApiResponse::success(())))
}

pub async fn mark_all_read(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let marked = state
        .store
        .mark_all_notifications_read(&auth.user.id)
        .api_err("Failed to mark notifications")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(MarkAllReadResponse { marked })))
}
