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
use crate::server::dto::{CreateLoopRequest, FeedParams, PaginationParams, TreeParams, UpdateLoopRequest};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreOptionExt, StoreResultExt,
    paginate,
};
use crate::server::validation::{MAX_CONTENT_LEN, normalize_hashtag, validate_category, validate_content};
use crate::store::LoopFilter;
use crate::types::{CircleRole, Loop, LoopWithStats};

use super::access::{require_circle_member, require_circle_role, require_loop_visible};

const DEFAULT_TREE_DEPTH: i64 = 3;
const MAX_TREE_DEPTH: i64 = 10;

fn loop_cursor(l: &LoopWithStats) -> String {
    format!("{},{}", l.loop_.created_at.to_rfc3339(), l.loop_.id)
}

pub async fn create_loop(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateLoopRequest>,
) -> impl IntoResponse {
    let user = &auth.user;
    let store = state.store.as_ref();

    validate_content(&req.content_text, MAX_CONTENT_LEN)?;
    if let Some(ref category) = req.category {
        validate_category(category)?;
    }

    let hashtags = req
        .hashtags
        .iter()
        .map(|t| normalize_hashtag(t))
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(ref circle_id) = req.circle_id {
        store
            .get_circle(circle_id)
            .api_err("Failed to get circle")?
            .or_not_found("Circle not found")?;
        require_circle_member(store, circle_id, &user.id)?;
    }

    if let Some(ref parent_id) = req.parent_loop_id {
        let parent = store
            .get_loop(parent_id)
            .api_err("Failed to get parent loop")?
            .or_not_found("Parent loop not found")?;
        require_loop_visible(store, user, &parent)?;
    }

    if let Some(ref media_id) = req.media_id {
        let media = store
            .get_media_object(media_id)
            .api_err("Failed to get media")?
            .or_not_found("Media not found")?;
        if media.owner_id != user.id {
            return Err(ApiError::forbidden("Media belongs to another user"));
        }
    }

    let now = Utc::now();
    let loop_ = Loop {
        id: Uuid::new_v4().to_string(),
        author_id: user.id.clone(),
        circle_id: req.circle_id,
        parent_loop_id: req.parent_loop_id,
        content_text: req.content_text,
        media_id: req.media_id,
        category: req.category,
        public: req.public,
        created_at: now,
        updated_at: now,
    };

    let notification = store.create_loop(&loop_, &hashtags).map_err(ApiError::from)?;

    if loop_.public {
        state
            .relay
            .broadcast(
                &Room::feed(),
                &RelayEvent::NewLoop {
                    loop_id: loop_.id.clone(),
                    author_id: loop_.author_id.clone(),
                    username: user.username.clone(),
                    content_text: loop_.content_text.clone(),
                    parent_loop_id: loop_.parent_loop_id.clone(),
                    circle_id: loop_.circle_id.clone(),
                    category: loop_.category.clone(),
                    created_at: loop_.created_at,
                },
            )
            .await;
    }
    if let Some(notification) = notification {
        state
            .relay
            .broadcast(
                &Room::user(&notification.user_id),
                &RelayEvent::Notification { notification },
            )
            .await;
    }

    let created = store
        .get_loop_with_stats(&loop_.id, &user.id)
        .api_err("Failed to read back loop")?
        .or_not_found("Loop not found")?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

pub async fn get_loop(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let found = store
        .get_loop_with_stats(&id, &auth.user.id)
        .api_err("Failed to get loop")?
        .or_not_found("Loop not found")?;

    require_loop_visible(store, &auth.user, &found.loop_)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(found)))
}

pub async fn feed(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<FeedParams>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let cursor = params.cursor.as_deref().unwrap_or("");

    let filter = LoopFilter {
        author_id: params.author_id,
        circle_id: params.circle_id,
        category: params.category,
        hashtag: params.hashtag,
    };

    let loops = store
        .list_loops(&filter, &auth.user.id, cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list loops")?;

    let (loops, next_cursor, has_more) = paginate(loops, DEFAULT_PAGE_SIZE as usize, loop_cursor);

    Ok::<_, ApiError>(Json(PaginatedResponse::new(loops, next_cursor, has_more)))
}

pub async fn list_branches(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let cursor = params.cursor.as_deref().unwrap_or("");

    let parent = store
        .get_loop(&id)
        .api_err("Failed to get loop")?
        .or_not_found("Loop not found")?;
    require_loop_visible(store, &auth.user, &parent)?;

    let branches = store
        .list_branches(&id, &auth.user.id, cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list branches")?;

    let (branches, next_cursor, has_more) =
        paginate(branches, DEFAULT_PAGE_SIZE as usize, loop_cursor);

    Ok::<_, ApiError>(Json(PaginatedResponse::new(branches, next_cursor, has_more)))
}

pub async fn get_tree(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<TreeParams>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let root = store
        .get_loop(&id)
        .api_err("Failed to get loop")?
        .or_not_found("Loop not found")?;
    require_loop_visible(store, &auth.user, &root)?;

    let depth = params
        .depth
        .unwrap_or(DEFAULT_TREE_DEPTH)
        .clamp(1, MAX_TREE_DEPTH);

    let nodes = store
        .get_loop_tree(&id, &auth.user.id, depth as i32)
        .api_err("Failed to load tree")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(nodes)))
}

pub async fn update_loop(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateLoopRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let mut loop_ = store
        .get_loop(&id)
        .api_err("Failed to get loop")?
        .or_not_found("Loop not found")?;

    if loop_.author_id != auth.user.id {
        return Err(ApiError::forbidden("Only the author can edit a loop"));
    }

    if let Some(content_text) = req.content_text {
        validate_content(&content_text, MAX_CONTENT_LEN)?;
        loop_.content_text = content_text;
    }
    if let Some(category) = req.category {
        validate_category(&category)?;
        loop_.category = Some(category);
    }
    if let Some(public) = req.public {
        loop_.public = public;
    }
    loop_.updated_at = Utc::now();

    store.update_loop(&loop_).map_err(ApiError::from)?;

    let updated = store
        .get_loop_with_stats(&id, &auth.user.id)
        .api_err("Failed to read back loop")?
        .or_not_found("Loop not found")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(updated)))
}

pub async fn delete_loop(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let loop_ = store
        .get_loop(&id)
        .api_err("Failed to get loop")?
        .or_not_found("Loop not found")?;

    // Authors always; circle moderators may remove loops posted in
    // their circle.
    if loop_.author_id != auth.user.id {
        match &loop_.circle_id {
            Some(circle_id) => {
                require_circle_role(store, circle_id, &auth.user.id, CircleRole::Moderator)?;
            }
            None => return Err(ApiError::forbidden("Only the author can delete a loop")),
        }
    }

    store.delete_loop(&id).map_err(ApiError::from)?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn list_saved(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let cursor = params.cursor.as_deref().unwrap_or("");

    let loops = store
        .list_saved_loops(&auth.user.id, cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list saved loops")?;

    let (loops, next_cursor, has_more) = paginate(loops, DEFAULT_PAGE_SIZE as usize, loop_cursor);

    Ok::<_, ApiError>(Json(PaginatedResponse::new(loops, next_cursor, has_more)))
}
