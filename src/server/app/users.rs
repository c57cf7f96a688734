use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;

use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::{ProfileResponse, UpdateProfileRequest};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};

const MAX_DISPLAY_NAME_LEN: usize = 64;
const MAX_BIO_LEN: usize = 500;

pub async fn get_me(auth: RequireUser, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let loops_count = state
        .store
        .count_user_loops(&auth.user.id)
        .api_err("Failed to count loops")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(ProfileResponse {
        user: auth.user,
        loops_count,
    })))
}

pub async fn update_me(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateProfileRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let mut user = auth.user;

    if let Some(display_name) = req.display_name {
        if display_name.len() > MAX_DISPLAY_NAME_LEN {
            return Err(ApiError::bad_request(format!(
                "Display name cannot exceed {MAX_DISPLAY_NAME_LEN} characters"
            )));
        }
        user.display_name = if display_name.is_empty() {
            None
        } else {
            Some(display_name)
        };
    }
    if let Some(bio) = req.bio {
        if bio.len() > MAX_BIO_LEN {
            return Err(ApiError::bad_request(format!(
                "Bio cannot exceed {MAX_BIO_LEN} characters"
            )));
        }
        user.bio = if bio.is_empty() { None } else { Some(bio) };
    }
    if let Some(avatar_media_id) = req.avatar_media_id {
        let media = store
            .get_media_object(&avatar_media_id)
            .api_err("Failed to get media")?
            .or_not_found("Media not found")?;
        if media.owner_id != user.id {
            return Err(ApiError::forbidden("Media belongs to another user"));
        }
        user.avatar_media_id = Some(avatar_media_id);
    }
    user.updated_at = Utc::now();

    store.update_user(&user).map_err(ApiError::from)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(user)))
}

pub async fn get_user(
    _auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let user = store
        .get_user(&id)
        .api_err("Failed to get user")?
        .or_not_found("User not found")?;

    let loops_count = store
        .count_user_loops(&user.id)
        .api_err("Failed to count loops")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(ProfileResponse {
        user,
        loops_count,
    })))
}
