use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::auth::{RequireAdmin, TokenGenerator};
use crate::server::AppState;
use crate::server::dto::{
    CreateTokenResponse, CreateUserRequest, CreateUserTokenRequest, GrantCoinsRequest,
    PaginationParams, WalletResponse,
};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, paginate,
};
use crate::server::validation::validate_username;
use crate::types::{Token, User};

use super::tokens::token_to_response;

pub async fn create_user(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> impl IntoResponse {
    validate_username(&req.username).map_err(ApiError::bad_request)?;

    let existing = state
        .store
        .get_user_by_username(&req.username)
        .map_err(|_| ApiError::internal("Failed to check username"))?;
    if existing.is_some() {
        return Err(ApiError::conflict("Username already taken"));
    }

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4().to_string(),
        username: req.username,
        display_name: req.display_name,
        bio: req.bio,
        avatar_media_id: None,
        coins: 0,
        earnings: 0,
        created_at: now,
        updated_at: now,
    };

    state
        .store
        .create_user(&user)
        .map_err(|_| ApiError::internal("Failed to create user"))?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(user))))
}

pub async fn list_users(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let cursor = params.cursor.as_deref().unwrap_or("");

    let users = state
        .store
        .list_users(cursor, DEFAULT_PAGE_SIZE + 1)
        .map_err(|_| ApiError::internal("Failed to list users"))?;

    let (users, next_cursor, has_more) =
        paginate(users, DEFAULT_PAGE_SIZE as usize, |u| u.username.clone());

    Ok::<_, ApiError>(Json(PaginatedResponse::new(users, next_cursor, has_more)))
}

pub async fn get_user(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let user = state
        .store
        .get_user(&id)
        .map_err(|_| ApiError::internal("Failed to get user"))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok::<_, ApiError>(Json(ApiResponse::success(user)))
}

pub async fn delete_user(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let user = state
        .store
        .get_user(&id)
        .map_err(|_| ApiError::internal("Failed to get user"))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    state
        .store
        .delete_user(&user.id)
        .map_err(|_| ApiError::internal("Failed to delete user"))?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn list_user_tokens(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let user = state
        .store
        .get_user(&id)
        .map_err(|_| ApiError::internal("Failed to get user"))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let tokens = state
        .store
        .list_user_tokens(&user.id)
        .map_err(|_| ApiError::internal("Failed to list user tokens"))?;

    let responses: Vec<_> = tokens.into_iter().map(token_to_response).collect();

    Ok::<_, ApiError>(Json(ApiResponse::success(responses)))
}

pub async fn create_user_token(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CreateUserTokenRequest>,
) -> impl IntoResponse {
    let user = state
        .store
        .get_user(&id)
        .map_err(|_| ApiError::internal("Failed to get user"))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if let Some(seconds) = req.expires_in_seconds {
        if seconds < 0 {
            return Err(ApiError::bad_request(
                "expires_in_seconds cannot be negative",
            ));
        }
    }

    let expires_at = req
        .expires_in_seconds
        .map(|s| Utc::now() + Duration::seconds(s));

    let generator = TokenGenerator::new();

    const MAX_RETRIES: u32 = 3;
    for _ in 0..MAX_RETRIES {
        let (raw_token, lookup, hash) = generator
            .generate()
            .map_err(|_| ApiError::internal("Failed to generate token"))?;

        let now = Utc::now();
        let token = Token {
            id: Uuid::new_v4().to_string(),
            token_hash: hash,
            token_lookup: lookup,
            is_admin: false,
            user_id: Some(user.id.clone()),
            created_at: now,
            expires_at,
            last_used_at: None,
        };

        match state.store.create_token(&token) {
            Ok(()) => {
                return Ok((
                    StatusCode::CREATED,
                    Json(ApiResponse::success(CreateTokenResponse {
                        token: raw_token,
                        metadata: token_to_response(token),
                    })),
                ));
            }
            Err(crate::error::Error::TokenLookupCollision) => continue,
            Err(_) => return Err(ApiError::internal("Failed to create token")),
        }
    }

    Err(ApiError::internal("Failed to create token after retries"))
}

/// POST /admin/users/{id}/coins
///
/// Coins enter the economy here and only here; gifts and purchases just
/// move them around.
pub async fn grant_coins(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<GrantCoinsRequest>,
) -> impl IntoResponse {
    if req.coins <= 0 {
        return Err(ApiError::bad_request("Grant must be a positive amount"));
    }

    let user = state
        .store
        .get_user(&id)
        .map_err(|_| ApiError::internal("Failed to get user"))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let coins = state
        .store
        .grant_coins(&user.id, req.coins)
        .map_err(ApiError::from)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(WalletResponse {
        coins,
        earnings: user.earnings,
    })))
}
