use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::RequireUser;
use crate::relay::{RelayEvent, Room};
use crate::server::AppState;
use crate::server::dto::{PaginationParams, SendGiftRequest, WalletResponse};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreOptionExt, StoreResultExt,
    paginate,
};
use crate::types::Gift;

pub async fn get_wallet(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let user = state
        .store
        .get_user(&auth.user.id)
        .api_err("Failed to get user")?
        .or_not_found("User not found")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(WalletResponse {
        coins: user.coins,
        earnings: user.earnings,
    })))
}

/// POST /gifts
///
/// Moves coins from the sender's spendable balance into the recipient's
/// earnings. The store runs the transfer as one transaction, so the
/// total value in flight is conserved even under concurrent sends.
pub async fn send_gift(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<SendGiftRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    if req.coins <= 0 {
        return Err(ApiError::bad_request("Gift must carry a positive coin amount"));
    }
    if req.gift_type.is_empty() || req.gift_type.len() > 48 {
        return Err(ApiError::bad_request("Invalid gift type"));
    }
    if req.recipient_id == auth.user.id {
        return Err(ApiError::bad_request("Cannot gift yourself"));
    }

    let recipient = store
        .get_user(&req.recipient_id)
        .api_err("Failed to get recipient")?
        .or_not_found("Recipient not found")?;

    if let Some(ref stream_id) = req.stream_id {
        let stream = store
            .get_stream(stream_id)
            .api_err("Failed to get stream")?
            .or_not_found("Stream not found")?;
        if !stream.live {
            return Err(ApiError::bad_request("Stream has ended"));
        }
    }

    let gift = Gift {
        id: Uuid::new_v4().to_string(),
        sender_id: auth.user.id.clone(),
        recipient_id: recipient.id.clone(),
        stream_id: req.stream_id,
        gift_type: req.gift_type,
        coins: req.coins,
        created_at: Utc::now(),
    };

    let notification = store.transfer_gift(&gift).map_err(ApiError::from)?;

    if let Some(ref stream_id) = gift.stream_id {
        state
            .relay
            .broadcast(
                &Room::stream(stream_id),
                &RelayEvent::Gift {
                    gift_id: gift.id.clone(),
                    stream_id: Some(stream_id.clone()),
                    sender_id: gift.sender_id.clone(),
                    sender_username: auth.user.username.clone(),
                    recipient_id: gift.recipient_id.clone(),
                    gift_type: gift.gift_type.clone(),
                    coins: gift.coins,
                },
            )
            .await;
    }
    state
        .relay
        .broadcast(
            &Room::user(&notification.user_id),
            &RelayEvent::Notification { notification },
        )
        .await;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(gift))))
}

pub async fn list_sent(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let cursor = params.cursor.as_deref().unwrap_or("");

    let gifts = state
        .store
        .list_gifts_sent(&auth.user.id, cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list gifts")?;

    let (gifts, next_cursor, has_more) = paginate(gifts, DEFAULT_PAGE_SIZE as usize, gift_cursor);

    Ok::<_, ApiError>(Json(PaginatedResponse::new(gifts, next_cursor, has_more)))
}

pub async fn list_received(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let cursor = params.cursor.as_deref().unwrap_or("");

    let gifts = state
        .store
        .list_gifts_received(&auth.user.id, cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list gifts")?;

    let (gifts, next_cursor, has_more) = paginate(gifts, DEFAULT_PAGE_SIZE as usize, gift_cursor);

    Ok::<_, ApiError>(Json(PaginatedResponse::new(gifts, next_cursor, has_more)))
}

fn gift_cursor(g: &Gift) -> String {
    format!("{},{}", g.created_at.to_rfc3339(), g.id)
}
