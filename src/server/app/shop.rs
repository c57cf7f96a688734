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
use crate::server::dto::{PaginationParams, PurchaseResponse};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreOptionExt, StoreResultExt,
    paginate,
};
use crate::types::Purchase;

pub async fn list_items(
    _auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let cursor = params.cursor.as_deref().unwrap_or("");

    let items = state
        .store
        .list_shop_items(cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list shop items")?;

    let (items, next_cursor, has_more) =
        paginate(items, DEFAULT_PAGE_SIZE as usize, |i| i.id.clone());

    Ok::<_, ApiError>(Json(PaginatedResponse::new(items, next_cursor, has_more)))
}

pub async fn get_item(
    _auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let item = state
        .store
        .get_shop_item(&id)
        .api_err("Failed to get shop item")?
        .or_not_found("Item not found")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(item)))
}

/// POST /shop/items/{id}/purchase
///
/// The price recorded is the price at purchase time; later item edits
/// do not rewrite history.
pub async fn purchase(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let item = store
        .get_shop_item(&id)
        .api_err("Failed to get shop item")?
        .or_not_found("Item not found")?;

    let purchase = Purchase {
        id: Uuid::new_v4().to_string(),
        user_id: auth.user.id.clone(),
        item_id: item.id.clone(),
        price_coins: item.price_coins,
        created_at: Utc::now(),
    };

    let remaining_coins = store.purchase_item(&purchase).map_err(ApiError::from)?;

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(PurchaseResponse {
            purchase,
            remaining_coins,
        })),
    ))
}

pub async fn list_my_purchases(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let purchases = state
        .store
        .list_user_purchases(&auth.user.id)
        .api_err("Failed to list purchases")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(purchases)))
}
