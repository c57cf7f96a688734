use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::RequireAdmin;
use crate::server::AppState;
use crate::server::dto::{CreateShopItemRequest, UpdateShopItemRequest};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::types::ShopItem;

pub async fn create_item(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateShopItemRequest>,
) -> impl IntoResponse {
    if req.name.is_empty() || req.name.len() > 100 {
        return Err(ApiError::bad_request(
            "Item name must be between 1 and 100 characters",
        ));
    }
    if req.price_coins <= 0 {
        return Err(ApiError::bad_request("Price must be positive"));
    }

    let item = ShopItem {
        id: Uuid::new_v4().to_string(),
        name: req.name,
        description: req.description,
        price_coins: req.price_coins,
        available: req.available,
        created_at: Utc::now(),
    };

    state.store.create_shop_item(&item).map_err(ApiError::from)?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(item))))
}

pub async fn update_item(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateShopItemRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let mut item = store
        .get_shop_item(&id)
        .api_err("Failed to get shop item")?
        .or_not_found("Item not found")?;

    if let Some(name) = req.name {
        if name.is_empty() || name.len() > 100 {
            return Err(ApiError::bad_request(
                "Item name must be between 1 and 100 characters",
            ));
        }
        item.name = name;
    }
    if let Some(description) = req.description {
        item.description = Some(description);
    }
    if let Some(price_coins) = req.price_coins {
        if price_coins <= 0 {
            return Err(ApiError::bad_request("Price must be positive"));
        }
        item.price_coins = price_coins;
    }
    if let Some(available) = req.available {
        item.available = available;
    }

    store.update_shop_item(&item).map_err(ApiError::from)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(item)))
}

pub async fn delete_item(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let removed = state.store.delete_shop_item(&id).map_err(ApiError::from)?;
    if !removed {
        return Err(ApiError::not_found("Item not found"));
    }

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
