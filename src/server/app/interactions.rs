use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::auth::RequireUser;
use crate::relay::{RelayEvent, Room};
use crate::server::AppState;
use crate::server::dto::InteractionResponse;
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::types::InteractionKind;

use super::access::require_loop_visible;

/// POST /loops/{id}/interactions/{kind}
///
/// Likes and saves toggle; shares and views append. The store resolves
/// concurrent calls, so two racing likes settle as one like.
pub async fn apply(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((id, kind)): Path<(String, String)>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let kind = InteractionKind::parse(&kind)
        .map_err(|_| ApiError::bad_request(format!("Unknown interaction kind: {kind}")))?;

    let loop_ = store
        .get_loop(&id)
        .api_err("Failed to get loop")?
        .or_not_found("Loop not found")?;
    require_loop_visible(store, &auth.user, &loop_)?;

    let outcome = store
        .apply_interaction(&id, &auth.user.id, kind)
        .map_err(ApiError::from)?;

    if let Some(notification) = outcome.notification {
        state
            .relay
            .broadcast(
                &Room::user(&notification.user_id),
                &RelayEvent::Notification { notification },
            )
            .await;
    }

    Ok::<_, ApiError>(Json(ApiResponse::success(InteractionResponse {
        kind: outcome.kind.as_str().to_string(),
        active: outcome.active,
        count: outcome.count,
    })))
}
