use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::RequireUser;
use crate::relay::{RelayEvent, Room};
use crate::server::AppState;
use crate::server::dto::{CreateEventRequest, RegisterResponse};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::validation::validate_content;
use crate::store::Store;
use crate::types::{Circle, CircleEvent, CircleRole, User};

use super::access::{require_circle_member, require_circle_role};

const MAX_TITLE_LEN: usize = 200;

/// Loads the event's circle and enforces membership for private ones.
fn load_event_circle(
    store: &dyn Store,
    user: &User,
    event: &CircleEvent,
) -> Result<Circle, ApiError> {
    let circle = store
        .get_circle(&event.circle_id)
        .api_err("Failed to get circle")?
        .or_not_found("Circle not found")?;

    if !circle.public {
        require_circle_member(store, &circle.id, &user.id)?;
    }
    Ok(circle)
}

pub async fn create_event(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CreateEventRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    store
        .get_circle(&id)
        .api_err("Failed to get circle")?
        .or_not_found("Circle not found")?;
    require_circle_role(store, &id, &auth.user.id, CircleRole::Moderator)?;

    validate_content(&req.title, MAX_TITLE_LEN)?;
    if let Some(max) = req.max_participants {
        if max <= 0 {
            return Err(ApiError::bad_request("max_participants must be positive"));
        }
    }

    let event = CircleEvent {
        id: Uuid::new_v4().to_string(),
        circle_id: id,
        title: req.title,
        description: req.description,
        starts_at: req.starts_at,
        max_participants: req.max_participants,
        attendee_count: 0,
        created_by: auth.user.id.clone(),
        created_at: Utc::now(),
    };

    let notifications = store.create_event(&event).map_err(ApiError::from)?;
    for notification in notifications {
        state
            .relay
            .broadcast(
                &Room::user(&notification.user_id),
                &RelayEvent::Notification { notification },
            )
            .await;
    }

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(event))))
}

pub async fn list_events(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let circle = store
        .get_circle(&id)
        .api_err("Failed to get circle")?
        .or_not_found("Circle not found")?;
    if !circle.public {
        require_circle_member(store, &id, &auth.user.id)?;
    }

    let events = store
        .list_circle_events(&id)
        .api_err("Failed to list events")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(events)))
}

pub async fn get_event(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let event = store
        .get_event(&id)
        .api_err("Failed to get event")?
        .or_not_found("Event not found")?;
    load_event_circle(store, &auth.user, &event)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(event)))
}

/// POST /events/{id}/attendees
///
/// Registration is first-come-first-served against the capacity; the
/// store checks and registers in one transaction so a full event never
/// overshoots.
pub async fn register(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let event = store
        .get_event(&id)
        .api_err("Failed to get event")?
        .or_not_found("Event not found")?;
    require_circle_member(store, &event.circle_id, &auth.user.id)?;

    let attendee_count = store
        .register_attendee(&id, &auth.user.id)
        .map_err(ApiError::from)?;

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(RegisterResponse {
            event_id: id,
            attendee_count,
        })),
    ))
}

pub async fn unregister(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    store
        .get_event(&id)
        .api_err("Failed to get event")?
        .or_not_found("Event not found")?;

    let removed = store
        .unregister_attendee(&id, &auth.user.id)
        .map_err(ApiError::from)?;
    if !removed {
        return Err(ApiError::not_found("Not registered for this event"));
    }

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn list_attendees(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let event = store
        .get_event(&id)
        .api_err("Failed to get event")?
        .or_not_found("Event not found")?;
    load_event_circle(store, &auth.user, &event)?;

    let attendees = store
        .list_event_attendees(&id)
        .api_err("Failed to list attendees")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(attendees)))
}
