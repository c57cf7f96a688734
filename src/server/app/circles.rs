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
use crate::server::dto::{
    AddMemberRequest, CreateCircleRequest, PaginationParams, UpdateCircleRequest,
    UpdateMemberRoleRequest,
};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreOptionExt, StoreResultExt,
    paginate,
};
use crate::server::validation::validate_circle_name;
use crate::types::{Circle, CircleRole};

use super::access::{require_circle_member, require_circle_role};

pub async fn create_circle(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCircleRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    validate_circle_name(&req.name)?;

    if store
        .get_circle_by_name(&req.name)
        .api_err("Failed to check circle name")?
        .is_some()
    {
        return Err(ApiError::conflict("Circle name already exists"));
    }

    let now = Utc::now();
    let circle = Circle {
        id: Uuid::new_v4().to_string(),
        name: req.name,
        description: req.description,
        owner_id: auth.user.id.clone(),
        public: req.public,
        member_count: 1,
        created_at: now,
        updated_at: now,
    };

    store.create_circle(&circle).map_err(ApiError::from)?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(circle))))
}

pub async fn list_circles(
    _auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let cursor = params.cursor.as_deref().unwrap_or("");

    let circles = state
        .store
        .list_circles(cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list circles")?;

    let (circles, next_cursor, has_more) =
        paginate(circles, DEFAULT_PAGE_SIZE as usize, |c| c.name.clone());

    Ok::<_, ApiError>(Json(PaginatedResponse::new(circles, next_cursor, has_more)))
}

pub async fn list_my_circles(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let circles = state
        .store
        .list_user_circles(&auth.user.id)
        .api_err("Failed to list circles")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(circles)))
}

pub async fn get_circle(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let circle = store
        .get_circle(&id)
        .api_err("Failed to get circle")?
        .or_not_found("Circle not found")?;

    // Private circles are invisible to outsiders.
    if !circle.public && circle.owner_id != auth.user.id {
        let member = store
            .get_circle_member(&id, &auth.user.id)
            .api_err("Failed to check circle membership")?;
        if member.is_none() {
            return Err(ApiError::not_found("Circle not found"));
        }
    }

    Ok::<_, ApiError>(Json(ApiResponse::success(circle)))
}

pub async fn update_circle(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateCircleRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let mut circle = store
        .get_circle(&id)
        .api_err("Failed to get circle")?
        .or_not_found("Circle not found")?;

    require_circle_role(store, &id, &auth.user.id, CircleRole::Admin)?;

    if let Some(name) = req.name {
        validate_circle_name(&name)?;
        if name != circle.name
            && store
                .get_circle_by_name(&name)
                .api_err("Failed to check circle name")?
                .is_some()
        {
            return Err(ApiError::conflict("Circle name already exists"));
        }
        circle.name = name;
    }
    if let Some(description) = req.description {
        circle.description = Some(description);
    }
    if let Some(public) = req.public {
        circle.public = public;
    }
    circle.updated_at = Utc::now();

    store.update_circle(&circle).map_err(ApiError::from)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(circle)))
}

pub async fn delete_circle(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let circle = store
        .get_circle(&id)
        .api_err("Failed to get circle")?
        .or_not_found("Circle not found")?;

    if circle.owner_id != auth.user.id {
        return Err(ApiError::forbidden("Only the owner can delete a circle"));
    }

    store.delete_circle(&id).map_err(ApiError::from)?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

/// POST /circles/{id}/members
///
/// With no body (or the caller's own id) this is a self-join, which only
/// public circles allow. Moderators and up can add other users; private
/// circles are invite-only.
pub async fn add_member(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AddMemberRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let circle = store
        .get_circle(&id)
        .api_err("Failed to get circle")?
        .or_not_found("Circle not found")?;

    let target_id = req.user_id.as_deref().unwrap_or(&auth.user.id);
    let self_join = target_id == auth.user.id;

    if self_join {
        if !circle.public {
            return Err(ApiError::forbidden("Circle is invite-only"));
        }
    } else {
        require_circle_role(store, &id, &auth.user.id, CircleRole::Moderator)?;
        store
            .get_user(target_id)
            .api_err("Failed to get user")?
            .or_not_found("User not found")?;
    }

    let role = match req.role.as_deref() {
        None => CircleRole::Member,
        Some(raw) => {
            let role = CircleRole::parse(raw).map_err(ApiError::from)?;
            if role != CircleRole::Member {
                require_circle_role(store, &id, &auth.user.id, CircleRole::Owner)?;
            }
            if role == CircleRole::Owner {
                return Err(ApiError::bad_request("Cannot add a second owner"));
            }
            role
        }
    };

    match store.add_circle_member(&id, target_id, role) {
        Ok(()) => {}
        Err(crate::error::Error::AlreadyExists) => {
            return Err(ApiError::conflict("Already a member"));
        }
        Err(e) => return Err(ApiError::from(e)),
    }

    let member = store
        .get_circle_member(&id, target_id)
        .api_err("Failed to read back membership")?
        .or_not_found("Membership not found")?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(member))))
}

pub async fn list_members(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let cursor = params.cursor.as_deref().unwrap_or("");

    let circle = store
        .get_circle(&id)
        .api_err("Failed to get circle")?
        .or_not_found("Circle not found")?;

    if !circle.public {
        require_circle_member(store, &id, &auth.user.id)?;
    }

    let members = store
        .list_circle_members(&id, cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list members")?;

    let (members, next_cursor, has_more) =
        paginate(members, DEFAULT_PAGE_SIZE as usize, |m| {
            m.member.user_id.clone()
        });

    Ok::<_, ApiError>(Json(PaginatedResponse::new(members, next_cursor, has_more)))
}

/// PATCH /circles/{id}/members/{user_id}
///
/// Admins change roles below admin; only the owner grants or revokes
/// admin. The owner's own row never changes here.
pub async fn update_member_role(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((id, user_id)): Path<(String, String)>,
    Json(req): Json<UpdateMemberRoleRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    store
        .get_circle(&id)
        .api_err("Failed to get circle")?
        .or_not_found("Circle not found")?;

    let caller = require_circle_role(store, &id, &auth.user.id, CircleRole::Admin)?;

    let target = store
        .get_circle_member(&id, &user_id)
        .api_err("Failed to get member")?
        .or_not_found("Member not found")?;

    if target.role == CircleRole::Owner {
        return Err(ApiError::forbidden("The owner's role cannot change"));
    }

    let new_role = CircleRole::parse(&req.role).map_err(ApiError::from)?;
    if new_role == CircleRole::Owner {
        return Err(ApiError::bad_request("Ownership cannot be transferred here"));
    }

    let needs_owner = new_role == CircleRole::Admin || target.role == CircleRole::Admin;
    if needs_owner && caller.role != CircleRole::Owner {
        return Err(ApiError::forbidden("Only the owner can change admin roles"));
    }

    store
        .update_member_role(&id, &user_id, new_role)
        .map_err(ApiError::from)?;

    let updated = store
        .get_circle_member(&id, &user_id)
        .api_err("Failed to read back membership")?
        .or_not_found("Member not found")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(updated)))
}

/// DELETE /circles/{id}/members/{user_id}
///
/// Members leave themselves; moderators remove members ranked below
/// them. Owners cannot leave their own circle, they delete it instead.
pub async fn remove_member(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((id, user_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let circle = store
        .get_circle(&id)
        .api_err("Failed to get circle")?
        .or_not_found("Circle not found")?;

    let target = store
        .get_circle_member(&id, &user_id)
        .api_err("Failed to get member")?
        .or_not_found("Member not found")?;

    if user_id == auth.user.id {
        if circle.owner_id == auth.user.id {
            return Err(ApiError::bad_request(
                "The owner cannot leave; delete the circle instead",
            ));
        }
    } else {
        let caller = require_circle_role(store, &id, &auth.user.id, CircleRole::Moderator)?;
        if target.role.at_least(caller.role) {
            return Err(ApiError::forbidden("Cannot remove a member of equal or higher role"));
        }
    }

    store
        .remove_circle_member(&id, &user_id)
        .map_err(ApiError::from)?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
