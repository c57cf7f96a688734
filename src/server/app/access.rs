use crate::server::response::{ApiError, StoreResultExt};
use crate::store::Store;
use crate::types::{CircleMember, CircleRole, Loop, User};

/// Returns true if the viewer may see this loop. Public loops are open to
/// everyone; non-public ones to the author and, when the loop lives in a
/// circle, to that circle's members. Mirrors the clause used by the feed
/// queries so list and single reads agree.
pub fn check_loop_visible(store: &dyn Store, user: &User, loop_: &Loop) -> Result<bool, ApiError> {
    if loop_.public || loop_.author_id == user.id {
        return Ok(true);
    }

    match &loop_.circle_id {
        Some(circle_id) => {
            let member = store
                .get_circle_member(circle_id, &user.id)
                .api_err("Failed to check circle membership")?;
            Ok(member.is_some())
        }
        None => Ok(false),
    }
}

pub fn require_loop_visible(store: &dyn Store, user: &User, loop_: &Loop) -> Result<(), ApiError> {
    if !check_loop_visible(store, user, loop_)? {
        return Err(ApiError::not_found("Loop not found"));
    }
    Ok(())
}

/// Fetches the caller's membership row, requiring at least `required`.
pub fn require_circle_role(
    store: &dyn Store,
    circle_id: &str,
    user_id: &str,
    required: CircleRole,
) -> Result<CircleMember, ApiError> {
    let member = store
        .get_circle_member(circle_id, user_id)
        .api_err("Failed to check circle membership")?
        .ok_or_else(|| ApiError::forbidden("Not a member of this circle"))?;

    if !member.role.at_least(required) {
        return Err(ApiError::forbidden("Insufficient circle role"));
    }
    Ok(member)
}

pub fn require_circle_member(
    store: &dyn Store,
    circle_id: &str,
    user_id: &str,
) -> Result<CircleMember, ApiError> {
    require_circle_role(store, circle_id, user_id, CircleRole::Member)
}
