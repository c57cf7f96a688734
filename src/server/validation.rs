use crate::server::response::ApiError;

const MAX_USERNAME_LEN: usize = 32;
const MAX_CIRCLE_NAME_LEN: usize = 64;
const MAX_HASHTAG_LEN: usize = 64;
const MAX_CATEGORY_LEN: usize = 48;
pub const MAX_CONTENT_LEN: usize = 5000;
pub const MAX_MESSAGE_LEN: usize = 2000;

fn is_valid_name_char(c: char, allow_period: bool) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || (allow_period && c == '.')
}

fn validate_name(
    name: &str,
    entity: &str,
    max_len: usize,
    allow_period: bool,
    forbid_leading_special: bool,
) -> Result<(), String> {
    if name.is_empty() {
        return Err(format!("{entity} name cannot be empty"));
    }
    if name.len() > max_len {
        return Err(format!("{entity} name cannot exceed {max_len} characters"));
    }
    if !name.chars().all(|c| is_valid_name_char(c, allow_period)) {
        let mut allowed = "alphanumeric characters, hyphens, and underscores".to_string();
        if allow_period {
            allowed.push_str(", and periods");
        }
        return Err(format!("{entity} name can only contain {allowed}"));
    }
    if forbid_leading_special && (name.starts_with('-') || name.starts_with('_')) {
        return Err(format!(
            "{entity} name cannot start with a hyphen or underscore"
        ));
    }
    Ok(())
}

pub fn validate_username(name: &str) -> Result<(), String> {
    validate_name(name, "User", MAX_USERNAME_LEN, false, true)
}

pub fn validate_circle_name(name: &str) -> Result<(), ApiError> {
    validate_name(name, "Circle", MAX_CIRCLE_NAME_LEN, true, false).map_err(ApiError::bad_request)
}

/// Loop bodies and stream titles share the same cap.
pub fn validate_content(text: &str, max_len: usize) -> Result<(), ApiError> {
    if text.trim().is_empty() {
        return Err(ApiError::bad_request("Content cannot be empty"));
    }
    if text.len() > max_len {
        return Err(ApiError::bad_request(format!(
            "Content cannot exceed {max_len} characters"
        )));
    }
    Ok(())
}

/// Hashtags are stored without the leading '#'; strip it here if present.
pub fn normalize_hashtag(tag: &str) -> Result<String, ApiError> {
    let tag = tag.trim_start_matches('#').to_lowercase();
    if tag.is_empty() {
        return Err(ApiError::bad_request("Hashtag cannot be empty"));
    }
    if tag.len() > MAX_HASHTAG_LEN {
        return Err(ApiError::bad_request(format!(
            "Hashtag cannot exceed {MAX_HASHTAG_LEN} characters"
        )));
    }
    if !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ApiError::bad_request(
            "Hashtag can only contain alphanumeric characters and underscores",
        ));
    }
    Ok(tag)
}

pub fn validate_category(category: &str) -> Result<(), ApiError> {
    if category.is_empty() || category.len() > MAX_CATEGORY_LEN {
        return Err(ApiError::bad_request(format!(
            "Category must be between 1 and {MAX_CATEGORY_LEN} characters"
        )));
    }
    Ok(())
}
