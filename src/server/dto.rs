use serde::{Deserialize, Serialize};

use crate::types::{Purchase, Stream, User};

#[derive(Debug, Deserialize)]
pub struct CreateLoopRequest {
    pub content_text: String,
    #[serde(default)]
    pub media_id: Option<String>,
    #[serde(default)]
    pub circle_id: Option<String>,
    #[serde(default)]
    pub parent_loop_id: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_true")]
    pub public: bool,
    #[serde(default)]
    pub hashtags: Vec<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct UpdateLoopRequest {
    #[serde(default)]
    pub content_text: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub public: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FeedParams {
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub circle_id: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub hashtag: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaginationParams {
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TreeParams {
    #[serde(default)]
    pub depth: Option<i64>,
}

/// Result of toggling or recording an interaction. `active` reports the
/// state after the call; `count` is the post-update public counter.
#[derive(Debug, Serialize)]
pub struct InteractionResponse {
    pub kind: String,
    pub active: bool,
    pub count: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateCircleRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub public: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCircleRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub public: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AddMemberRequest {
    /// Defaults to the caller when omitted (self-join).
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemberRoleRequest {
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub starts_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub max_participants: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub event_id: String,
    pub attendee_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateStreamRequest {
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
}

/// Stream joined with its live audience size from the relay.
#[derive(Debug, Serialize)]
pub struct StreamResponse {
    #[serde(flatten)]
    pub stream: Stream,
    pub viewer_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct SendGiftRequest {
    pub recipient_id: String,
    pub gift_type: String,
    pub coins: i64,
    #[serde(default)]
    pub stream_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub coins: i64,
    pub earnings: i64,
}

#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    pub purchase: Purchase,
    pub remaining_coins: i64,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkAllReadResponse {
    pub marked: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_media_id: Option<String>,
}

/// Public profile view: the user row plus their visible loop count.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub user: User,
    pub loops_count: i64,
}

// Admin surface.

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateUserTokenRequest {
    #[serde(default)]
    pub expires_in_seconds: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct GrantCoinsRequest {
    pub coins: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateShopItemRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price_coins: i64,
    #[serde(default = "default_true")]
    pub available: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateShopItemRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price_coins: Option<i64>,
    #[serde(default)]
    pub available: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub id: String,
    pub is_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Serialize)]
pub struct CreateTokenResponse {
    pub token: String,
    pub metadata: TokenResponse,
}
