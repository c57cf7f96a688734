mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

/// Views by the same user against the same loop within this window count once.
pub const VIEW_DEDUP_SECS: i64 = 3600;

/// Optional filters for the main feed read. All default to "no filter".
#[derive(Debug, Clone, Default)]
pub struct LoopFilter {
    pub author_id: Option<String>,
    pub circle_id: Option<String>,
    pub category: Option<String>,
    pub hashtag: Option<String>,
}

/// Result of applying an interaction: whether it is now active (for toggles,
/// the post-toggle state; for views, whether this one counted) and the
/// current counter value. A like that lands on someone else's loop also
/// yields the notification inserted for the author.
#[derive(Debug, Clone)]
pub struct InteractionOutcome {
    pub kind: InteractionKind,
    pub active: bool,
    pub count: i64,
    pub notification: Option<Notification>,
}

/// Store defines the database interface.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // User operations
    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, id: &str) -> Result<Option<User>>;
    fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
    fn list_users(&self, cursor: &str, limit: i32) -> Result<Vec<User>>;
    /// Writes profile fields only; balances move via the wallet operations.
    fn update_user(&self, user: &User) -> Result<()>;
    fn delete_user(&self, id: &str) -> Result<bool>;
    fn grant_coins(&self, user_id: &str, coins: i64) -> Result<i64>;
    fn count_user_loops(&self, user_id: &str) -> Result<i64>;

    // Token operations
    fn create_token(&self, token: &Token) -> Result<()>;
    fn get_token_by_id(&self, id: &str) -> Result<Option<Token>>;
    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>>;
    fn list_tokens(&self, cursor: &str, limit: i32) -> Result<Vec<Token>>;
    fn list_user_tokens(&self, user_id: &str) -> Result<Vec<Token>>;
    fn delete_token(&self, id: &str) -> Result<bool>;
    fn update_token_last_used(&self, id: &str) -> Result<()>;
    fn has_admin_token(&self) -> Result<bool>;

    // Loop operations. Creation runs as one transaction: loop row, zeroed
    // stats, hashtags, and when branching, the parent counter updates plus
    // the branch notification (returned so the caller can relay it).
    fn create_loop(&self, loop_: &Loop, hashtags: &[String]) -> Result<Option<Notification>>;
    fn get_loop(&self, id: &str) -> Result<Option<Loop>>;
    fn get_loop_with_stats(&self, id: &str, viewer_id: &str) -> Result<Option<LoopWithStats>>;
    fn list_loops(
        &self,
        filter: &LoopFilter,
        viewer_id: &str,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<LoopWithStats>>;
    fn list_branches(
        &self,
        parent_id: &str,
        viewer_id: &str,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<LoopWithStats>>;
    fn get_loop_tree(
        &self,
        root_id: &str,
        viewer_id: &str,
        max_depth: i32,
    ) -> Result<Vec<LoopTreeNode>>;
    fn list_saved_loops(
        &self,
        user_id: &str,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<LoopWithStats>>;
    fn update_loop(&self, loop_: &Loop) -> Result<()>;
    /// Removes the subtree rooted at `id` and repairs ancestor counters.
    fn delete_loop(&self, id: &str) -> Result<bool>;

    // Interactions
    fn apply_interaction(
        &self,
        loop_id: &str,
        user_id: &str,
        kind: InteractionKind,
    ) -> Result<InteractionOutcome>;

    // Circle operations. Creation also enrolls the owner as a member.
    fn create_circle(&self, circle: &Circle) -> Result<()>;
    fn get_circle(&self, id: &str) -> Result<Option<Circle>>;
    fn get_circle_by_name(&self, name: &str) -> Result<Option<Circle>>;
    fn list_circles(&self, cursor: &str, limit: i32) -> Result<Vec<Circle>>;
    fn list_user_circles(&self, user_id: &str) -> Result<Vec<Circle>>;
    fn update_circle(&self, circle: &Circle) -> Result<()>;
    fn delete_circle(&self, id: &str) -> Result<bool>;

    // Membership operations
    fn add_circle_member(&self, circle_id: &str, user_id: &str, role: CircleRole) -> Result<()>;
    fn get_circle_member(&self, circle_id: &str, user_id: &str) -> Result<Option<CircleMember>>;
    fn list_circle_members(
        &self,
        circle_id: &str,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<CircleMemberWithName>>;
    fn update_member_role(&self, circle_id: &str, user_id: &str, role: CircleRole) -> Result<()>;
    fn remove_circle_member(&self, circle_id: &str, user_id: &str) -> Result<bool>;

    // Event operations. Creation notifies the circle's other members in
    // the same transaction; registration checks capacity and registers in
    // one transaction, returning the new attendee count.
    fn create_event(&self, event: &CircleEvent) -> Result<Vec<Notification>>;
    fn get_event(&self, id: &str) -> Result<Option<CircleEvent>>;
    fn list_circle_events(&self, circle_id: &str) -> Result<Vec<CircleEvent>>;
    fn register_attendee(&self, event_id: &str, user_id: &str) -> Result<i64>;
    fn unregister_attendee(&self, event_id: &str, user_id: &str) -> Result<bool>;
    fn list_event_attendees(&self, event_id: &str) -> Result<Vec<EventAttendee>>;

    // Circle message operations
    fn create_circle_message(&self, msg: &CircleMessage) -> Result<()>;
    fn list_circle_messages(
        &self,
        circle_id: &str,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<CircleMessage>>;

    // Notification operations
    fn create_notification(&self, notification: &Notification) -> Result<()>;
    fn list_notifications(
        &self,
        user_id: &str,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<Notification>>;
    fn count_unread_notifications(&self, user_id: &str) -> Result<i64>;
    fn mark_notification_read(&self, id: &str, user_id: &str) -> Result<bool>;
    fn mark_all_notifications_read(&self, user_id: &str) -> Result<i64>;

    // Stream operations
    fn create_stream(&self, stream: &Stream) -> Result<()>;
    fn get_stream(&self, id: &str) -> Result<Option<Stream>>;
    /// A host runs at most one live stream at a time.
    fn get_live_stream_by_host(&self, host_id: &str) -> Result<Option<Stream>>;
    fn list_live_streams(&self, cursor: &str, limit: i32) -> Result<Vec<Stream>>;
    fn end_stream(&self, id: &str) -> Result<bool>;
    fn create_stream_message(&self, msg: &StreamMessage) -> Result<()>;
    fn list_stream_messages(
        &self,
        stream_id: &str,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<StreamMessage>>;

    // Gift operations. Transfer debits the sender, records the gift, and
    // credits the recipient's earnings atomically, returning the
    // notification inserted for the recipient.
    fn transfer_gift(&self, gift: &Gift) -> Result<Notification>;
    fn list_gifts_sent(&self, user_id: &str, cursor: &str, limit: i32) -> Result<Vec<Gift>>;
    fn list_gifts_received(&self, user_id: &str, cursor: &str, limit: i32) -> Result<Vec<Gift>>;

    // Shop operations. Purchase debits and records atomically, returning
    // the remaining balance.
    fn create_shop_item(&self, item: &ShopItem) -> Result<()>;
    fn get_shop_item(&self, id: &str) -> Result<Option<ShopItem>>;
    fn list_shop_items(&self, cursor: &str, limit: i32) -> Result<Vec<ShopItem>>;
    fn update_shop_item(&self, item: &ShopItem) -> Result<()>;
    fn delete_shop_item(&self, id: &str) -> Result<bool>;
    fn purchase_item(&self, purchase: &Purchase) -> Result<i64>;
    fn list_user_purchases(&self, user_id: &str) -> Result<Vec<Purchase>>;

    // Media object operations
    fn create_media_object(&self, obj: &MediaObject) -> Result<()>;
    fn get_media_object(&self, id: &str) -> Result<Option<MediaObject>>;
    fn get_media_by_oid(&self, owner_id: &str, oid: &str) -> Result<Option<MediaObject>>;
    fn delete_media_object(&self, id: &str) -> Result<bool>;
    /// Rows across all owners that still point at this blob.
    fn count_media_refs(&self, oid: &str) -> Result<i64>;

    fn close(&self) -> Result<()>;
}
