mod interaction;
mod models;
mod role;

pub use interaction::{InteractionKind, NotificationKind};
pub use models::{
    Circle, CircleEvent, CircleMember, CircleMemberWithName, CircleMessage, EventAttendee, Gift,
    Loop, LoopStats, LoopTreeNode, LoopWithStats, MediaObject, Notification, Purchase, ShopItem,
    Stream, StreamMessage, Token, User,
};
pub use role::CircleRole;
