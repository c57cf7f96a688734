mod access;
mod circles;
mod events;
mod interactions;
mod loops;
mod media;
mod messages;
mod notifications;
mod shop;
mod streams;
mod users;
mod wallet;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, patch, post},
};

use crate::server::AppState;

pub fn app_router() -> Router<Arc<AppState>> {
    Router::new()
        // Loops
        .route("/feed", get(loops::feed))
        .route("/loops", post(loops::create_loop))
        .route("/loops/{id}", get(loops::get_loop))
        .route("/loops/{id}", patch(loops::update_loop))
        .route("/loops/{id}", delete(loops::delete_loop))
        .route("/loops/{id}/branches", get(loops::list_branches))
        .route("/loops/{id}/tree", get(loops::get_tree))
        .route("/loops/{id}/interactions/{kind}", post(interactions::apply))
        // Circles
        .route("/circles", get(circles::list_circles))
        .route("/circles", post(circles::create_circle))
        .route("/circles/{id}", get(circles::get_circle))
        .route("/circles/{id}", patch(circles::update_circle))
        .route("/circles/{id}", delete(circles::delete_circle))
        .route("/circles/{id}/members", get(circles::list_members))
        .route("/circles/{id}/members", post(circles::add_member))
        .route(
            "/circles/{id}/members/{user_id}",
            patch(circles::update_member_role),
        )
        .route(
            "/circles/{id}/members/{user_id}",
            delete(circles::remove_member),
        )
        .route("/circles/{id}/events", get(events::list_events))
        .route("/circles/{id}/events", post(events::create_event))
        .route("/circles/{id}/messages", get(messages::list_messages))
        .route("/circles/{id}/messages", post(messages::create_message))
        // Events
        .route("/events/{id}", get(events::get_event))
        .route("/events/{id}/attendees", get(events::list_attendees))
        .route("/events/{id}/attendees", post(events::register))
        .route("/events/{id}/attendees", delete(events::unregister))
        // Notifications
        .route("/notifications", get(notifications::list_notifications))
        .route(
            "/notifications/unread-count",
            get(notifications::unread_count),
        )
        .route("/notifications/{id}/read", post(notifications::mark_read))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        // Streams
        .route("/streams", get(streams::list_live))
        .route("/streams", post(streams::create_stream))
        .route("/streams/{id}", get(streams::get_stream))
        .route("/streams/{id}/end", post(streams::end_stream))
        .route("/streams/{id}/messages", get(streams::list_messages))
        // Gifts and wallet
        .route("/gifts", post(wallet::send_gift))
        .route("/me/wallet", get(wallet::get_wallet))
        .route("/me/gifts/sent", get(wallet::list_sent))
        .route("/me/gifts/received", get(wallet::list_received))
        // Shop
        .route("/shop/items", get(shop::list_items))
        .route("/shop/items/{id}", get(shop::get_item))
        .route("/shop/items/{id}/purchase", post(shop::purchase))
        .route("/me/purchases", get(shop::list_my_purchases))
        // Profiles
        .route("/me", get(users::get_me))
        .route("/me", patch(users::update_me))
        .route("/me/circles", get(circles::list_my_circles))
        .route("/me/saved", get(loops::list_saved))
        .route("/users/{id}", get(users::get_user))
        // Media
        .route("/media", post(media::upload))
        .route("/media/{id}", get(media::download))
        .route("/media/{id}", delete(media::delete))
}
