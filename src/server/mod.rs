mod admin;
mod app;
pub mod dto;
pub mod response;
mod router;
mod sockets;
pub mod validation;

pub use admin::admin_router;
pub use app::app_router;
pub use router::{AppState, create_router};
