mod helpers;
mod middleware;
mod token;

pub use helpers::{validate_token, validate_ws_token};
pub use middleware::{RequireAdmin, RequireAuth, RequireUser};
pub use token::{TokenGenerator, parse_token};
