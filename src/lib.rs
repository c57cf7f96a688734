//! # Loopd
//!
//! A social looping server, usable both as a standalone binary and as a
//! library. Loops are short posts that branch into trees; circles group
//! people, streams go live, and coins move through gifts and the shop.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! loopd = { version = "0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::path::PathBuf;
//! use loopd::relay::RelayRegistry;
//! use loopd::server::{AppState, create_router};
//! use loopd::store::SqliteStore;
//!
//! let store = SqliteStore::new("./data/loop.db").unwrap();
//! store.initialize().unwrap();
//!
//! let state = Arc::new(AppState {
//!     store: Arc::new(store),
//!     relay: RelayRegistry::new(),
//!     data_dir: PathBuf::from("./data"),
//! });
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Includes the binary's CLI. Disable with `default-features = false`.

pub mod auth;
pub mod config;
pub mod error;
pub mod media;
pub mod relay;
pub mod server;
pub mod store;
pub mod types;
