//! HTTP API module.
//!
//! The axum server, its request/response types, and the import log stream.

pub mod logs;
pub mod server;
pub mod types;

pub use logs::*;
pub use server::{router, spawn_scheduler, start_server, AppState};
pub use types::*;
