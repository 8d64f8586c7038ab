//! svctime-daemon - HTTP and WebSocket front end for the service tree.
//!
//! # Modules
//!
//! - [`api`]: routing and the per-generation request dispatchers
//! - [`auth`]: Basic credential extraction
//! - [`error`]: request error taxonomy and its JSON responses
//! - [`session`]: WebSocket tracking sessions
//! - [`state`]: state shared by all handlers
//!
//! The binary wires these to a TCP listener; tests drive [`api::router`]
//! directly.

pub mod api;
pub mod auth;
pub mod error;
pub mod session;
pub mod state;

pub use api::router;
pub use error::ApiError;
pub use state::AppState;
