//! API module for HTTP endpoints
//!
//! REST handlers, JWT authentication and the shared state they run against.

pub mod auth;
pub mod http;
pub mod rest;
pub mod state;

pub use http::create_router;
pub use state::AppState;
