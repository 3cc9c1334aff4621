//! HTTP API module.
//!
//! Serves the execution and terminal sockets plus a health check.

mod error;
pub mod handlers;
pub mod proxy;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::create_router;
pub use state::AppState;
