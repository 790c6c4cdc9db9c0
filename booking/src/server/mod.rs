//! HTTP server module for the booking service.
//!
//! - [`AppState`]: shared handles cloned into every handler
//! - [`build_router`]: every route plus request tracing

pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
