//! Axum integration for the Boxoffice booking core.
//!
//! This crate holds the HTTP plumbing that is independent of booking logic:
//!
//! - [`AppError`]: domain errors rendered as JSON with a stable `code`
//! - [`CallerId`] / [`CorrelationId`]: request-scoped identity extractors
//! - [`handlers::health_check`]: liveness endpoint
//!
//! # Request Flow
//!
//! 1. **HTTP Request** arrives at an Axum handler
//! 2. **Extract** caller identity and JSON body
//! 3. **Call** the booking orchestrator
//! 4. **Map** the result (or domain error) to an HTTP response

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;

// Re-export key types for convenience
pub use error::{AppError, ErrorBody};
pub use extractors::{CALLER_HEADER, CORRELATION_ID_HEADER, CallerId, CorrelationId};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
