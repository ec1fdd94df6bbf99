//! HTTP Inbound Adapter
//!
//! Axum-based HTTP server that drives the application layer.

mod errors;
mod handlers;
mod server;

pub use errors::{ApiError, ErrorPolicy, sanitize_message, status_for};
pub use server::{CORRELATION_ID_HEADER, HttpServer, shutdown_signal};
