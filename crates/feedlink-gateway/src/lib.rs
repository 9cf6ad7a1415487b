//! HTTP and WebSocket gateway for Feedlink.
//!
//! This crate provides:
//! - the live-session WebSocket endpoint devices dial into
//! - polling endpoints for devices that cannot hold a connection open
//! - operator endpoints for commands, HTTP proxying, discovery and status

pub mod error;
pub mod handlers;
pub mod server;
pub mod ws;

pub use error::GatewayError;
pub use server::{Gateway, GatewayState};

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
