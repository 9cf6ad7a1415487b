//! # feedlink-core
//!
//! Shared configuration and utilities for Feedlink.
//!
//! - **Configuration**: loading, validation, and persistence of the JSON5 config file
//! - **Paths**: resolution of the Feedlink home directory and config file
//! - **Environment**: typed access to `FEEDLINK_*` variables

pub mod config;
pub mod env;
pub mod error;
pub mod paths;

pub use config::Config;
pub use error::{ConfigError, Result};
