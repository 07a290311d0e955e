//! # Ferry Common Library
//!
//! Shared code for the Ferry conversion services:
//! - Destination database initialization and settings access
//! - Request authentication primitives (shared secret, timestamp, hash)
//! - Configuration loading and root folder resolution
//! - Common error type

pub mod api;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;

pub use error::{Error, Result};
