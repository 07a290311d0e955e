//! Framework-independent request authentication

pub mod auth;
