//! High-level Database API.
//!
//! This module provides the user-facing facade over storage and
//! transactions, its configuration and its error classification.

mod api;
mod config;
mod error;

pub use api::Database;
pub use config::DatabaseConfig;
pub use error::{DatabaseError, DatabaseResult, ErrorKind};
