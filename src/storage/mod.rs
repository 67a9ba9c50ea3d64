//! SQLite storage layer.
//!
//! Provides:
//! - Schema creation, identity validation and destructive migration
//! - Dedicated writer thread with per-command transactions
//! - Read connection pool for queries
//! - SQL statements over the bookmarks table

pub mod bookmarks;
pub mod reader;
pub mod schema;
pub mod writer;
