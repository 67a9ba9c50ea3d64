//! Change notification and live query infrastructure.
//!
//! Provides:
//! - Invalidation bus fed by the writer thread
//! - Live queries that re-run when an observed table changes

pub mod live;
pub mod notify;
