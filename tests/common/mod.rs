//! Test utilities for bookmark store tests.
//!
//! Provides:
//! - Temporary database fixtures
//! - Bookmark builders
//! - Timeout-bounded stream helpers

#![allow(dead_code)]

use bookmark_store::{Bookmark, Config, Database, LiveQuery};
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// Default time to wait for a live query snapshot.
pub const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(5);

/// Test fixture that manages a temporary database directory.
///
/// The directory is automatically cleaned up when the fixture is dropped.
pub struct TestFixture {
    /// Temporary directory for test database
    pub temp_dir: TempDir,
    /// Path to the database file
    pub db_path: PathBuf,
}

impl TestFixture {
    /// Create a new test fixture with a temporary database directory.
    pub fn new() -> Self {
        bookmark_store::observability::tracing::init_test_tracing();
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        Self { temp_dir, db_path }
    }

    /// Configuration pointing at the fixture's database.
    pub fn config(&self) -> Config {
        Config {
            db_name: "test.db".into(),
            reader_pool_size: 2,
            ..Config::in_dir(self.temp_dir.path())
        }
    }

    /// Open the fixture's database.
    pub fn open(&self) -> Database {
        Database::open(&self.config()).expect("failed to open database")
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a bookmark with explicit fields.
pub fn bookmark(url: &str, board: &str, thread: &str, title: &str, timestamp: i64) -> Bookmark {
    Bookmark {
        url: url.to_string(),
        board_id: board.to_string(),
        thread_id: thread.to_string(),
        title: title.to_string(),
        timestamp,
    }
}

/// Wait for the next snapshot of a live query.
///
/// Panics if none arrives within [`SNAPSHOT_TIMEOUT`] or the query fails.
pub async fn next_snapshot<T: Send + 'static>(query: &mut LiveQuery<T>) -> T {
    tokio::time::timeout(SNAPSHOT_TIMEOUT, query.next())
        .await
        .expect("timed out waiting for snapshot")
        .expect("live query ended")
        .expect("live query failed")
}

/// Assert that no snapshot arrives within `wait`.
pub async fn assert_no_snapshot<T: Send + 'static>(query: &mut LiveQuery<T>, wait: Duration) {
    let result = tokio::time::timeout(wait, query.next()).await;
    assert!(result.is_err(), "unexpected snapshot emitted");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_creates_temp_dir() {
        let fixture = TestFixture::new();
        assert!(fixture.temp_dir.path().exists());
        assert!(fixture.config().db_path().ends_with("test.db"));
    }
}
