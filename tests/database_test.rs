//! Connection manager tests.
//!
//! Tests:
//! - Reopen with an unchanged schema validates
//! - A different expected identity fails validation
//! - Version drift recreates or fails depending on the fallback
//! - One accessor per database
//! - Closed database and threading violations
//! - Existence check cancellation

mod common;

use bookmark_store::storage::schema::SCHEMA_VERSION;
use bookmark_store::{
    Database, DatabaseCallback, OpenOutcome, SchemaError, SchemaIdentity, StoreError,
};
use common::{bookmark, TestFixture};
use rusqlite::Connection;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_reopen_with_same_schema_succeeds() {
    let fixture = TestFixture::new();

    let db = fixture.open();
    assert_eq!(db.open_outcome(), OpenOutcome::Created);
    db.close().await.unwrap();

    let db = fixture.open();
    assert_eq!(db.open_outcome(), OpenOutcome::Validated);
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_altered_identity_fails_validation() {
    let fixture = TestFixture::new();
    fixture.open().close().await.unwrap();

    let altered = SchemaIdentity {
        identity_hash: "ffffffffffffffffffffffffffffffff".into(),
        legacy_hash: None,
        ..SchemaIdentity::current()
    };
    let result = Database::builder(&fixture.db_path).identity(altered).open();

    assert!(matches!(
        result,
        Err(StoreError::Schema(SchemaError::IdentityMismatch { .. }))
    ));
}

#[tokio::test]
async fn test_version_drift_without_fallback_fails() {
    let fixture = TestFixture::new();
    fixture.open().close().await.unwrap();
    {
        let conn = Connection::open(&fixture.db_path).unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION - 1)
            .unwrap();
    }

    let result = Database::builder(&fixture.db_path)
        .destructive_migration(false)
        .open();
    assert!(matches!(
        result,
        Err(StoreError::Schema(SchemaError::MigrationRequired { .. }))
    ));
}

struct CountDestructive(Arc<AtomicUsize>);

impl DatabaseCallback for CountDestructive {
    fn on_destructive_migration(&self, _conn: &Connection) -> rusqlite::Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_version_drift_with_fallback_recreates() {
    let fixture = TestFixture::new();
    let db = fixture.open();
    db.bookmark_dao()
        .insert(bookmark("a", "g", "1", "X", 1))
        .await
        .unwrap();
    db.close().await.unwrap();
    drop(db);
    {
        let conn = Connection::open(&fixture.db_path).unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION - 1)
            .unwrap();
    }

    let recreated = Arc::new(AtomicUsize::new(0));
    let db = Database::builder(&fixture.db_path)
        .destructive_migration(true)
        .add_callback(CountDestructive(recreated.clone()))
        .open()
        .unwrap();

    assert_eq!(
        db.open_outcome(),
        OpenOutcome::Recreated {
            from: SCHEMA_VERSION - 1
        }
    );
    assert_eq!(recreated.load(Ordering::SeqCst), 1);
    assert!(!db.bookmark_dao().is_bookmarked("a").await.unwrap());
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_single_accessor_per_database() {
    let fixture = TestFixture::new();
    let db = fixture.open();
    let other = db.clone();

    let first = db.bookmark_dao() as *const _;
    let second = other.bookmark_dao() as *const _;
    assert!(std::ptr::eq(first, second));

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_operations_after_close_fail() {
    let fixture = TestFixture::new();
    let db = fixture.open();
    let dao = db.bookmark_dao().clone();

    db.close().await.unwrap();
    assert!(!db.is_open());
    // Closing again is a no-op
    db.close().await.unwrap();

    assert!(matches!(
        dao.insert(bookmark("a", "g", "1", "X", 1)).await,
        Err(StoreError::Closed)
    ));
    assert!(matches!(dao.is_bookmarked("a").await, Err(StoreError::Closed)));
    assert!(matches!(dao.delete_by_url("a").await, Err(StoreError::Closed)));
    assert!(matches!(db.clear_all().await, Err(StoreError::Closed)));
}

#[tokio::test]
async fn test_dropped_database_fails_accessor() {
    let fixture = TestFixture::new();
    let db = fixture.open();
    let dao = db.bookmark_dao().clone();
    db.close().await.unwrap();
    drop(db);

    assert!(matches!(dao.query_all().await, Err(StoreError::Closed)));
}

#[tokio::test]
async fn test_clear_all_blocking_rejected_in_async_context() {
    let fixture = TestFixture::new();
    let db = fixture.open();

    assert!(matches!(
        db.clear_all_blocking(),
        Err(StoreError::BlockingInAsyncContext)
    ));

    db.close().await.unwrap();
}

#[test]
fn test_clear_all_blocking_from_sync_context() {
    let fixture = TestFixture::new();
    let runtime = tokio::runtime::Runtime::new().unwrap();

    let db = runtime.block_on(async {
        let db = fixture.open();
        db.bookmark_dao()
            .insert(bookmark("a", "g", "1", "X", 1))
            .await
            .unwrap();
        db
    });

    db.clear_all_blocking().unwrap();

    runtime.block_on(async {
        assert!(db.bookmark_dao().query_all().await.unwrap().is_empty());
        db.close().await.unwrap();
    });
}

#[tokio::test]
async fn test_clear_all_removes_everything() {
    let fixture = TestFixture::new();
    let db = fixture.open();
    let dao = db.bookmark_dao();

    for i in 0..10 {
        dao.insert(bookmark(&format!("u{i}"), "g", "1", "X", i))
            .await
            .unwrap();
    }
    db.clear_all().await.unwrap();

    assert!(dao.query_all().await.unwrap().is_empty());
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_cancelled_token_short_circuits() {
    let fixture = TestFixture::new();
    let db = fixture.open();
    let dao = db.bookmark_dao();
    dao.insert(bookmark("a", "g", "1", "X", 1)).await.unwrap();

    let token = CancellationToken::new();
    token.cancel();
    assert!(matches!(
        dao.is_bookmarked_with("a", token).await,
        Err(StoreError::Cancelled)
    ));

    // Uncancelled token behaves like the plain check.
    assert!(dao
        .is_bookmarked_with("a", CancellationToken::new())
        .await
        .unwrap());

    db.close().await.unwrap();
}
