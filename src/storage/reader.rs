//! Read connection pool for queries and live query snapshots.
//!
//! Uses r2d2 with r2d2_sqlite for pooled read access.
//! SQLite WAL mode allows readers to run alongside the writer thread.

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{InterruptHandle, OpenFlags};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

use super::schema::apply_reader_pragmas;

/// Error type for reader pool operations.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("Failed to create connection pool: {0}")]
    PoolCreation(#[from] r2d2::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Read connection pool.
///
/// Provides pooled read-only connections for concurrent access.
#[derive(Clone)]
pub struct ReaderPool {
    pool: Pool<SqliteConnectionManager>,
}

impl ReaderPool {
    /// Create a new reader pool for the given database path.
    ///
    /// # Arguments
    ///
    /// * `db_path` - Path to the SQLite database file, which must exist
    /// * `max_size` - Maximum number of connections in the pool
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be created.
    pub fn new<P: AsRef<Path>>(db_path: P, max_size: u32) -> Result<Self, ReaderError> {
        let manager = SqliteConnectionManager::file(db_path)
            .with_flags(OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX);

        let pool = Pool::builder()
            .max_size(max_size.max(1))
            .connection_customizer(Box::new(ReaderConnectionCustomizer))
            .build(manager)?;

        Ok(Self { pool })
    }

    /// Get a connection from the pool.
    ///
    /// Blocks until a connection is free or the pool timeout expires.
    pub fn get(&self) -> Result<PooledConnection<SqliteConnectionManager>, ReaderError> {
        Ok(self.pool.get()?)
    }
}

/// Connection customizer that applies reader pragmas.
#[derive(Debug)]
struct ReaderConnectionCustomizer;

impl r2d2::CustomizeConnection<rusqlite::Connection, rusqlite::Error>
    for ReaderConnectionCustomizer
{
    fn on_acquire(&self, conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
        apply_reader_pragmas(conn)
    }
}

/// Interrupt handle of a query while it is running.
///
/// The query side arms the slot right before executing and disarms it when
/// done. Interrupting is a no-op outside that window, so a pooled connection
/// reused by another query is never interrupted.
#[derive(Default)]
pub struct QueryInterrupt {
    handle: Mutex<Option<InterruptHandle>>,
}

impl QueryInterrupt {
    pub fn arm(&self, handle: InterruptHandle) {
        *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    pub fn disarm(&self) {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Interrupt the running query, if any.
    pub fn interrupt(&self) {
        if let Some(handle) = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            handle.interrupt();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::bookmarks;
    use crate::storage::schema::{apply_pragmas, create_all_tables, SchemaIdentity};
    use rusqlite::Connection;
    use tempfile::TempDir;

    #[test]
    fn test_reader_pool_creation() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        // Create the database first with write connection
        let conn = Connection::open(&db_path).unwrap();
        apply_pragmas(&conn).unwrap();
        create_all_tables(&conn, &SchemaIdentity::current()).unwrap();
        conn.execute(
            "INSERT INTO bookmarks (url, boardId, threadId, title, timestamp) VALUES ('u', 'g', '1', 't', 5)",
            [],
        )
        .unwrap();

        let pool = ReaderPool::new(&db_path, 2).unwrap();
        let reader = pool.get().unwrap();
        assert!(bookmarks::exists(&reader, "u").unwrap());
        assert_eq!(bookmarks::select_all(&reader).unwrap().len(), 1);
    }

    #[test]
    fn test_reader_connections_reject_writes() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let conn = Connection::open(&db_path).unwrap();
        apply_pragmas(&conn).unwrap();
        create_all_tables(&conn, &SchemaIdentity::current()).unwrap();

        let pool = ReaderPool::new(&db_path, 1).unwrap();
        let reader = pool.get().unwrap();
        assert!(reader.execute("DELETE FROM bookmarks", []).is_err());
    }

    #[test]
    fn test_disarmed_interrupt_is_noop() {
        let conn = Connection::open_in_memory().unwrap();
        let interrupt = QueryInterrupt::default();
        interrupt.arm(conn.get_interrupt_handle());
        interrupt.disarm();
        interrupt.interrupt();

        let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0)).unwrap();
        assert_eq!(one, 1);
    }
}
