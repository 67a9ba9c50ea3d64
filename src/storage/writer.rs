//! Dedicated writer thread.
//!
//! The writer thread owns the only read-write connection. Every mutation is
//! sent as a [`WriteCommand`] over a bounded channel, executed inside its own
//! transaction, and answered through a oneshot. Commands are processed one at
//! a time, so write transactions never interleave.
//!
//! Row changes are captured with SQLite's update hook. After a command
//! finishes, the tables it changed are published on the [`InvalidationBus`].
//! Commits made by other connections (another process, for instance) never
//! reach the hook; [`WriterHandle::poll_external_changes`] detects them
//! through `PRAGMA data_version`.

use rusqlite::hooks::Action;
use rusqlite::{Connection, Transaction};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use super::bookmarks;
use super::schema::BOOKMARKS_TABLE;
use crate::flow::notify::InvalidationBus;
use crate::model::Bookmark;

/// Error type for writer operations.
#[derive(Debug, Error)]
pub enum WriterError {
    #[error("Writer channel closed")]
    ChannelClosed,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Writer thread panicked")]
    ThreadPanic,

    #[error("Failed to spawn writer thread: {0}")]
    Spawn(#[source] std::io::Error),
}

type Reply<T> = oneshot::Sender<Result<T, WriterError>>;

/// Commands handled by the writer thread.
#[derive(Debug)]
pub enum WriteCommand {
    UpsertBookmark { bookmark: Bookmark, reply: Reply<()> },
    DeleteBookmark { bookmark: Bookmark, reply: Reply<usize> },
    DeleteBookmarkByUrl { url: String, reply: Reply<usize> },
    ClearAll { reply: Reply<()> },
    PollExternalChanges { reply: Reply<bool> },
    Shutdown { reply: oneshot::Sender<()> },
}

/// Tables touched by the current command, filled by the update hook.
#[derive(Clone, Default)]
struct ChangedTables(Arc<Mutex<BTreeSet<String>>>);

impl ChangedTables {
    fn insert(&self, table: &str) {
        let mut tables = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if !tables.contains(table) {
            tables.insert(table.to_string());
        }
    }

    fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn take(&self) -> BTreeSet<String> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Owner of the writer thread.
pub struct Writer {
    handle: WriterHandle,
    thread: JoinHandle<()>,
}

impl Writer {
    /// Spawn the writer thread around an already opened connection.
    ///
    /// # Arguments
    ///
    /// * `conn` - Read-write connection with the schema in place
    /// * `bus` - Bus invalidations are published on
    /// * `channel_size` - Capacity of the command channel
    pub fn spawn(
        conn: Connection,
        bus: InvalidationBus,
        channel_size: usize,
    ) -> Result<Self, WriterError> {
        let (tx, rx) = mpsc::channel(channel_size.max(1));

        let changed = ChangedTables::default();
        install_hooks(&conn, &changed);

        let thread = std::thread::Builder::new()
            .name("bookmark-writer".into())
            .spawn(move || run(conn, rx, bus, changed))
            .map_err(WriterError::Spawn)?;

        Ok(Self {
            handle: WriterHandle { tx },
            thread,
        })
    }

    /// Get a handle for sending commands.
    pub fn handle(&self) -> WriterHandle {
        self.handle.clone()
    }

    /// Wait for the writer thread to exit.
    pub fn join(self) -> Result<(), WriterError> {
        drop(self.handle);
        self.thread.join().map_err(|_| WriterError::ThreadPanic)
    }
}

fn install_hooks(conn: &Connection, changed: &ChangedTables) {
    let on_update = changed.clone();
    conn.update_hook(Some(
        move |_action: Action, _db: &str, table: &str, _rowid: i64| {
            on_update.insert(table);
        },
    ));
    let on_rollback = changed.clone();
    conn.rollback_hook(Some(move || on_rollback.clear()));
}

fn run(
    mut conn: Connection,
    mut rx: mpsc::Receiver<WriteCommand>,
    bus: InvalidationBus,
    changed: ChangedTables,
) {
    tracing::debug!("Writer thread started");

    let mut last_data_version = match data_version(&conn) {
        Ok(version) => version,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read data_version");
            0
        }
    };

    while let Some(command) = rx.blocking_recv() {
        match command {
            WriteCommand::UpsertBookmark { bookmark, reply } => {
                tracing::debug!(url = %bookmark.url, "Upserting bookmark");
                let result = in_transaction(&mut conn, |tx| bookmarks::upsert(tx, &bookmark))
                    .map(|_| ());
                publish(&bus, &changed);
                let _ = reply.send(result);
            }
            WriteCommand::DeleteBookmark { bookmark, reply } => {
                tracing::debug!(url = %bookmark.url, "Deleting bookmark");
                let result = in_transaction(&mut conn, |tx| bookmarks::delete_entity(tx, &bookmark));
                publish(&bus, &changed);
                let _ = reply.send(result);
            }
            WriteCommand::DeleteBookmarkByUrl { url, reply } => {
                tracing::debug!(%url, "Deleting bookmark by url");
                let result = in_transaction(&mut conn, |tx| bookmarks::delete_by_url(tx, &url));
                publish(&bus, &changed);
                let _ = reply.send(result);
            }
            WriteCommand::ClearAll { reply } => {
                let result = clear_all(&mut conn, &changed);
                publish(&bus, &changed);
                let _ = reply.send(result);
            }
            WriteCommand::PollExternalChanges { reply } => {
                let result = data_version(&conn).map_err(WriterError::from).map(|current| {
                    let external = current != last_data_version;
                    last_data_version = current;
                    external
                });
                if let Ok(true) = result {
                    tracing::debug!("Detected commit from another connection");
                    changed.insert(BOOKMARKS_TABLE);
                }
                publish(&bus, &changed);
                let _ = reply.send(result);
            }
            WriteCommand::Shutdown { reply } => {
                tracing::debug!("Writer thread shutting down");
                let _ = reply.send(());
                break;
            }
        }
    }

    tracing::debug!("Writer thread stopped");
}

/// Run `f` in a transaction, committing on success.
///
/// On error the transaction is dropped, which rolls it back.
fn in_transaction<T, F>(conn: &mut Connection, f: F) -> Result<T, WriterError>
where
    F: FnOnce(&Transaction<'_>) -> rusqlite::Result<T>,
{
    let tx = conn.transaction()?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}

/// Delete every bookmark, then checkpoint and vacuum.
///
/// The table is marked changed as soon as the delete commits, so a failed
/// compaction still wakes live queries.
fn clear_all(conn: &mut Connection, changed: &ChangedTables) -> Result<(), WriterError> {
    let deleted = in_transaction(conn, bookmarks::delete_all)?;
    // Truncating deletes bypass the update hook.
    changed.insert(BOOKMARKS_TABLE);
    tracing::info!(deleted, "Cleared all bookmarks");

    conn.query_row("PRAGMA wal_checkpoint(FULL)", [], |_| Ok(()))?;
    if conn.is_autocommit() {
        conn.execute_batch("VACUUM")?;
    }
    Ok(())
}

/// Counter that moves whenever another connection commits.
fn data_version(conn: &Connection) -> rusqlite::Result<i64> {
    conn.pragma_query_value(None, "data_version", |row| row.get(0))
}

fn publish(bus: &InvalidationBus, changed: &ChangedTables) {
    for table in changed.take() {
        let receivers = bus.notify(&table);
        tracing::trace!(%table, receivers, "Published invalidation");
    }
}

/// Cloneable handle for submitting commands to the writer thread.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<WriteCommand>,
}

impl WriterHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> WriteCommand,
    ) -> Result<T, WriterError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| WriterError::ChannelClosed)?;
        rx.await.map_err(|_| WriterError::ChannelClosed)?
    }

    /// Insert or replace a bookmark.
    pub async fn upsert_bookmark(&self, bookmark: Bookmark) -> Result<(), WriterError> {
        self.request(|reply| WriteCommand::UpsertBookmark { bookmark, reply })
            .await
    }

    /// Delete the row keyed by `bookmark.url`. Returns the rows deleted.
    pub async fn delete_bookmark(&self, bookmark: Bookmark) -> Result<usize, WriterError> {
        self.request(|reply| WriteCommand::DeleteBookmark { bookmark, reply })
            .await
    }

    /// Delete the row keyed by `url`. Returns the rows deleted.
    pub async fn delete_bookmark_by_url(&self, url: String) -> Result<usize, WriterError> {
        self.request(|reply| WriteCommand::DeleteBookmarkByUrl { url, reply })
            .await
    }

    /// Delete every row, checkpoint the WAL and vacuum.
    pub async fn clear_all(&self) -> Result<(), WriterError> {
        self.request(|reply| WriteCommand::ClearAll { reply }).await
    }

    /// Blocking variant of [`clear_all`](Self::clear_all).
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn clear_all_blocking(&self) -> Result<(), WriterError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .blocking_send(WriteCommand::ClearAll { reply })
            .map_err(|_| WriterError::ChannelClosed)?;
        rx.blocking_recv().map_err(|_| WriterError::ChannelClosed)?
    }

    /// Check whether another connection committed since the last poll.
    ///
    /// When one did, the bookmarks table is published as invalidated and
    /// `true` is returned.
    pub async fn poll_external_changes(&self) -> Result<bool, WriterError> {
        self.request(|reply| WriteCommand::PollExternalChanges { reply })
            .await
    }

    /// Ask the writer thread to stop after the commands queued before this.
    pub async fn shutdown(&self) -> Result<(), WriterError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WriteCommand::Shutdown { reply })
            .await
            .map_err(|_| WriterError::ChannelClosed)?;
        rx.await.map_err(|_| WriterError::ChannelClosed)
    }
}
