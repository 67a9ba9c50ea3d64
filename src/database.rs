//! Connection manager.
//!
//! [`Database`] owns the writer thread (and with it the only read-write
//! connection), the reader pool and the invalidation bus. It hands out a
//! single [`BookmarkDao`] per database.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use rusqlite::Connection;

use crate::config::Config;
use crate::dao::BookmarkDao;
use crate::error::{Result, StoreError};
use crate::flow::notify::{InvalidationBus, TableInvalidated};
use crate::storage::reader::ReaderPool;
use crate::storage::schema::{
    apply_pragmas, open_schema, DatabaseCallback, OpenOptions, OpenOutcome, SchemaIdentity,
};
use crate::storage::writer::{Writer, WriterHandle};

/// Builder for [`Database`].
pub struct DatabaseBuilder {
    path: PathBuf,
    reader_pool_size: u32,
    write_channel_size: usize,
    notify_channel_size: usize,
    destructive_migration: bool,
    identity: SchemaIdentity,
    callbacks: Vec<Box<dyn DatabaseCallback>>,
}

impl DatabaseBuilder {
    fn new(path: impl Into<PathBuf>) -> Self {
        let defaults = Config::default();
        Self {
            path: path.into(),
            reader_pool_size: defaults.reader_pool_size,
            write_channel_size: defaults.write_channel_size,
            notify_channel_size: defaults.notify_channel_size,
            destructive_migration: defaults.destructive_migration,
            identity: SchemaIdentity::current(),
            callbacks: Vec::new(),
        }
    }

    #[must_use]
    pub fn reader_pool_size(mut self, size: u32) -> Self {
        self.reader_pool_size = size;
        self
    }

    #[must_use]
    pub fn write_channel_size(mut self, size: usize) -> Self {
        self.write_channel_size = size;
        self
    }

    #[must_use]
    pub fn notify_channel_size(mut self, size: usize) -> Self {
        self.notify_channel_size = size;
        self
    }

    /// Drop and recreate tables when the stored version differs.
    #[must_use]
    pub fn destructive_migration(mut self, enabled: bool) -> Self {
        self.destructive_migration = enabled;
        self
    }

    /// Override the schema identity the stored database must match.
    #[must_use]
    pub fn identity(mut self, identity: SchemaIdentity) -> Self {
        self.identity = identity;
        self
    }

    #[must_use]
    pub fn add_callback(mut self, callback: impl DatabaseCallback + 'static) -> Self {
        self.callbacks.push(Box::new(callback));
        self
    }

    /// Open (creating if absent) and validate the database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Schema`] when the stored schema does not match
    /// the expected identity, and a storage error when the file cannot be
    /// opened.
    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    pub fn open(self) -> Result<Database> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut conn = Connection::open(&self.path)?;
        apply_pragmas(&conn)?;
        let outcome = open_schema(
            &mut conn,
            &OpenOptions {
                identity: &self.identity,
                destructive_migration: self.destructive_migration,
                callbacks: &self.callbacks,
            },
        )?;

        let bus = InvalidationBus::new(self.notify_channel_size);
        let writer = Writer::spawn(conn, bus.clone(), self.write_channel_size)?;
        let readers = ReaderPool::new(&self.path, self.reader_pool_size)?;

        tracing::info!(?outcome, "Database opened");

        Ok(Database {
            shared: Arc::new(Shared {
                path: self.path,
                outcome,
                writer: writer.handle(),
                writer_thread: Mutex::new(Some(writer)),
                readers,
                bus,
                open: AtomicBool::new(true),
                bookmark_dao: OnceLock::new(),
            }),
        })
    }
}

pub(crate) struct Shared {
    path: PathBuf,
    outcome: OpenOutcome,
    writer: WriterHandle,
    writer_thread: Mutex<Option<Writer>>,
    readers: ReaderPool,
    bus: InvalidationBus,
    open: AtomicBool,
    bookmark_dao: OnceLock<BookmarkDao>,
}

impl Shared {
    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::Closed)
        }
    }

    pub(crate) fn writer(&self) -> &WriterHandle {
        &self.writer
    }

    pub(crate) fn readers(&self) -> &ReaderPool {
        &self.readers
    }

    pub(crate) fn bus(&self) -> &InvalidationBus {
        &self.bus
    }
}

/// Handle to an open bookmark database.
///
/// Cloning is cheap; all clones share the same connections and the same
/// [`BookmarkDao`].
#[derive(Clone)]
pub struct Database {
    shared: Arc<Shared>,
}

impl Database {
    /// Start building a database at `path`.
    pub fn builder(path: impl Into<PathBuf>) -> DatabaseBuilder {
        DatabaseBuilder::new(path)
    }

    /// Open the database described by `config`.
    pub fn open(config: &Config) -> Result<Self> {
        Self::builder(config.db_path())
            .reader_pool_size(config.reader_pool_size)
            .write_channel_size(config.write_channel_size)
            .notify_channel_size(config.notify_channel_size)
            .destructive_migration(config.destructive_migration)
            .open()
    }

    /// The bookmark accessor. Every call returns the same instance.
    pub fn bookmark_dao(&self) -> &BookmarkDao {
        self.shared
            .bookmark_dao
            .get_or_init(|| BookmarkDao::new(Arc::downgrade(&self.shared)))
    }

    /// What happened to the schema when this database was opened.
    pub fn open_outcome(&self) -> OpenOutcome {
        self.shared.outcome
    }

    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::Acquire)
    }

    /// Subscribe to raw table invalidations.
    pub fn subscribe_invalidations(&self) -> tokio::sync::broadcast::Receiver<TableInvalidated> {
        self.shared.bus.subscribe()
    }

    /// Spawn a task that publishes commits made by other connections.
    ///
    /// Writes through this database are observed directly; commits from
    /// another process are only seen by polling. The task stops once the
    /// database is closed or dropped. Must be called inside a Tokio runtime.
    pub fn spawn_change_poller(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let db = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let writer = match db.upgrade() {
                    Some(shared) if shared.ensure_open().is_ok() => shared.writer.clone(),
                    _ => break,
                };
                if let Err(e) = writer.poll_external_changes().await {
                    tracing::debug!(error = %e, "Change poller stopping");
                    break;
                }
            }
        })
    }

    /// Delete every row of every table, then reclaim disk space.
    ///
    /// Runs on the writer thread. The WAL is checkpointed and the file
    /// vacuumed afterwards, which can take a while on large databases.
    #[tracing::instrument(skip(self))]
    pub async fn clear_all(&self) -> Result<()> {
        self.shared.ensure_open()?;
        self.shared.writer.clear_all().await?;
        Ok(())
    }

    /// Blocking variant of [`clear_all`](Self::clear_all) for synchronous callers.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::BlockingInAsyncContext`] when called from
    /// inside a Tokio runtime, where blocking would stall the executor.
    pub fn clear_all_blocking(&self) -> Result<()> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(StoreError::BlockingInAsyncContext);
        }
        self.shared.ensure_open()?;
        self.shared.writer.clear_all_blocking()?;
        Ok(())
    }

    /// Close the database.
    ///
    /// Commands already queued are executed first. After closing, every
    /// operation fails with [`StoreError::Closed`]. Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        if !self.shared.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::info!(path = %self.shared.path.display(), "Closing database");

        self.shared.writer.shutdown().await?;
        let writer = self
            .shared
            .writer_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(writer) = writer {
            tokio::task::spawn_blocking(move || writer.join()).await??;
        }
        Ok(())
    }
}
