//! Typed access to the `bookmarks` table.

use std::sync::{Arc, Weak};

use tokio_util::sync::CancellationToken;

use crate::database::Shared;
use crate::error::{Result, StoreError};
use crate::flow::live::LiveQuery;
use crate::model::Bookmark;
use crate::storage::bookmarks;
use crate::storage::reader::QueryInterrupt;
use crate::storage::schema::BOOKMARKS_TABLE;

const OBSERVED_TABLES: &[&str] = &[BOOKMARKS_TABLE];

/// Accessor for the `bookmarks` table.
///
/// Obtained from [`Database::bookmark_dao`](crate::Database::bookmark_dao).
/// The accessor does not keep the database alive: once the database is
/// closed or dropped every call fails with [`StoreError::Closed`].
#[derive(Clone)]
pub struct BookmarkDao {
    db: Weak<Shared>,
}

impl BookmarkDao {
    pub(crate) fn new(db: Weak<Shared>) -> Self {
        Self { db }
    }

    fn shared(&self) -> Result<Arc<Shared>> {
        let shared = self.db.upgrade().ok_or(StoreError::Closed)?;
        shared.ensure_open()?;
        Ok(shared)
    }

    /// Insert a bookmark, replacing any existing row with the same url.
    #[tracing::instrument(skip(self, bookmark), fields(url = %bookmark.url))]
    pub async fn insert(&self, bookmark: Bookmark) -> Result<()> {
        let shared = self.shared()?;
        shared.writer().upsert_bookmark(bookmark).await?;
        Ok(())
    }

    /// Delete the row whose url equals `bookmark.url`.
    ///
    /// Deleting a bookmark that is not stored is a no-op.
    #[tracing::instrument(skip(self, bookmark), fields(url = %bookmark.url))]
    pub async fn delete(&self, bookmark: &Bookmark) -> Result<()> {
        let shared = self.shared()?;
        let deleted = shared.writer().delete_bookmark(bookmark.clone()).await?;
        tracing::debug!(deleted, "Bookmark deleted");
        Ok(())
    }

    /// Delete the row keyed by `url`. A missing row is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn delete_by_url(&self, url: &str) -> Result<()> {
        let shared = self.shared()?;
        let deleted = shared
            .writer()
            .delete_bookmark_by_url(url.to_string())
            .await?;
        tracing::debug!(deleted, "Bookmark deleted by url");
        Ok(())
    }

    /// Live list of all bookmarks, newest first.
    ///
    /// The first item is the current table contents. A new snapshot follows
    /// every committed change to the table. Each call starts a fresh
    /// subscription.
    pub fn get_all(&self) -> LiveQuery<Vec<Bookmark>> {
        let dao = self.clone();
        match self.db.upgrade() {
            Some(shared) => LiveQuery::new(shared.bus(), OBSERVED_TABLES, move || {
                let dao = dao.clone();
                async move { dao.query_all().await }
            }),
            // A bus nobody publishes on: the stream yields `Closed` and ends.
            None => LiveQuery::new(
                &crate::flow::notify::InvalidationBus::new(1),
                OBSERVED_TABLES,
                || async { Err(StoreError::Closed) },
            ),
        }
    }

    /// One-shot snapshot of all bookmarks, newest first.
    pub async fn query_all(&self) -> Result<Vec<Bookmark>> {
        let shared = self.shared()?;
        tokio::task::spawn_blocking(move || -> Result<Vec<Bookmark>> {
            let conn = shared.readers().get()?;
            Ok(bookmarks::select_all(&conn)?)
        })
        .await?
    }

    /// Whether a bookmark with `url` exists.
    ///
    /// Dropping the returned future interrupts the query.
    pub async fn is_bookmarked(&self, url: &str) -> Result<bool> {
        self.is_bookmarked_with(url, CancellationToken::new()).await
    }

    /// Whether a bookmark with `url` exists, cancellable through `cancel`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cancelled`] when `cancel` fires before the
    /// query completes. The running statement is interrupted.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn is_bookmarked_with(&self, url: &str, cancel: CancellationToken) -> Result<bool> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let shared = self.shared()?;

        let interrupt = Arc::new(QueryInterrupt::default());
        let query_cancel = cancel.child_token();
        let guard = InterruptOnDrop {
            interrupt: interrupt.clone(),
            cancel: query_cancel.clone(),
            armed: true,
        };

        let url = url.to_string();
        let task = tokio::task::spawn_blocking(move || -> Result<bool> {
            let conn = shared.readers().get()?;
            interrupt.arm(conn.get_interrupt_handle());
            if query_cancel.is_cancelled() {
                interrupt.disarm();
                return Err(StoreError::Cancelled);
            }
            let result = bookmarks::exists(&conn, &url);
            interrupt.disarm();
            Ok(result?)
        });

        tokio::select! {
            joined = task => {
                guard.disarm();
                joined?
            }
            () = cancel.cancelled() => {
                tracing::debug!("Existence check cancelled");
                Err(StoreError::Cancelled)
            }
        }
    }
}

/// Cancels a pending query, or interrupts a running one, unless disarmed first.
struct InterruptOnDrop {
    interrupt: Arc<QueryInterrupt>,
    cancel: CancellationToken,
    armed: bool,
}

impl InterruptOnDrop {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.cancel.cancel();
            self.interrupt.interrupt();
        }
    }
}
