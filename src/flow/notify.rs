//! Invalidation bus for waking live queries.
//!
//! - tokio::sync::broadcast for pub-sub notifications
//! - Notifications carry only the table name; subscribers re-run their query

use std::sync::Arc;
use tokio::sync::broadcast::{self, Receiver, Sender};

/// Notification sent after a committed write changed rows of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInvalidated {
    /// The table whose rows changed
    pub table: Arc<str>,
}

/// Notification bus for table invalidations.
///
/// The writer thread publishes one notification per changed table after
/// each committed command. Live queries subscribe and re-query when a
/// table they observe is invalidated.
#[derive(Clone)]
pub struct InvalidationBus {
    sender: Sender<TableInvalidated>,
}

impl InvalidationBus {
    /// Create a new invalidation bus with the given capacity.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of buffered notifications.
    ///   Receivers that fall behind observe a lag and re-query.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to notifications.
    ///
    /// Returns a receiver that will receive all future notifications.
    pub fn subscribe(&self) -> Receiver<TableInvalidated> {
        self.sender.subscribe()
    }

    /// Notify subscribers that `table` changed.
    ///
    /// # Returns
    ///
    /// The number of receivers that received the notification.
    pub fn notify(&self, table: &str) -> usize {
        // send() returns an error if there are no receivers, which is fine
        self.sender
            .send(TableInvalidated {
                table: Arc::from(table),
            })
            .unwrap_or(0)
    }

    /// Get the number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for InvalidationBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
