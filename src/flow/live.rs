//! Live queries driven by table invalidations.
//!
//! A [`LiveQuery`] registers interest on the [`InvalidationBus`] when it is
//! created. The first poll runs the query and yields the current snapshot.
//! After that the query only re-runs when one of the observed tables is
//! invalidated. Notifications that pile up while a query is running are
//! coalesced into a single re-run.

use futures::future::FutureExt;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use super::notify::{InvalidationBus, TableInvalidated};
use crate::error::StoreError;

/// A stream of query snapshots that re-emits whenever an observed table
/// changes.
///
/// The stream ends after yielding an error, or when the database that owns
/// the bus is dropped. Dropping the stream unsubscribes.
pub struct LiveQuery<T> {
    inner: BoxStream<'static, Result<T, StoreError>>,
}

struct State<Q> {
    invalidations: BroadcastStream<TableInvalidated>,
    tables: &'static [&'static str],
    query: Q,
    started: bool,
    done: bool,
}

impl<Q> State<Q> {
    fn observes(&self, table: &str) -> bool {
        self.tables.iter().any(|t| *t == table)
    }

    /// Wait until an observed table is invalidated.
    ///
    /// Returns false when the bus is closed.
    async fn wait_for_invalidation(&mut self) -> bool {
        loop {
            match self.invalidations.next().await {
                None => return false,
                Some(Ok(n)) if self.observes(&n.table) => break,
                Some(Ok(_)) => continue,
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    tracing::trace!(skipped, "Live query lagged, re-querying");
                    break;
                }
            }
        }

        // Coalesce anything already queued behind this notification.
        while let Some(Some(_)) = self.invalidations.next().now_or_never() {}
        true
    }
}

impl<T: Send + 'static> LiveQuery<T> {
    /// Create a live query over `tables`.
    ///
    /// # Arguments
    ///
    /// * `bus` - Bus the writer publishes invalidations on
    /// * `tables` - Tables whose invalidation triggers a re-query
    /// * `query` - Produces a fresh snapshot each time it is called
    pub fn new<Q, Fut>(bus: &InvalidationBus, tables: &'static [&'static str], query: Q) -> Self
    where
        Q: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
    {
        let state = State {
            invalidations: BroadcastStream::new(bus.subscribe()),
            tables,
            query,
            started: false,
            done: false,
        };

        let inner = stream::unfold(state, |mut state| async move {
            if state.done {
                return None;
            }
            if state.started && !state.wait_for_invalidation().await {
                return None;
            }
            state.started = true;

            let snapshot = (state.query)().await;
            state.done = snapshot.is_err();
            Some((snapshot, state))
        })
        .boxed();

        Self { inner }
    }

    /// Transform every snapshot with `f`.
    pub fn map<U, F>(self, mut f: F) -> LiveQuery<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> U + Send + 'static,
    {
        LiveQuery {
            inner: self.inner.map(move |r| r.map(|v| f(v))).boxed(),
        }
    }
}

impl<T> Stream for LiveQuery<T> {
    type Item = Result<T, StoreError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}
