//! Bookmark entity stored in the `bookmarks` table.

use serde::{Deserialize, Serialize};

/// Base URL used to build canonical thread links.
pub const BOARD_BASE_URL: &str = "https://boards.4chan.org";

/// Maximum number of characters of a post excerpt kept as a bookmark title.
pub const MAX_TITLE_CHARS: usize = 50;

/// A bookmarked thread.
///
/// `url` is the primary key; inserting a bookmark with an existing `url`
/// replaces every other field of the stored row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub url: String,
    pub board_id: String,
    pub thread_id: String,
    pub title: String,
    /// Creation time in Unix epoch milliseconds.
    pub timestamp: i64,
}

impl Bookmark {
    /// Create a bookmark stamped with the current time.
    pub fn new(
        url: impl Into<String>,
        board_id: impl Into<String>,
        thread_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            board_id: board_id.into(),
            thread_id: thread_id.into(),
            title: title.into(),
            timestamp: now_millis(),
        }
    }

    /// Create a bookmark for a thread on a board.
    ///
    /// The URL is derived from the board and thread ids, and the title is
    /// the first [`MAX_TITLE_CHARS`] characters of `excerpt`.
    pub fn for_thread(board_id: &str, thread_id: &str, excerpt: &str) -> Self {
        let title: String = excerpt.chars().take(MAX_TITLE_CHARS).collect();
        Self::new(thread_url(board_id, thread_id), board_id, thread_id, title)
    }

    /// Return a copy with the given timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Canonical URL of a thread, used as the bookmark key.
#[must_use]
pub fn thread_url(board_id: &str, thread_id: &str) -> String {
    format!("{BOARD_BASE_URL}/{board_id}/thread/{thread_id}")
}

/// Get the current Unix timestamp in milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
