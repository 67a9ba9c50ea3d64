//! Bookmark repository used by application code.
//!
//! Wraps [`BookmarkDao`] with sorting and toggle semantics.

use std::cmp::Reverse;

use crate::dao::BookmarkDao;
use crate::error::Result;
use crate::flow::live::LiveQuery;
use crate::model::Bookmark;

/// Order in which [`BookmarkRepository::all_bookmarks`] lists bookmarks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SortOrder {
    /// Most recent first.
    #[default]
    Newest,
    /// Oldest first.
    Oldest,
    /// Grouped by board id, most recent first within a board.
    ByBoard,
}

impl SortOrder {
    /// Sort `bookmarks` in place.
    pub fn apply(self, bookmarks: &mut [Bookmark]) {
        match self {
            Self::Newest => bookmarks.sort_by_key(|b| Reverse(b.timestamp)),
            Self::Oldest => bookmarks.sort_by_key(|b| b.timestamp),
            Self::ByBoard => bookmarks.sort_by(|a, b| {
                a.board_id
                    .cmp(&b.board_id)
                    .then_with(|| b.timestamp.cmp(&a.timestamp))
            }),
        }
    }
}

#[derive(Clone)]
pub struct BookmarkRepository {
    dao: BookmarkDao,
}

impl BookmarkRepository {
    pub fn new(dao: BookmarkDao) -> Self {
        Self { dao }
    }

    /// Live list of bookmarks in `order`.
    pub fn all_bookmarks(&self, order: SortOrder) -> LiveQuery<Vec<Bookmark>> {
        let live = self.dao.get_all();
        // Rows already arrive newest first.
        if order == SortOrder::Newest {
            return live;
        }
        live.map(move |mut bookmarks| {
            order.apply(&mut bookmarks);
            bookmarks
        })
    }

    pub async fn add_bookmark(&self, bookmark: Bookmark) -> Result<()> {
        self.dao.insert(bookmark).await
    }

    pub async fn remove_bookmark(&self, bookmark: &Bookmark) -> Result<()> {
        self.dao.delete(bookmark).await
    }

    pub async fn remove_bookmark_by_url(&self, url: &str) -> Result<()> {
        self.dao.delete_by_url(url).await
    }

    pub async fn is_bookmarked(&self, url: &str) -> Result<bool> {
        self.dao.is_bookmarked(url).await
    }

    /// Remove `bookmark` if stored, add it otherwise.
    ///
    /// Returns whether the bookmark is stored afterwards.
    pub async fn toggle_bookmark(&self, bookmark: Bookmark) -> Result<bool> {
        if self.dao.is_bookmarked(&bookmark.url).await? {
            self.dao.delete(&bookmark).await?;
            Ok(false)
        } else {
            self.dao.insert(bookmark).await?;
            Ok(true)
        }
    }
}
