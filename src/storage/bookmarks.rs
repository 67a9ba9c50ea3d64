//! SQL statements over the `bookmarks` table.
//!
//! Write functions take a `Transaction` so the caller controls commit;
//! read functions take any connection.

use rusqlite::{params, Connection, Row, Transaction};

use crate::model::Bookmark;

const UPSERT: &str = "INSERT OR REPLACE INTO `bookmarks` (`url`,`boardId`,`threadId`,`title`,`timestamp`) VALUES (?,?,?,?,?)";
const DELETE_ENTITY: &str = "DELETE FROM `bookmarks` WHERE `url` = ?";
const DELETE_BY_URL: &str = "DELETE FROM bookmarks WHERE url = ?";
const DELETE_ALL: &str = "DELETE FROM `bookmarks`";
const SELECT_ALL: &str = "SELECT * FROM bookmarks ORDER BY timestamp DESC";
const EXISTS: &str = "SELECT EXISTS(SELECT 1 FROM bookmarks WHERE url = ?)";

/// Insert a bookmark, replacing any row with the same url.
pub fn upsert(tx: &Transaction<'_>, bookmark: &Bookmark) -> rusqlite::Result<usize> {
    tx.execute(
        UPSERT,
        params![
            bookmark.url,
            bookmark.board_id,
            bookmark.thread_id,
            bookmark.title,
            bookmark.timestamp
        ],
    )
}

/// Delete the row matching the entity's key.
pub fn delete_entity(tx: &Transaction<'_>, bookmark: &Bookmark) -> rusqlite::Result<usize> {
    tx.execute(DELETE_ENTITY, [&bookmark.url])
}

/// Delete by key using the connection's statement cache.
///
/// The cached statement is taken out of the cache for the duration of the
/// call and returned to it when dropped.
pub fn delete_by_url(tx: &Transaction<'_>, url: &str) -> rusqlite::Result<usize> {
    let mut stmt = tx.prepare_cached(DELETE_BY_URL)?;
    stmt.execute([url])
}

/// Delete every row.
pub fn delete_all(tx: &Transaction<'_>) -> rusqlite::Result<usize> {
    tx.execute(DELETE_ALL, [])
}

/// All bookmarks, newest first.
pub fn select_all(conn: &Connection) -> rusqlite::Result<Vec<Bookmark>> {
    let mut stmt = conn.prepare_cached(SELECT_ALL)?;
    let columns = ColumnIndexes::resolve(&stmt)?;
    let rows = stmt
        .query_map([], |row| columns.read(row))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Whether a bookmark with `url` exists.
pub fn exists(conn: &Connection, url: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare_cached(EXISTS)?;
    stmt.query_row([url], |row| row.get::<_, i64>(0))
        .map(|flag| flag != 0)
}

/// Column positions of a `SELECT *` over `bookmarks`, resolved by name.
struct ColumnIndexes {
    url: usize,
    board_id: usize,
    thread_id: usize,
    title: usize,
    timestamp: usize,
}

impl ColumnIndexes {
    fn resolve(stmt: &rusqlite::Statement<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            url: stmt.column_index("url")?,
            board_id: stmt.column_index("boardId")?,
            thread_id: stmt.column_index("threadId")?,
            title: stmt.column_index("title")?,
            timestamp: stmt.column_index("timestamp")?,
        })
    }

    fn read(&self, row: &Row<'_>) -> rusqlite::Result<Bookmark> {
        Ok(Bookmark {
            url: row.get(self.url)?,
            board_id: row.get(self.board_id)?,
            thread_id: row.get(self.thread_id)?,
            title: row.get(self.title)?,
            timestamp: row.get(self.timestamp)?,
        })
    }
}
