//! Schema creation, identity validation and the destructive migration path.
//!
//! The on-disk schema is identified two ways:
//! - `PRAGMA user_version` holds the schema version
//! - the `schema_identity` table holds a hash of the expected table shapes
//!
//! A database opened at the current version must carry a matching identity
//! hash. A database at another version is dropped and recreated when the
//! destructive fallback is enabled, and rejected otherwise.

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 2;

/// Identity hash of the current schema.
pub const IDENTITY_HASH: &str = "3f54e706f2365c967d44b79413cf2856";

/// Identity hash written by older builds for the same schema shape.
pub const LEGACY_IDENTITY_HASH: &str = "db4f477435d29859b8ad11552eda4f5e";

/// Fixed row id of the identity record.
pub const IDENTITY_ROW_ID: i64 = 42;

/// Name of the identity table.
pub const IDENTITY_TABLE: &str = "schema_identity";

/// Name of the bookmarks table.
pub const BOOKMARKS_TABLE: &str = "bookmarks";

/// Prefix of content sync triggers removed before a migration.
const SYNC_TRIGGER_PREFIX: &str = "fts_content_sync_";

const CREATE_BOOKMARKS: &str = "CREATE TABLE IF NOT EXISTS `bookmarks` (`url` TEXT NOT NULL, `boardId` TEXT NOT NULL, `threadId` TEXT NOT NULL, `title` TEXT NOT NULL, `timestamp` INTEGER NOT NULL, PRIMARY KEY(`url`))";

const CREATE_IDENTITY: &str =
    "CREATE TABLE IF NOT EXISTS schema_identity (id INTEGER PRIMARY KEY, identity_hash TEXT)";

/// Expected columns of the `bookmarks` table: (name, type, not null, pk position).
const BOOKMARKS_COLUMNS: &[(&str, &str, bool, i64)] = &[
    ("url", "TEXT", true, 1),
    ("boardId", "TEXT", true, 0),
    ("threadId", "TEXT", true, 0),
    ("title", "TEXT", true, 0),
    ("timestamp", "INTEGER", true, 0),
];

/// Error type for schema open and validation.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(
        "Schema identity mismatch: expected {expected}, found {}",
        .found.as_deref().unwrap_or("<none>")
    )]
    IdentityMismatch {
        expected: String,
        found: Option<String>,
    },

    #[error("Schema validation failed for {table}.\n Expected:\n{expected}\n Found:\n{found}")]
    Validation {
        table: String,
        expected: String,
        found: String,
    },

    #[error("Migration required from version {from} to {to} and destructive fallback is disabled")]
    MigrationRequired { from: u32, to: u32 },

    #[error("Open callback failed: {0}")]
    Callback(String),
}

/// Identity the opened database is expected to carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIdentity {
    pub version: u32,
    pub identity_hash: String,
    pub legacy_hash: Option<String>,
}

impl SchemaIdentity {
    /// Identity of the schema compiled into this crate.
    pub fn current() -> Self {
        Self {
            version: SCHEMA_VERSION,
            identity_hash: IDENTITY_HASH.to_string(),
            legacy_hash: Some(LEGACY_IDENTITY_HASH.to_string()),
        }
    }

    fn accepts(&self, found: &str) -> bool {
        found == self.identity_hash || self.legacy_hash.as_deref() == Some(found)
    }
}

impl Default for SchemaIdentity {
    fn default() -> Self {
        Self::current()
    }
}

/// Hooks invoked while a database is opened.
///
/// All methods default to no-ops. Errors abort the open.
pub trait DatabaseCallback: Send {
    /// Called once after the tables of a fresh database are created.
    fn on_create(&self, _conn: &Connection) -> rusqlite::Result<()> {
        Ok(())
    }

    /// Called after the tables were dropped and recreated.
    fn on_destructive_migration(&self, _conn: &Connection) -> rusqlite::Result<()> {
        Ok(())
    }

    /// Called after every successful open.
    fn on_open(&self, _conn: &Connection) -> rusqlite::Result<()> {
        Ok(())
    }
}

/// What happened while the schema was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// Fresh file, tables created.
    Created,
    /// Existing file, identity or table shape matched.
    Validated,
    /// Version mismatch, tables dropped and recreated.
    Recreated { from: u32 },
}

/// Options controlling [`open_schema`].
pub struct OpenOptions<'a> {
    pub identity: &'a SchemaIdentity,
    pub destructive_migration: bool,
    pub callbacks: &'a [Box<dyn DatabaseCallback>],
}

/// Apply pragmas for the read-write connection.
pub fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(())
}

/// Apply pragmas for pooled read-only connections.
pub fn apply_reader_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.pragma_update(None, "query_only", true)?;
    Ok(())
}

/// Create every table and record the identity row.
pub fn create_all_tables(conn: &Connection, identity: &SchemaIdentity) -> rusqlite::Result<()> {
    conn.execute_batch(CREATE_BOOKMARKS)?;
    conn.execute_batch(CREATE_IDENTITY)?;
    write_identity(conn, &identity.identity_hash)
}

/// Drop every entity table. The identity table is rewritten on recreate.
pub fn drop_all_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("DROP TABLE IF EXISTS `bookmarks`")
}

/// Drop content sync triggers left behind by a previous schema.
///
/// Returns the number of triggers dropped.
pub fn drop_sync_triggers(conn: &Connection) -> rusqlite::Result<usize> {
    let mut stmt =
        conn.prepare("SELECT name FROM sqlite_master WHERE type = 'trigger' AND name LIKE ?1")?;
    let names = stmt
        .query_map([format!("{SYNC_TRIGGER_PREFIX}%")], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    for name in &names {
        conn.execute_batch(&format!("DROP TRIGGER IF EXISTS `{name}`"))?;
    }
    Ok(names.len())
}

/// Read `PRAGMA user_version`.
pub fn user_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
}

fn set_user_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.pragma_update(None, "user_version", version)
}

fn write_identity(conn: &Connection, hash: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_identity (id, identity_hash) VALUES (?1, ?2)",
        params![IDENTITY_ROW_ID, hash],
    )?;
    Ok(())
}

fn table_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [name],
        |row| row.get(0),
    )
}

/// Read the stored identity hash, if the identity table and row exist.
pub fn read_identity(conn: &Connection) -> rusqlite::Result<Option<String>> {
    if !table_exists(conn, IDENTITY_TABLE)? {
        return Ok(None);
    }
    conn.query_row(
        "SELECT identity_hash FROM schema_identity WHERE id = ?1 LIMIT 1",
        [IDENTITY_ROW_ID],
        |row| row.get::<_, Option<String>>(0),
    )
    .optional()
    .map(Option::flatten)
}

/// Column description as reported by `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub affinity: String,
    pub not_null: bool,
    pub primary_key_position: i64,
}

impl fmt::Display for ColumnInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  {} {}{}{}",
            self.name,
            self.affinity,
            if self.not_null { " NOT NULL" } else { "" },
            if self.primary_key_position > 0 {
                format!(" PK({})", self.primary_key_position)
            } else {
                String::new()
            }
        )
    }
}

/// Read the columns of `table`, sorted by name.
pub fn table_info(conn: &Connection, table: &str) -> rusqlite::Result<Vec<ColumnInfo>> {
    let mut stmt = conn.prepare("SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1)")?;
    let mut columns = stmt
        .query_map([table], |row| {
            Ok(ColumnInfo {
                name: row.get(0)?,
                affinity: row.get::<_, String>(1)?.to_uppercase(),
                not_null: row.get(2)?,
                primary_key_position: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    columns.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(columns)
}

fn expected_bookmark_columns() -> Vec<ColumnInfo> {
    let mut columns: Vec<ColumnInfo> = BOOKMARKS_COLUMNS
        .iter()
        .map(|&(name, affinity, not_null, pk)| ColumnInfo {
            name: name.to_string(),
            affinity: affinity.to_string(),
            not_null,
            primary_key_position: pk,
        })
        .collect();
    columns.sort_by(|a, b| a.name.cmp(&b.name));
    columns
}

fn render_columns(columns: &[ColumnInfo]) -> String {
    columns
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Check the on-disk `bookmarks` table against the expected shape.
pub fn validate_schema(conn: &Connection) -> Result<(), SchemaError> {
    let expected = expected_bookmark_columns();
    let found = table_info(conn, BOOKMARKS_TABLE)?;
    if expected != found {
        return Err(SchemaError::Validation {
            table: BOOKMARKS_TABLE.to_string(),
            expected: render_columns(&expected),
            found: render_columns(&found),
        });
    }
    Ok(())
}

fn run_callbacks<F>(callbacks: &[Box<dyn DatabaseCallback>], mut f: F) -> Result<(), SchemaError>
where
    F: FnMut(&dyn DatabaseCallback) -> rusqlite::Result<()>,
{
    for callback in callbacks {
        f(callback.as_ref()).map_err(|e| SchemaError::Callback(e.to_string()))?;
    }
    Ok(())
}

/// Open, create or migrate the schema on the read-write connection.
///
/// # Errors
///
/// Returns [`SchemaError::IdentityMismatch`] or [`SchemaError::Validation`]
/// when the stored schema drifted from the expected one, and
/// [`SchemaError::MigrationRequired`] when the version differs and the
/// destructive fallback is disabled.
pub fn open_schema(
    conn: &mut Connection,
    options: &OpenOptions<'_>,
) -> Result<OpenOutcome, SchemaError> {
    let identity = options.identity;
    let version = user_version(conn)?;

    let outcome = if version == 0 {
        let tx = conn.transaction()?;
        create_all_tables(&tx, identity)?;
        set_user_version(&tx, identity.version)?;
        tx.commit()?;
        run_callbacks(options.callbacks, |cb| cb.on_create(conn))?;
        tracing::info!(version = identity.version, "Created database schema");
        OpenOutcome::Created
    } else if version != identity.version {
        if !options.destructive_migration {
            return Err(SchemaError::MigrationRequired {
                from: version,
                to: identity.version,
            });
        }
        tracing::warn!(
            from = version,
            to = identity.version,
            "No migration path, recreating database schema"
        );
        let tx = conn.transaction()?;
        pre_migrate(&tx)?;
        drop_all_tables(&tx)?;
        create_all_tables(&tx, identity)?;
        post_migrate(&tx)?;
        set_user_version(&tx, identity.version)?;
        tx.commit()?;
        run_callbacks(options.callbacks, |cb| cb.on_destructive_migration(conn))?;
        OpenOutcome::Recreated { from: version }
    } else {
        match read_identity(conn)? {
            Some(found) if identity.accepts(&found) => {}
            Some(found) => {
                return Err(SchemaError::IdentityMismatch {
                    expected: identity.identity_hash.clone(),
                    found: Some(found),
                })
            }
            None => {
                // Identity never recorded: fall back to checking table shapes.
                let tx = conn.transaction()?;
                post_migrate(&tx)?;
                tx.execute_batch(CREATE_IDENTITY)?;
                write_identity(&tx, &identity.identity_hash)?;
                tx.commit()?;
            }
        }
        tracing::debug!(version, "Validated database schema");
        OpenOutcome::Validated
    };

    run_callbacks(options.callbacks, |cb| cb.on_open(conn))?;
    Ok(outcome)
}

fn pre_migrate(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    let dropped = drop_sync_triggers(tx)?;
    if dropped > 0 {
        tracing::debug!(dropped, "Dropped content sync triggers");
    }
    Ok(())
}

/// Verify the tables left behind by a migration before it commits.
fn post_migrate(tx: &Transaction<'_>) -> Result<(), SchemaError> {
    validate_schema(tx)
}
