//! Bookmark store: a SQLite-backed bookmark table with live queries.
//!
//! Bookmarks are keyed by thread URL and persisted in a single `bookmarks`
//! table. The on-disk schema is validated against an expected identity hash
//! every time the database is opened.
//!
//! # Architecture
//!
//! - **Single writer**: all mutations run on a dedicated thread that owns the
//!   only read-write connection, one transaction per command
//! - **Pooled readers**: queries run on an r2d2 pool of read-only connections
//! - **Push invalidation**: the writer publishes changed tables on a broadcast
//!   bus; live queries re-run when a table they observe changes
//!
//! # Modules
//!
//! - [`config`]: CLI and environment configuration
//! - [`dao`]: Typed accessor for the bookmarks table
//! - [`database`]: Connection manager
//! - [`flow`]: Invalidation bus and live queries
//! - [`observability`]: Tracing setup
//! - [`repository`]: Sorting and toggle helpers over the accessor
//! - [`storage`]: SQLite persistence layer
//!
//! # Example
//!
//! ```no_run
//! # async fn demo() -> bookmark_store::Result<()> {
//! use bookmark_store::{Bookmark, Config, Database};
//!
//! let db = Database::open(&Config::in_dir("./data"))?;
//! let dao = db.bookmark_dao();
//! dao.insert(Bookmark::for_thread("g", "12345", "Thread title")).await?;
//! assert!(dao.is_bookmarked("https://boards.4chan.org/g/thread/12345").await?);
//! # Ok(())
//! # }
//! ```

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions,    // dao::BookmarkDao is fine
    clippy::must_use_candidate,         // Not all functions need #[must_use]
    clippy::missing_errors_doc,         // Error docs can be verbose
    clippy::missing_panics_doc,         // Panic docs can be verbose
    clippy::needless_raw_string_hashes  // r#""# is fine for SQL
)]

pub mod config;
pub mod dao;
pub mod database;
pub mod error;
pub mod flow;
pub mod model;
pub mod observability;
pub mod repository;
pub mod storage;

pub use config::Config;
pub use dao::BookmarkDao;
pub use database::{Database, DatabaseBuilder};
pub use error::{Result, StoreError};
pub use flow::live::LiveQuery;
pub use model::Bookmark;
pub use repository::{BookmarkRepository, SortOrder};
pub use storage::schema::{DatabaseCallback, OpenOutcome, SchemaError, SchemaIdentity};
