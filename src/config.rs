//! Configuration for the bookmark store.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides
//! - Sensible defaults for quick start

use clap::{Args, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Storage and logging options.
#[derive(Args, Debug, Clone)]
pub struct Config {
    /// Data directory for the SQLite database
    #[arg(short, long, env = "BOOKMARKS_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Database file name inside the data directory
    #[arg(long, env = "BOOKMARKS_DB_NAME", default_value = "uchan_database")]
    pub db_name: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "BOOKMARKS_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Size of the reader connection pool
    #[arg(long, env = "BOOKMARKS_READER_POOL_SIZE", default_value_t = 4)]
    pub reader_pool_size: u32,

    /// Size of the write command channel
    #[arg(long, env = "BOOKMARKS_WRITE_CHANNEL_SIZE", default_value_t = 256)]
    pub write_channel_size: usize,

    /// Size of the invalidation channel
    #[arg(long, env = "BOOKMARKS_NOTIFY_CHANNEL_SIZE", default_value_t = 1024)]
    pub notify_channel_size: usize,

    /// Drop and recreate tables when the stored schema version differs
    #[arg(
        long,
        env = "BOOKMARKS_DESTRUCTIVE_MIGRATION",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub destructive_migration: bool,

    /// How often `watch` checks for commits from other processes, in
    /// milliseconds (0 disables)
    #[arg(long, env = "BOOKMARKS_POLL_INTERVAL_MS", default_value_t = 250)]
    pub poll_interval_ms: u64,
}

impl Config {
    /// Default configuration rooted at `data_dir`.
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Full path of the database file.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_name)
    }

    /// Interval for polling external commits, `None` when disabled.
    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_interval_ms > 0).then(|| Duration::from_millis(self.poll_interval_ms))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            db_name: "uchan_database".into(),
            log_level: "info".into(),
            log_format: LogFormat::Text,
            reader_pool_size: 4,
            write_channel_size: 256,
            notify_channel_size: 1024,
            destructive_migration: true,
            poll_interval_ms: 250,
        }
    }
}
