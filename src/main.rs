//! bookmarks: command-line interface for the bookmark store.
//!
//! # Usage
//!
//! ```bash
//! bookmarks --data-dir ./data add https://boards.4chan.org/g/thread/1 --board g --thread 1 --title "hello"
//! bookmarks list --sort oldest --json
//! bookmarks watch
//! ```
//!
//! Environment variables can also be used:
//! - `BOOKMARKS_DATA_DIR`: Data directory for SQLite
//! - `BOOKMARKS_POLL_INTERVAL_MS`: How often `watch` looks for changes made by other processes
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

use anyhow::{Context, Result};
use bookmark_store::model::now_millis;
use bookmark_store::observability::tracing::init_tracing;
use bookmark_store::{Bookmark, BookmarkRepository, Config, Database, SortOrder};
use clap::{Parser, Subcommand};
use futures::StreamExt;

/// Command-line interface for the bookmark store.
#[derive(Parser)]
#[command(name = "bookmarks")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add or replace a bookmark
    Add {
        /// Thread URL (bookmark key)
        url: String,
        /// Board id
        #[arg(short, long)]
        board: String,
        /// Thread id
        #[arg(short, long)]
        thread: String,
        /// Title shown in listings
        #[arg(long, default_value = "")]
        title: String,
        /// Epoch millis, defaults to now
        #[arg(long)]
        timestamp: Option<i64>,
    },
    /// Remove a bookmark by URL
    Remove {
        url: String,
    },
    /// List bookmarks
    List {
        #[arg(short, long, value_enum, default_value_t = SortOrder::Newest)]
        sort: SortOrder,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Check whether a URL is bookmarked
    Check {
        url: String,
    },
    /// Delete every bookmark and compact the database
    Clear,
    /// Print the bookmark list every time it changes
    Watch {
        #[arg(short, long, value_enum, default_value_t = SortOrder::Newest)]
        sort: SortOrder,
    },
}

fn print_bookmarks(bookmarks: &[Bookmark], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(bookmarks)?);
        return Ok(());
    }
    if bookmarks.is_empty() {
        println!("No bookmarks yet");
    }
    for bookmark in bookmarks {
        println!(
            "/{}/ {}  {}  ({})",
            bookmark.board_id, bookmark.title, bookmark.url, bookmark.timestamp
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.config.log_level, cli.config.log_format);

    let db = Database::open(&cli.config)
        .with_context(|| format!("failed to open {}", cli.config.db_path().display()))?;
    let repository = BookmarkRepository::new(db.bookmark_dao().clone());

    match cli.command {
        Commands::Add {
            url,
            board,
            thread,
            title,
            timestamp,
        } => {
            let bookmark = Bookmark {
                url,
                board_id: board,
                thread_id: thread,
                title,
                timestamp: timestamp.unwrap_or_else(now_millis),
            };
            repository.add_bookmark(bookmark).await?;
        }
        Commands::Remove { url } => {
            repository.remove_bookmark_by_url(&url).await?;
        }
        Commands::List { sort, json } => {
            let mut snapshots = repository.all_bookmarks(sort);
            let bookmarks = snapshots
                .next()
                .await
                .context("bookmark query ended without a snapshot")??;
            print_bookmarks(&bookmarks, json)?;
        }
        Commands::Check { url } => {
            let bookmarked = repository.is_bookmarked(&url).await?;
            println!("{bookmarked}");
        }
        Commands::Clear => {
            db.clear_all().await?;
        }
        Commands::Watch { sort } => {
            // Other processes write through their own connections.
            let _poller = cli
                .config
                .poll_interval()
                .map(|interval| db.spawn_change_poller(interval));
            let mut snapshots = repository.all_bookmarks(sort);
            loop {
                tokio::select! {
                    snapshot = snapshots.next() => match snapshot {
                        Some(bookmarks) => {
                            print_bookmarks(&bookmarks?, false)?;
                            println!("---");
                        }
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Received Ctrl+C, stopping watch");
                        break;
                    }
                }
            }
        }
    }

    db.close().await?;
    Ok(())
}
