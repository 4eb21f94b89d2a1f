//! Storage module for persisting crawl outcomes
//!
//! This module handles all database operations for the archiver, including:
//! - SQLite database initialization and schema management
//! - Page and failure records keyed by normalized URL
//! - Full-text indexing of page content
//! - Run tracking
//! - Raw response bodies on disk

mod raw;
mod schema;
mod sqlite;
mod traits;

pub use raw::RawStore;
pub use sqlite::SqliteStorage;
pub use traits::{PageStore, StorageError, StorageResult};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

/// A successfully fetched and parsed page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageRecord {
    pub url: String,
    pub http_status: u16,
    pub fetch_time: DateTime<Utc>,
    pub content_type: String,
    pub title: String,
    pub meta_description: String,
    pub meta_keywords: String,
    pub text_content: String,
    pub headings: Vec<String>,
    pub outbound_links: BTreeSet<String>,
    pub canonical_url: Option<String>,
    pub robots_meta: String,
    pub keywords: Vec<String>,
    pub publication_date: Option<String>,
    pub raw_html_path: Option<String>,
}

/// A URL whose fetch ended in a terminal failure
#[derive(Debug, Clone, PartialEq)]
pub struct FailureRecord {
    pub url: String,
    pub error: String,
    pub fail_time: DateTime<Utc>,
}

/// One full-text search result
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub meta_description: String,
    /// Matched excerpt with hits wrapped in `[` and `]`
    pub snippet: String,
    /// bm25 score; lower is a better match
    pub rank: f64,
}

/// Per-page summary row used by the statistics report
#[derive(Debug, Clone)]
pub struct PageDigest {
    pub url: String,
    pub http_status: u16,
    pub content_type: String,
    pub fetch_time: DateTime<Utc>,
    pub keywords: Vec<String>,
    pub heading_count: usize,
    pub link_count: usize,
    pub raw_html_path: Option<String>,
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub pages_fetched: u64,
    pub failures: u64,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Removes the database (with its WAL side files) and every raw body
///
/// Missing files are not an error, so clearing an empty archive succeeds.
///
/// # Arguments
///
/// * `database_path` - Path of the SQLite database file
/// * `raw_html_dir` - Directory holding the raw response bodies
pub fn clear_archive(database_path: &Path, raw_html_dir: &Path) -> std::io::Result<()> {
    let mut targets = vec![database_path.to_path_buf()];
    for suffix in ["-wal", "-shm"] {
        let mut side = database_path.as_os_str().to_owned();
        side.push(suffix);
        targets.push(side.into());
    }

    for target in targets {
        match std::fs::remove_file(&target) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e),
            _ => {}
        }
    }

    match std::fs::remove_dir_all(raw_html_dir) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
