//! Storage traits and error types
//!
//! `PageStore` is the persistence contract the crawler consumes. Every
//! writer is idempotent and keyed by URL; implementations own their own
//! locking so workers may call them concurrently through a shared handle.

use crate::storage::{FailureRecord, PageDigest, PageRecord, RunRecord, RunStatus, SearchHit};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Invalid stored timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
pub trait PageStore: Send + Sync {
    // ===== Run Management =====

    /// Creates a new crawl run and returns its ID
    fn create_run(&self, config_hash: &str) -> StorageResult<i64>;

    /// Marks a run finished with its final status and counters
    fn finish_run(
        &self,
        run_id: i64,
        status: RunStatus,
        pages_fetched: u64,
        failures: u64,
    ) -> StorageResult<()>;

    /// Gets the most recent run
    fn latest_run(&self) -> StorageResult<Option<RunRecord>>;

    // ===== Outcomes =====

    /// Inserts or overwrites the page stored under `record.url`
    ///
    /// The page is visible to `search` once this returns. A failure stored
    /// under the same URL by an earlier run is removed.
    fn upsert_page(&self, record: &PageRecord) -> StorageResult<()>;

    /// Inserts or overwrites the failure stored under `url`
    ///
    /// A page stored under the same URL by an earlier run is removed.
    fn record_failure(&self, url: &str, error: &str, time: DateTime<Utc>) -> StorageResult<()>;

    // ===== Queries =====

    fn get_page(&self, url: &str) -> StorageResult<Option<PageRecord>>;

    fn get_failure(&self, url: &str) -> StorageResult<Option<FailureRecord>>;

    fn count_pages(&self) -> StorageResult<u64>;

    fn count_failures(&self) -> StorageResult<u64>;

    /// URLs of every stored page, sorted
    fn page_urls(&self) -> StorageResult<Vec<String>>;

    /// URLs of every stored failure, sorted
    fn failure_urls(&self) -> StorageResult<Vec<String>>;

    /// Most recently fetched pages first
    fn recent_pages(&self, limit: usize) -> StorageResult<Vec<PageRecord>>;

    /// Full-text search ranked by bm25, best match first
    ///
    /// Every whitespace-separated term of `query` must appear; terms are
    /// matched as plain text, never as FTS query syntax.
    fn search(&self, query: &str, limit: usize) -> StorageResult<Vec<SearchHit>>;

    /// Lightweight per-page rows for reporting
    fn page_digests(&self) -> StorageResult<Vec<PageDigest>>;

    /// Failure error strings with their counts, most frequent first
    fn failure_breakdown(&self) -> StorageResult<Vec<(String, u64)>>;
}
