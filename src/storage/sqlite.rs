//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the `PageStore` trait.
//! The connection sits behind a mutex so one store can be shared by every
//! worker; each write is a single short transaction.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{PageStore, StorageError, StorageResult};
use crate::storage::{FailureRecord, PageDigest, PageRecord, RunRecord, RunStatus, SearchHit};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

const PAGE_COLUMNS: &str = "url, http_status, fetch_time, content_type, title, meta_description,
     meta_keywords, text_content, headings, outbound_links, canonical_url, robots_meta,
     keywords, publication_date, raw_html_path";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn query_pages(&self, sql: &str, params: impl rusqlite::Params) -> StorageResult<Vec<PageRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, PageRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(PageRow::into_record).collect()
    }
}

/// Column values of one `pages` row before JSON and timestamp decoding
struct PageRow {
    url: String,
    http_status: u16,
    fetch_time: String,
    content_type: String,
    title: String,
    meta_description: String,
    meta_keywords: String,
    text_content: String,
    headings: String,
    outbound_links: String,
    canonical_url: Option<String>,
    robots_meta: String,
    keywords: String,
    publication_date: Option<String>,
    raw_html_path: Option<String>,
}

impl PageRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            url: row.get(0)?,
            http_status: row.get(1)?,
            fetch_time: row.get(2)?,
            content_type: row.get(3)?,
            title: row.get(4)?,
            meta_description: row.get(5)?,
            meta_keywords: row.get(6)?,
            text_content: row.get(7)?,
            headings: row.get(8)?,
            outbound_links: row.get(9)?,
            canonical_url: row.get(10)?,
            robots_meta: row.get(11)?,
            keywords: row.get(12)?,
            publication_date: row.get(13)?,
            raw_html_path: row.get(14)?,
        })
    }

    fn into_record(self) -> StorageResult<PageRecord> {
        Ok(PageRecord {
            fetch_time: parse_time(&self.fetch_time)?,
            headings: serde_json::from_str(&self.headings)?,
            outbound_links: serde_json::from_str::<BTreeSet<String>>(&self.outbound_links)?,
            keywords: split_keywords(&self.keywords),
            url: self.url,
            http_status: self.http_status,
            content_type: self.content_type,
            title: self.title,
            meta_description: self.meta_description,
            meta_keywords: self.meta_keywords,
            text_content: self.text_content,
            canonical_url: self.canonical_url,
            robots_meta: self.robots_meta,
            publication_date: self.publication_date,
            raw_html_path: self.raw_html_path,
        })
    }
}

fn parse_time(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidTimestamp(format!("{}: {}", value, e)))
}

fn split_keywords(value: &str) -> Vec<String> {
    value
        .split(',')
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

fn map_run(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Failed),
        pages_fetched: row.get::<_, i64>(5)? as u64,
        failures: row.get::<_, i64>(6)? as u64,
    })
}

impl PageStore for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&self, config_hash: &str) -> StorageResult<i64> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn finish_run(
        &self,
        run_id: i64,
        status: RunStatus,
        pages_fetched: u64,
        failures: u64,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn().execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, pages_fetched = ?3, failures = ?4
             WHERE id = ?5",
            params![
                status.to_db_string(),
                now,
                pages_fetched as i64,
                failures as i64,
                run_id
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn()
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status, pages_fetched, failures
                 FROM runs ORDER BY id DESC LIMIT 1",
                [],
                map_run,
            )
            .optional()?;
        Ok(run)
    }

    // ===== Outcomes =====

    fn upsert_page(&self, record: &PageRecord) -> StorageResult<()> {
        let headings = serde_json::to_string(&record.headings)?;
        let links = serde_json::to_string(&record.outbound_links)?;
        let keywords = record.keywords.join(",");

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM failures WHERE url = ?1", params![record.url])?;
        tx.execute(
            "INSERT INTO pages (url, http_status, fetch_time, content_type, title,
                 meta_description, meta_keywords, text_content, headings, outbound_links,
                 canonical_url, robots_meta, keywords, publication_date, raw_html_path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(url) DO UPDATE SET
                 http_status = excluded.http_status,
                 fetch_time = excluded.fetch_time,
                 content_type = excluded.content_type,
                 title = excluded.title,
                 meta_description = excluded.meta_description,
                 meta_keywords = excluded.meta_keywords,
                 text_content = excluded.text_content,
                 headings = excluded.headings,
                 outbound_links = excluded.outbound_links,
                 canonical_url = excluded.canonical_url,
                 robots_meta = excluded.robots_meta,
                 keywords = excluded.keywords,
                 publication_date = excluded.publication_date,
                 raw_html_path = excluded.raw_html_path",
            params![
                record.url,
                record.http_status,
                record.fetch_time.to_rfc3339(),
                record.content_type,
                record.title,
                record.meta_description,
                record.meta_keywords,
                record.text_content,
                headings,
                links,
                record.canonical_url,
                record.robots_meta,
                keywords,
                record.publication_date,
                record.raw_html_path,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn record_failure(&self, url: &str, error: &str, time: DateTime<Utc>) -> StorageResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM pages WHERE url = ?1", params![url])?;
        tx.execute(
            "INSERT INTO failures (url, error, fail_time) VALUES (?1, ?2, ?3)
             ON CONFLICT(url) DO UPDATE SET error = excluded.error, fail_time = excluded.fail_time",
            params![url, error, time.to_rfc3339()],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ===== Queries =====

    fn get_page(&self, url: &str) -> StorageResult<Option<PageRecord>> {
        let sql = format!("SELECT {} FROM pages WHERE url = ?1", PAGE_COLUMNS);
        Ok(self.query_pages(&sql, params![url])?.into_iter().next())
    }

    fn get_failure(&self, url: &str) -> StorageResult<Option<FailureRecord>> {
        let row = self
            .conn()
            .query_row(
                "SELECT url, error, fail_time FROM failures WHERE url = ?1",
                params![url],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(url, error, fail_time)| {
            Ok(FailureRecord {
                url,
                error,
                fail_time: parse_time(&fail_time)?,
            })
        })
        .transpose()
    }

    fn count_pages(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM pages", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_failures(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM failures", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn page_urls(&self) -> StorageResult<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT url FROM pages ORDER BY url")?;
        let urls = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(urls)
    }

    fn failure_urls(&self) -> StorageResult<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT url FROM failures ORDER BY url")?;
        let urls = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(urls)
    }

    fn recent_pages(&self, limit: usize) -> StorageResult<Vec<PageRecord>> {
        let sql = format!(
            "SELECT {} FROM pages ORDER BY fetch_time DESC, url LIMIT ?1",
            PAGE_COLUMNS
        );
        self.query_pages(&sql, params![limit as i64])
    }

    fn search(&self, query: &str, limit: usize) -> StorageResult<Vec<SearchHit>> {
        let Some(expression) = match_expression(query) else {
            return Ok(Vec::new());
        };

        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT p.url, p.title, p.meta_description,
                    snippet(pages_fts, -1, '[', ']', '…', 10),
                    bm25(pages_fts) AS rank
             FROM pages_fts
             JOIN pages p ON p.rowid = pages_fts.rowid
             WHERE pages_fts MATCH ?1
             ORDER BY rank
             LIMIT ?2",
        )?;

        let hits = stmt
            .query_map(params![expression, limit as i64], |row| {
                Ok(SearchHit {
                    url: row.get(0)?,
                    title: row.get(1)?,
                    meta_description: row.get(2)?,
                    snippet: row.get(3)?,
                    rank: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(hits)
    }

    fn page_digests(&self) -> StorageResult<Vec<PageDigest>> {
        let rows = {
            let conn = self.conn();
            let mut stmt = conn.prepare(
                "SELECT url, http_status, content_type, fetch_time, keywords, headings,
                        outbound_links, raw_html_path
                 FROM pages ORDER BY fetch_time",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, u16>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, Option<String>>(7)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        rows.into_iter()
            .map(
                |(url, http_status, content_type, fetch_time, keywords, headings, links, raw)| {
                    let headings: Vec<String> = serde_json::from_str(&headings)?;
                    let links: Vec<String> = serde_json::from_str(&links)?;
                    Ok(PageDigest {
                        url,
                        http_status,
                        content_type,
                        fetch_time: parse_time(&fetch_time)?,
                        keywords: split_keywords(&keywords),
                        heading_count: headings.len(),
                        link_count: links.len(),
                        raw_html_path: raw,
                    })
                },
            )
            .collect()
    }

    fn failure_breakdown(&self) -> StorageResult<Vec<(String, u64)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT error, COUNT(*) AS n FROM failures GROUP BY error ORDER BY n DESC, error",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// Turns free text into an FTS5 expression matching every term
///
/// Each whitespace-separated term becomes a quoted string, so punctuation
/// such as `-` or `:` is tokenized as text instead of parsed as query syntax.
/// Returns None for a blank query.
fn match_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}
