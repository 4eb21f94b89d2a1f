//! Database schema definitions
//!
//! `pages_fts` is an external-content FTS5 index over `pages`. The triggers
//! keep it in step with every insert, update, and delete, so a page is
//! searchable as soon as its upsert commits.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    pages_fetched INTEGER NOT NULL DEFAULT 0,
    failures INTEGER NOT NULL DEFAULT 0
);

-- Successfully fetched pages, keyed by normalized URL
CREATE TABLE IF NOT EXISTS pages (
    url TEXT PRIMARY KEY,
    http_status INTEGER NOT NULL,
    fetch_time TEXT NOT NULL,
    content_type TEXT NOT NULL DEFAULT '',
    title TEXT NOT NULL DEFAULT '',
    meta_description TEXT NOT NULL DEFAULT '',
    meta_keywords TEXT NOT NULL DEFAULT '',
    text_content TEXT NOT NULL DEFAULT '',
    headings TEXT NOT NULL DEFAULT '[]',
    outbound_links TEXT NOT NULL DEFAULT '[]',
    canonical_url TEXT,
    robots_meta TEXT NOT NULL DEFAULT '',
    keywords TEXT NOT NULL DEFAULT '',
    publication_date TEXT,
    raw_html_path TEXT
);

CREATE INDEX IF NOT EXISTS idx_pages_fetch_time ON pages(fetch_time);

CREATE VIRTUAL TABLE IF NOT EXISTS pages_fts
USING fts5(title, text_content, meta_description, content='pages', content_rowid='rowid');

CREATE TRIGGER IF NOT EXISTS pages_ai AFTER INSERT ON pages
BEGIN
    INSERT INTO pages_fts(rowid, title, text_content, meta_description)
    VALUES (new.rowid, new.title, new.text_content, new.meta_description);
END;

CREATE TRIGGER IF NOT EXISTS pages_ad AFTER DELETE ON pages
BEGIN
    INSERT INTO pages_fts(pages_fts, rowid, title, text_content, meta_description)
    VALUES ('delete', old.rowid, old.title, old.text_content, old.meta_description);
END;

CREATE TRIGGER IF NOT EXISTS pages_au AFTER UPDATE ON pages
BEGIN
    INSERT INTO pages_fts(pages_fts, rowid, title, text_content, meta_description)
    VALUES ('delete', old.rowid, old.title, old.text_content, old.meta_description);
    INSERT INTO pages_fts(rowid, title, text_content, meta_description)
    VALUES (new.rowid, new.title, new.text_content, new.meta_description);
END;

-- Terminal failures, keyed by normalized URL
CREATE TABLE IF NOT EXISTS failures (
    url TEXT PRIMARY KEY,
    error TEXT NOT NULL,
    fail_time TEXT NOT NULL
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)
}
