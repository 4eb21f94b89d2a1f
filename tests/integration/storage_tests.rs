//! Integration tests for the archive store against an on-disk database

use chrono::{Duration, Utc};
use std::collections::BTreeSet;
use sumi_archive::storage::{
    clear_archive, PageRecord, PageStore, RawStore, RunStatus, SqliteStorage,
};
use tempfile::TempDir;

fn page(url: &str, title: &str, text: &str) -> PageRecord {
    PageRecord {
        url: url.to_string(),
        http_status: 200,
        fetch_time: Utc::now(),
        content_type: "text/html".to_string(),
        title: title.to_string(),
        meta_description: String::new(),
        meta_keywords: String::new(),
        text_content: text.to_string(),
        headings: vec![title.to_string()],
        outbound_links: BTreeSet::new(),
        canonical_url: None,
        robots_meta: String::new(),
        keywords: Vec::new(),
        publication_date: None,
        raw_html_path: None,
    }
}

fn open(dir: &TempDir) -> SqliteStorage {
    SqliteStorage::new(&dir.path().join("archive.db")).expect("Failed to open store")
}

#[test]
fn test_upsert_keeps_one_row_per_url() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);

    store
        .upsert_page(&page("http://a.test/", "First", "first body"))
        .unwrap();
    store
        .upsert_page(&page("http://a.test/", "Second", "second body"))
        .unwrap();

    assert_eq!(store.count_pages().unwrap(), 1);
    assert_eq!(
        store.get_page("http://a.test/").unwrap().unwrap().title,
        "Second"
    );
}

#[test]
fn test_search_index_follows_updates() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);

    store
        .upsert_page(&page("http://a.test/", "Pelicans", "pelicans gather at dawn"))
        .unwrap();
    assert_eq!(store.search("pelicans", 10).unwrap().len(), 1);

    store
        .upsert_page(&page("http://a.test/", "Herons", "herons wade at dusk"))
        .unwrap();
    assert!(store.search("pelicans", 10).unwrap().is_empty());

    let hits = store.search("herons", 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].url, "http://a.test/");
    assert_eq!(hits[0].title, "Herons");
}

#[test]
fn test_failures_are_idempotent_and_latest_outcome_wins() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    let earlier = Utc::now() - Duration::seconds(30);

    store
        .record_failure("http://a.test/gone", "HTTP 404", earlier)
        .unwrap();
    store
        .record_failure("http://a.test/gone", "HTTP 410", Utc::now())
        .unwrap();
    assert_eq!(store.count_failures().unwrap(), 1);
    assert_eq!(
        store.get_failure("http://a.test/gone").unwrap().unwrap().error,
        "HTTP 410"
    );

    // A later successful fetch replaces the failure
    store
        .upsert_page(&page("http://a.test/gone", "Back", "back again"))
        .unwrap();
    assert!(store.get_failure("http://a.test/gone").unwrap().is_none());
    assert_eq!(store.failure_urls().unwrap(), Vec::<String>::new());
    assert_eq!(store.page_urls().unwrap(), vec!["http://a.test/gone"]);
}

#[test]
fn test_records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let run_id = {
        let store = open(&dir);
        let run_id = store.create_run("abc123").unwrap();
        store
            .upsert_page(&page("http://a.test/", "Kept", "kept body"))
            .unwrap();
        store
            .finish_run(run_id, RunStatus::Completed, 1, 0)
            .unwrap();
        run_id
    };

    let store = open(&dir);
    let run = store.latest_run().unwrap().unwrap();
    assert_eq!(run.id, run_id);
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.pages_fetched, 1);
    assert!(run.finished_at.is_some());
    assert_eq!(store.get_page("http://a.test/").unwrap().unwrap().title, "Kept");
}

#[tokio::test]
async fn test_clear_archive_removes_database_and_raw_bodies() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("archive.db");
    let raw_dir = dir.path().join("raw");

    {
        let store = SqliteStorage::new(&db_path).unwrap();
        store
            .upsert_page(&page("http://a.test/", "Doomed", "soon gone"))
            .unwrap();
        let raw = RawStore::new(&raw_dir).unwrap();
        raw.write("http://a.test/", b"<html></html>").await.unwrap();
    }
    assert!(db_path.exists());
    assert!(raw_dir.exists());

    clear_archive(&db_path, &raw_dir).unwrap();
    assert!(!db_path.exists());
    assert!(!raw_dir.exists());

    // Clearing twice is fine
    clear_archive(&db_path, &raw_dir).unwrap();

    let store = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(store.count_pages().unwrap(), 0);
}
