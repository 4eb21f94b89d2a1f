//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use sumi_archive::config::{CrawlerConfig, UserAgentConfig};
use sumi_archive::crawler::Crawler;
use sumi_archive::normalize_url;
use sumi_archive::storage::{PageStore, RawStore, SqliteStorage};
use sumi_archive::RunPhase;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn user_agent() -> UserAgentConfig {
    UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    }
}

/// Fast settings: no politeness delay and millisecond backoff
fn test_config() -> CrawlerConfig {
    CrawlerConfig {
        seeds: Vec::new(),
        max_concurrency: 4,
        max_depth: 3,
        per_host_delay: 0,
        retry_limit: 3,
        request_timeout: 5_000,
        max_body_size: 1024 * 1024,
        backoff_base: 10,
        max_backoff: 100,
        grace_period: 2_000,
        max_redirects: 5,
        max_pages: None,
    }
}

fn new_store() -> (TempDir, Arc<SqliteStorage>) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let store = SqliteStorage::new(&dir.path().join("crawl.db")).expect("Failed to open store");
    (dir, Arc::new(store))
}

fn url_of(server: &MockServer, route: &str) -> String {
    normalize_url(&format!("{}{}", server.uri(), route))
        .expect("Failed to normalize test URL")
        .to_string()
}

fn html_with_links(title: &str, links: &[String]) -> String {
    let anchors: String = links
        .iter()
        .map(|l| format!(r#"<a href="{}">{}</a>"#, l, l))
        .collect();
    format!(
        "<html><head><title>{}</title></head><body><h1>{}</h1>{}</body></html>",
        title, title, anchors
    )
}

async fn mount_page(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html"))
        .mount(server)
        .await;
}

async fn request_counts(server: &MockServer) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for request in server.received_requests().await.unwrap_or_default() {
        *counts.entry(request.url.path().to_string()).or_insert(0) += 1;
    }
    counts
}

async fn recorded_urls(store: &SqliteStorage) -> BTreeSet<String> {
    let mut urls: BTreeSet<String> = store.page_urls().unwrap().into_iter().collect();
    urls.extend(store.failure_urls().unwrap());
    urls
}

/// A directed graph served as `/n<i>` pages; node 0 is the seed
struct LinkGraph {
    edges: Vec<Vec<usize>>,
    /// Nodes answering 404 instead of a page
    dead: BTreeSet<usize>,
}

impl LinkGraph {
    /// Random out-degree 0..=4 per node, including self-loops and cycles
    fn random(seed: u64, nodes: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let edges = (0..nodes)
            .map(|_| {
                let degree = rng.random_range(0..=4);
                (0..degree).map(|_| rng.random_range(0..nodes)).collect()
            })
            .collect();
        Self {
            edges,
            dead: BTreeSet::new(),
        }
    }

    fn route(node: usize) -> String {
        format!("/n{}", node)
    }

    async fn mount(&self, server: &MockServer) {
        for (node, targets) in self.edges.iter().enumerate() {
            if self.dead.contains(&node) {
                Mock::given(method("GET"))
                    .and(path(Self::route(node)))
                    .respond_with(ResponseTemplate::new(404))
                    .mount(server)
                    .await;
                continue;
            }
            let links: Vec<String> = targets.iter().map(|&t| Self::route(t)).collect();
            mount_page(server, &Self::route(node), html_with_links(&format!("Node {}", node), &links))
                .await;
        }
    }

    /// Nodes within `max_depth` hops of node 0; dead nodes have no out-links
    fn reachable(&self, max_depth: u32) -> BTreeSet<usize> {
        let mut depth: HashMap<usize, u32> = HashMap::from([(0, 0)]);
        let mut queue = VecDeque::from([0]);
        while let Some(node) = queue.pop_front() {
            let d = depth[&node];
            if d == max_depth || self.dead.contains(&node) {
                continue;
            }
            for &next in &self.edges[node] {
                if !depth.contains_key(&next) {
                    depth.insert(next, d + 1);
                    queue.push_back(next);
                }
            }
        }
        depth.into_keys().collect()
    }
}

#[tokio::test]
async fn test_scenario_not_found_and_retried_unavailable() {
    let server = MockServer::start().await;

    mount_page(
        &server,
        "/",
        html_with_links("A", &["/b".to_string(), "/c".to_string()]),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    // Two 503s, then the page
    Mock::given(method("GET"))
        .and(path("/c"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_page(&server, "/c", html_with_links("C", &[])).await;

    let (_dir, store) = new_store();
    let crawler = Crawler::new(test_config(), user_agent(), store.clone());
    let summary = crawler
        .start(&[format!("{}/", server.uri())])
        .await
        .expect("Crawl failed");

    assert_eq!(summary.pages_fetched, 2);
    assert_eq!(summary.failures, 1);
    assert!(!summary.cancelled);
    assert_eq!(summary.phase, RunPhase::Done);

    assert!(store.get_page(&url_of(&server, "/")).unwrap().is_some());
    let c = store.get_page(&url_of(&server, "/c")).unwrap().unwrap();
    assert_eq!(c.http_status, 200);
    assert_eq!(c.title, "C");
    assert_eq!(c.content_type, "text/html");

    let b = store.get_failure(&url_of(&server, "/b")).unwrap().unwrap();
    assert_eq!(b.error, "HTTP 404");
    assert!(store.get_page(&url_of(&server, "/b")).unwrap().is_none());

    let counts = request_counts(&server).await;
    assert_eq!(counts.get("/b"), Some(&1), "404 must not be retried");
    assert_eq!(counts.get("/c"), Some(&3));
}

#[tokio::test]
async fn test_depth_limit_on_chain() {
    let server = MockServer::start().await;
    for i in 0..6 {
        let next = vec![format!("/n{}", i + 1)];
        mount_page(&server, &format!("/n{}", i), html_with_links("Chain", &next)).await;
    }

    let (_dir, store) = new_store();
    let config = CrawlerConfig {
        max_depth: 2,
        ..test_config()
    };
    let summary = Crawler::new(config, user_agent(), store.clone())
        .start(&[url_of(&server, "/n0")])
        .await
        .unwrap();

    assert_eq!(summary.pages_fetched, 3);
    let expected: BTreeSet<String> = (0..3).map(|i| url_of(&server, &format!("/n{}", i))).collect();
    assert_eq!(recorded_urls(&store).await, expected);

    let counts = request_counts(&server).await;
    assert!(!counts.contains_key("/n3"));
}

#[tokio::test]
async fn test_random_graphs_fetch_each_url_once_within_depth() {
    for seed in [7u64, 21, 1337, 4242] {
        let server = MockServer::start().await;
        let graph = LinkGraph::random(seed, 30);
        graph.mount(&server).await;

        let (_dir, store) = new_store();
        let config = CrawlerConfig {
            max_concurrency: 8,
            max_depth: 3,
            ..test_config()
        };
        let summary = Crawler::new(config, user_agent(), store.clone())
            .start(&[url_of(&server, "/n0")])
            .await
            .unwrap();

        let expected: BTreeSet<String> = graph
            .reachable(3)
            .into_iter()
            .map(|n| url_of(&server, &LinkGraph::route(n)))
            .collect();
        assert_eq!(recorded_urls(&store).await, expected, "graph seed {}", seed);
        assert_eq!(summary.pages_fetched as usize, expected.len());

        for (route, count) in request_counts(&server).await {
            assert_eq!(count, 1, "{} fetched {} times (graph seed {})", route, count, seed);
        }
    }
}

#[tokio::test]
async fn test_concurrency_does_not_change_recorded_set() {
    let server = MockServer::start().await;
    let mut graph = LinkGraph::random(99, 40);
    graph.dead = (0..40).filter(|n| n % 7 == 3).collect();
    graph.mount(&server).await;

    let mut results = Vec::new();
    for concurrency in [1, 8] {
        let (_dir, store) = new_store();
        let config = CrawlerConfig {
            max_concurrency: concurrency,
            max_depth: 4,
            ..test_config()
        };
        Crawler::new(config, user_agent(), store.clone())
            .start(&[url_of(&server, "/n0")])
            .await
            .unwrap();
        results.push((store.page_urls().unwrap(), store.failure_urls().unwrap()));
    }

    assert_eq!(results[0], results[1]);
}

#[tokio::test]
async fn test_per_host_delay_spaces_requests() {
    let server = MockServer::start().await;
    let children: Vec<String> = (1..10).map(|i| format!("/p{}", i)).collect();
    mount_page(&server, "/", html_with_links("Hub", &children)).await;
    for child in &children {
        mount_page(&server, child, html_with_links("Leaf", &[])).await;
    }

    let (_dir, store) = new_store();
    let config = CrawlerConfig {
        max_concurrency: 4,
        max_depth: 1,
        per_host_delay: 200,
        ..test_config()
    };
    let started = Instant::now();
    let summary = Crawler::new(config, user_agent(), store)
        .start(&[format!("{}/", server.uri())])
        .await
        .unwrap();

    assert_eq!(summary.pages_fetched, 10);
    assert!(
        started.elapsed() >= Duration::from_millis(1800),
        "10 requests finished in {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn test_cancellation_with_jobs_in_flight_respects_grace_period() {
    let server = MockServer::start().await;
    let slow: Vec<String> = (0..5).map(|i| format!("/slow{}", i)).collect();
    mount_page(&server, "/", html_with_links("Hub", &slow)).await;
    for route in &slow {
        Mock::given(method("GET"))
            .and(path(route.as_str()))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
            .mount(&server)
            .await;
    }

    let (_dir, store) = new_store();
    let config = CrawlerConfig {
        max_concurrency: 5,
        max_depth: 1,
        request_timeout: 60_000,
        grace_period: 2_000,
        ..test_config()
    };
    let crawler = Crawler::new(config, user_agent(), store.clone());
    let cancel = CancellationToken::new();
    let seeds = vec![format!("{}/", server.uri())];

    let handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { crawler.start_with_cancellation(&seeds, cancel).await })
    };

    // Wait until all five slow requests have reached the server
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let counts = request_counts(&server).await;
        let in_flight = slow.iter().filter(|r| counts.contains_key(r.as_str())).count();
        if in_flight == 5 {
            break;
        }
        assert!(Instant::now() < deadline, "slow requests never arrived");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let cancelled_at = Instant::now();
    cancel.cancel();
    let summary = handle.await.unwrap().unwrap();
    let shutdown = cancelled_at.elapsed();

    assert!(summary.cancelled);
    assert_eq!(summary.phase, RunPhase::Cancelled);
    assert!(
        shutdown < Duration::from_millis(2_000 + 1_000),
        "shutdown took {:?}",
        shutdown
    );

    let expected: Vec<String> = slow.iter().map(|r| url_of(&server, r)).collect();
    assert_eq!(summary.in_flight_at_shutdown, expected);
    assert_eq!(summary.pages_fetched, 1);
    assert_eq!(store.count_failures().unwrap(), 0);
}

#[tokio::test]
async fn test_redirect_target_also_linked_is_fetched_once() {
    let server = MockServer::start().await;

    for concurrency in [1, 4] {
        // Fresh mocks and request log per run
        server.reset().await;
        mount_page(
            &server,
            "/",
            html_with_links("Home", &["/a".to_string(), "/b".to_string()]),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/b"))
            .mount(&server)
            .await;
        mount_page(&server, "/b", html_with_links("B", &[])).await;

        let (_dir, store) = new_store();
        let config = CrawlerConfig {
            max_concurrency: concurrency,
            ..test_config()
        };
        let summary = Crawler::new(config, user_agent(), store.clone())
            .start(&[format!("{}/", server.uri())])
            .await
            .unwrap();

        let counts = request_counts(&server).await;
        assert_eq!(counts.len(), 3);
        for (route, count) in &counts {
            assert_eq!(*count, 1, "{} fetched {} times", route, count);
        }

        assert_eq!(summary.pages_fetched, 2);
        assert_eq!(
            store.page_urls().unwrap(),
            vec![url_of(&server, "/"), url_of(&server, "/b")]
        );
        let moved = store.get_failure(&url_of(&server, "/a")).unwrap().unwrap();
        assert_eq!(moved.error, "HTTP 301");
    }
}

#[tokio::test]
async fn test_unlinked_redirect_target_is_crawled() {
    let server = MockServer::start().await;
    mount_page(&server, "/", html_with_links("Home", &["/old".to_string()])).await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(308).insert_header("location", "/new"))
        .mount(&server)
        .await;
    mount_page(&server, "/new", html_with_links("New", &[])).await;

    let (_dir, store) = new_store();
    let config = CrawlerConfig {
        max_depth: 1,
        ..test_config()
    };
    Crawler::new(config, user_agent(), store.clone())
        .start(&[format!("{}/", server.uri())])
        .await
        .unwrap();

    // The target sits at the depth of the link that redirected to it
    let page = store.get_page(&url_of(&server, "/new")).unwrap().unwrap();
    assert_eq!(page.title, "New");
    assert_eq!(
        store.get_failure(&url_of(&server, "/old")).unwrap().unwrap().error,
        "HTTP 308"
    );
}

#[tokio::test]
async fn test_redirect_chain_past_limit() {
    let server = MockServer::start().await;
    for hop in 0..5 {
        Mock::given(method("GET"))
            .and(path(format!("/hop{}", hop)))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", format!("/hop{}", hop + 1).as_str()),
            )
            .mount(&server)
            .await;
    }

    let (_dir, store) = new_store();
    let config = CrawlerConfig {
        max_redirects: 2,
        ..test_config()
    };
    let summary = Crawler::new(config, user_agent(), store.clone())
        .start(&[url_of(&server, "/hop0")])
        .await
        .unwrap();

    assert_eq!(summary.pages_fetched, 0);
    assert_eq!(summary.failures, 3);
    assert_eq!(
        store.get_failure(&url_of(&server, "/hop2")).unwrap().unwrap().error,
        "TooManyRedirects"
    );
    assert!(!request_counts(&server).await.contains_key("/hop3"));
}

#[tokio::test]
async fn test_max_pages_closes_frontier() {
    let server = MockServer::start().await;
    let children: Vec<String> = (0..10).map(|i| format!("/c{}", i)).collect();
    mount_page(&server, "/", html_with_links("Hub", &children)).await;
    for child in &children {
        mount_page(&server, child, html_with_links("Leaf", &[])).await;
    }

    let (_dir, store) = new_store();
    let config = CrawlerConfig {
        max_concurrency: 1,
        max_depth: 1,
        max_pages: Some(3),
        ..test_config()
    };
    let summary = Crawler::new(config, user_agent(), store.clone())
        .start(&[format!("{}/", server.uri())])
        .await
        .unwrap();

    assert_eq!(summary.pages_fetched, 3);
    assert_eq!(summary.pending_dropped, 8);
    assert_eq!(summary.phase, RunPhase::Done);
    assert!(!summary.cancelled);
    assert_eq!(store.count_pages().unwrap(), 3);
}

#[tokio::test]
async fn test_oversized_body_recorded_as_too_large() {
    let server = MockServer::start().await;
    mount_page(&server, "/", html_with_links("Home", &["/big".to_string()])).await;
    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(8 * 1024)))
        .mount(&server)
        .await;

    let (_dir, store) = new_store();
    let config = CrawlerConfig {
        max_body_size: 4 * 1024,
        ..test_config()
    };
    let summary = Crawler::new(config, user_agent(), store.clone())
        .start(&[format!("{}/", server.uri())])
        .await
        .unwrap();

    assert_eq!(summary.pages_fetched, 1);
    assert_eq!(summary.failures, 1);
    let failure = store.get_failure(&url_of(&server, "/big")).unwrap().unwrap();
    assert_eq!(failure.error, "TooLarge");
}

#[tokio::test]
async fn test_raw_bodies_and_search_after_crawl() {
    let server = MockServer::start().await;
    let body = r#"<html><head><title>Otter Facts</title>
        <meta name="description" content="All about otters"></head>
        <body><p>Sea otters hold hands while sleeping.</p></body></html>"#;
    mount_page(&server, "/", body.to_string()).await;

    let (dir, store) = new_store();
    let raw = Arc::new(RawStore::new(dir.path().join("raw")).unwrap());
    Crawler::new(test_config(), user_agent(), store.clone())
        .with_raw_store(raw.clone())
        .with_config_hash("hash")
        .start(&[format!("{}/", server.uri())])
        .await
        .unwrap();

    let page = store.get_page(&url_of(&server, "/")).unwrap().unwrap();
    assert_eq!(page.title, "Otter Facts");
    assert_eq!(page.meta_description, "All about otters");
    let raw_path = page.raw_html_path.expect("raw path recorded");
    assert_eq!(std::fs::read_to_string(&raw_path).unwrap(), body);
    assert_eq!(
        std::path::PathBuf::from(&raw_path),
        raw.path_for(&url_of(&server, "/"))
    );

    let hits = store.search("sleeping", 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].url, url_of(&server, "/"));
}
