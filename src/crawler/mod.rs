//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - The frontier and dedup set
//! - Per-host politeness control
//! - HTTP fetching with retry and backoff
//! - HTML parsing, link extraction, and keyword selection
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod frontier;
mod keywords;
mod parser;
mod rate_limiter;
mod retry;
mod worker;

pub use coordinator::{CrawlSummary, Crawler};
pub use fetcher::{build_http_client, fetch_page, FetchOutcome, FetchedPage, TOO_LARGE};
pub use frontier::{Dequeue, Frontier, FrontierEntry, FrontierStats};
pub use keywords::extract_keywords;
pub use parser::{parse_page, ParsedPage};
pub use rate_limiter::HostRateLimiter;
pub use retry::{backoff_delay, parse_retry_after, RetryPolicy};
pub use worker::{JobOutcome, MALFORMED_URL};
