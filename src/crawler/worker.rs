//! Fetch worker loop
//!
//! A worker repeatedly takes an entry from the frontier, waits for the host's
//! politeness slot, fetches with retry, and hands the result to the parse and
//! persistence steps. A page's record is written before its links are offered
//! back to the frontier.
//!
//! Only storage errors escape a worker; they are fatal to the run. Every
//! per-URL problem ends as a failure record.
//!
//! A redirect to a different URL is recorded as `HTTP <code>` for the source
//! and the target is offered to the frontier, so it is deduplicated and
//! rate-limited like a discovered link. A redirect whose target normalizes to
//! the same URL (such as a trailing-slash redirect) is followed in place, taking
//! the host's slot again for each hop.

use crate::crawler::fetcher::{fetch_page, FetchOutcome, FetchedPage};
use crate::crawler::frontier::{Frontier, FrontierEntry};
use crate::crawler::parser::parse_page;
use crate::crawler::rate_limiter::HostRateLimiter;
use crate::crawler::retry::RetryPolicy;
use crate::state::UrlState;
use crate::storage::{PageRecord, PageStore, RawStore};
use crate::url::{host_key, normalize_url};
use crate::ArchiveError;
use chrono::Utc;
use reqwest::Client;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Error string recorded for a URL that cannot be fetched at all
pub const MALFORMED_URL: &str = "MalformedUrl";

/// Error string recorded once a URL is reached through too many redirects
pub const TOO_MANY_REDIRECTS: &str = "TooManyRedirects";

/// How one dequeued URL ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Stored as a page; carries the normalized outbound links
    Fetched(BTreeSet<String>),

    /// Stored as a failure with this error
    Failed(String),

    /// Cancelled before an outcome was stored; the URL stays in flight
    Abandoned,
}

/// Outcome counters shared by every worker in a run
#[derive(Debug, Default)]
pub struct RunCounters {
    pages: AtomicU64,
    failures: AtomicU64,
}

impl RunCounters {
    /// Returns the new page total
    pub fn record_page(&self) -> u64 {
        self.pages.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_failure(&self) -> u64 {
        self.failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn pages(&self) -> u64 {
        self.pages.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Everything a worker needs, shared across the pool
pub struct WorkerContext {
    pub frontier: Arc<Frontier>,
    pub limiter: Arc<HostRateLimiter>,
    pub client: Client,
    pub store: Arc<dyn PageStore>,
    pub raw_store: Option<Arc<RawStore>>,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub max_body_size: u64,
    /// Redirect hops allowed from a discovered URL to its content
    pub max_redirects: u32,
    pub counters: Arc<RunCounters>,
}

/// Runs one worker until the frontier is done or `cancel` fires
pub async fn run_worker(
    id: usize,
    ctx: Arc<WorkerContext>,
    cancel: CancellationToken,
) -> Result<(), ArchiveError> {
    tracing::trace!("Worker {} started", id);

    while let Some(entry) = ctx.frontier.next_entry(&cancel).await {
        tracing::debug!("Worker {} processing {} (depth {})", id, entry.url, entry.depth);

        match process_entry(&ctx, &entry, &cancel).await? {
            JobOutcome::Fetched(links) => {
                let queued = ctx.frontier.offer_links(&entry.url, links);
                ctx.frontier.finish(&entry.url, UrlState::Fetched);

                let pages = ctx.counters.record_page();
                tracing::trace!("{} new URLs queued from {}", queued, entry.url);
                if pages % 10 == 0 {
                    let stats = ctx.frontier.stats();
                    tracing::info!(
                        "Progress: {} pages fetched, {} queued, {} in flight",
                        pages,
                        stats.queued,
                        stats.in_flight
                    );
                }
            }
            JobOutcome::Failed(_) => {
                ctx.frontier.finish(&entry.url, UrlState::Failed);
                ctx.counters.record_failure();
            }
            JobOutcome::Abandoned => {
                tracing::debug!("Worker {} abandoned {}", id, entry.url);
                break;
            }
        }
    }

    tracing::trace!("Worker {} stopped", id);
    Ok(())
}

/// Fetches, parses, and stores one entry
async fn process_entry(
    ctx: &WorkerContext,
    entry: &FrontierEntry,
    cancel: &CancellationToken,
) -> Result<JobOutcome, ArchiveError> {
    let target = Url::parse(&entry.url).ok();
    let Some((mut url, mut host)) = target.and_then(|url| host_key(&url).map(|host| (url, host)))
    else {
        return fail(ctx, &entry.url, MALFORMED_URL.to_string());
    };

    let mut attempt = 0;
    let mut redirects = entry.redirects;
    let page = loop {
        if cancel.is_cancelled() {
            return Ok(JobOutcome::Abandoned);
        }

        tokio::select! {
            _ = cancel.cancelled() => return Ok(JobOutcome::Abandoned),
            waited = ctx.limiter.acquire(&host) => {
                if !waited.is_zero() {
                    tracing::trace!("Waited {:?} for {}", waited, host);
                }
            }
        }

        if cancel.is_cancelled() {
            return Ok(JobOutcome::Abandoned);
        }

        let outcome = fetch_page(&ctx.client, &url, ctx.request_timeout, ctx.max_body_size).await;
        match outcome {
            FetchOutcome::Success(page) => break page,
            FetchOutcome::Redirect { status, location } => {
                if redirects >= ctx.max_redirects {
                    return fail(ctx, &entry.url, TOO_MANY_REDIRECTS.to_string());
                }
                redirects += 1;

                let Some((next, next_host)) = normalize_url(location.as_str())
                    .ok()
                    .and_then(|next| host_key(&next).map(|host| (next, host)))
                else {
                    return fail(ctx, &entry.url, MALFORMED_URL.to_string());
                };

                if next.as_str() == entry.url {
                    tracing::debug!("{} redirects to itself as {}", entry.url, location);
                    url = location;
                    host = next_host;
                    attempt = 0;
                    continue;
                }

                let error = format!("HTTP {}", status);
                tracing::debug!("{} redirects to {}", entry.url, next);
                ctx.store.record_failure(&entry.url, &error, Utc::now())?;
                ctx.frontier.offer_redirect(&entry.url, next.to_string());
                return Ok(JobOutcome::Failed(error));
            }
            FetchOutcome::Permanent { error } => return fail(ctx, &entry.url, error),
            FetchOutcome::Transient { error, retry_after } => {
                if !ctx.retry.should_retry(attempt) {
                    return fail(ctx, &entry.url, error);
                }

                let delay = ctx.retry.delay_for(attempt, retry_after);
                tracing::warn!(
                    "{} for {} (attempt {}), retrying in {:?}",
                    error,
                    entry.url,
                    attempt + 1,
                    delay
                );

                tokio::select! {
                    _ = cancel.cancelled() => return Ok(JobOutcome::Abandoned),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
        }
    };

    store_page(ctx, entry, page).await
}

async fn store_page(
    ctx: &WorkerContext,
    entry: &FrontierEntry,
    page: FetchedPage,
) -> Result<JobOutcome, ArchiveError> {
    let raw_html_path = match &ctx.raw_store {
        Some(raw) => Some(raw.write(&entry.url, &page.body).await?),
        None => None,
    };

    let parsed = parse_page(&page.final_url, &page.body);
    let links: BTreeSet<String> = parsed
        .outbound_links
        .iter()
        .filter_map(|link| normalize_url(link).ok())
        .map(|url| url.to_string())
        .collect();

    let record = PageRecord {
        url: entry.url.clone(),
        http_status: page.status,
        fetch_time: Utc::now(),
        content_type: page.content_type,
        title: parsed.title,
        meta_description: parsed.meta_description,
        meta_keywords: parsed.meta_keywords,
        text_content: parsed.text_content,
        headings: parsed.headings,
        outbound_links: links.clone(),
        canonical_url: parsed.canonical_url,
        robots_meta: parsed.robots_meta,
        keywords: parsed.keywords,
        publication_date: parsed.publication_date,
        raw_html_path: raw_html_path.map(|p| p.to_string_lossy().into_owned()),
    };
    ctx.store.upsert_page(&record)?;

    tracing::debug!("Stored {} ({} links)", entry.url, links.len());
    Ok(JobOutcome::Fetched(links))
}

fn fail(ctx: &WorkerContext, url: &str, error: String) -> Result<JobOutcome, ArchiveError> {
    tracing::warn!("Failed {}: {}", url, error);
    ctx.store.record_failure(url, &error, Utc::now())?;
    Ok(JobOutcome::Failed(error))
}
