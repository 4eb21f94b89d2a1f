//! Crawler coordinator - crawl run orchestration
//!
//! This module owns one crawl run's lifecycle:
//! - Seeding the frontier
//! - Starting and supervising the worker pool
//! - Detecting completion
//! - Cancellation with a grace period, then force-stop
//! - Run bookkeeping in storage

use crate::config::{validate_crawler_config, CrawlerConfig, UserAgentConfig};
use crate::crawler::fetcher::build_http_client;
use crate::crawler::frontier::Frontier;
use crate::crawler::rate_limiter::HostRateLimiter;
use crate::crawler::retry::RetryPolicy;
use crate::crawler::worker::{run_worker, RunCounters, WorkerContext, MALFORMED_URL};
use crate::state::RunPhase;
use crate::storage::{PageStore, RawStore, RunStatus};
use crate::url::normalize_url;
use crate::ArchiveError;
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// Result of one crawl run
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub run_id: i64,
    pub pages_fetched: u64,
    pub failures: u64,
    pub elapsed: Duration,
    pub cancelled: bool,
    /// URLs dispatched but never recorded, sorted
    pub in_flight_at_shutdown: Vec<String>,
    /// Admitted URLs that were still queued when the frontier closed
    pub pending_dropped: u64,
    pub phase: RunPhase,
}

/// Lifecycle tracker that rejects illegal transitions
#[derive(Debug)]
struct Lifecycle {
    phase: RunPhase,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            phase: RunPhase::Init,
        }
    }

    fn advance(&mut self, next: RunPhase) -> Result<(), ArchiveError> {
        if !self.phase.can_transition_to(next) {
            return Err(ArchiveError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        tracing::debug!("Run phase {} -> {}", self.phase, next);
        self.phase = next;
        Ok(())
    }
}

/// Main crawler structure
///
/// A `Crawler` holds configuration and the storage handle. Each call to
/// `start` builds a fresh frontier, rate limiter, and worker pool, so runs
/// never share state.
pub struct Crawler {
    config: CrawlerConfig,
    user_agent: UserAgentConfig,
    store: Arc<dyn PageStore>,
    raw_store: Option<Arc<RawStore>>,
    config_hash: String,
}

impl Crawler {
    pub fn new(
        config: CrawlerConfig,
        user_agent: UserAgentConfig,
        store: Arc<dyn PageStore>,
    ) -> Self {
        Self {
            config,
            user_agent,
            store,
            raw_store: None,
            config_hash: String::new(),
        }
    }

    /// Stores raw response bodies in `raw_store`
    pub fn with_raw_store(mut self, raw_store: Arc<RawStore>) -> Self {
        self.raw_store = Some(raw_store);
        self
    }

    /// Hash recorded on every run this crawler starts
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = hash.into();
        self
    }

    /// Crawls from `seeds` until the frontier is exhausted
    pub async fn start(&self, seeds: &[String]) -> Result<CrawlSummary, ArchiveError> {
        self.start_with_cancellation(seeds, CancellationToken::new())
            .await
    }

    /// Crawls from `seeds`; cancelling `cancel` stops the run
    ///
    /// After cancellation no new URL is dequeued. In-flight jobs get up to
    /// the grace period to finish; whatever is still running then is aborted
    /// and reported in `in_flight_at_shutdown`.
    ///
    /// Returns an error only for fatal problems: invalid configuration,
    /// client construction, or storage failures.
    pub async fn start_with_cancellation(
        &self,
        seeds: &[String],
        cancel: CancellationToken,
    ) -> Result<CrawlSummary, ArchiveError> {
        validate_crawler_config(&self.config)?;
        let client = build_http_client(&self.user_agent)?;

        let started = Instant::now();
        let mut lifecycle = Lifecycle::new();
        let run_id = self.store.create_run(&self.config_hash)?;
        tracing::info!("Starting crawl run {}", run_id);

        let frontier = Arc::new(Frontier::new(self.config.max_depth, self.config.max_pages));
        let counters = Arc::new(RunCounters::default());
        self.seed(&frontier, &counters, seeds)?;

        let ctx = Arc::new(WorkerContext {
            frontier: Arc::clone(&frontier),
            limiter: Arc::new(HostRateLimiter::new(self.config.per_host_delay())),
            client,
            store: Arc::clone(&self.store),
            raw_store: self.raw_store.clone(),
            retry: RetryPolicy {
                retry_limit: self.config.retry_limit,
                base: self.config.backoff_base(),
                cap: self.config.max_backoff(),
            },
            request_timeout: self.config.request_timeout(),
            max_body_size: self.config.max_body_size,
            max_redirects: self.config.max_redirects,
            counters: Arc::clone(&counters),
        });

        // Tripped by the caller's token or by a fatal worker error
        let run_token = cancel.child_token();
        let mut workers = JoinSet::new();
        for id in 0..self.config.max_concurrency as usize {
            workers.spawn(run_worker(id, Arc::clone(&ctx), run_token.clone()));
        }
        lifecycle.advance(RunPhase::Running)?;

        let mut fatal: Option<ArchiveError> = None;
        let mut interrupted = false;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Cancellation requested, stopping crawl");
                    interrupted = true;
                    break;
                }
                joined = workers.join_next() => match joined {
                    None => break,
                    Some(result) => {
                        if let Err(e) = worker_result(result) {
                            tracing::error!("Fatal error, stopping crawl: {}", e);
                            fatal = Some(e);
                            break;
                        }
                        if lifecycle.phase == RunPhase::Running && frontier.is_closed() {
                            lifecycle.advance(RunPhase::Draining)?;
                        }
                    }
                },
            }
        }

        if interrupted || fatal.is_some() {
            run_token.cancel();
            frontier.close();
            lifecycle.advance(RunPhase::Cancelled)?;

            let grace = self.config.grace_period();
            let drained = tokio::time::timeout(grace, async {
                let mut first_error = None;
                while let Some(result) = workers.join_next().await {
                    if let Err(e) = worker_result(result) {
                        first_error.get_or_insert(e);
                    }
                }
                first_error
            })
            .await;

            match drained {
                Ok(error) => {
                    if fatal.is_none() {
                        fatal = error;
                    }
                }
                Err(_) => {
                    tracing::warn!(
                        "Grace period of {:?} elapsed; aborting {} workers",
                        grace,
                        workers.len()
                    );
                    workers.abort_all();
                    while workers.join_next().await.is_some() {}
                }
            }
        } else {
            if lifecycle.phase == RunPhase::Running {
                lifecycle.advance(RunPhase::Draining)?;
            }
            lifecycle.advance(RunPhase::Done)?;
        }

        let stats = frontier.stats();
        let summary = CrawlSummary {
            run_id,
            pages_fetched: counters.pages(),
            failures: counters.failures(),
            elapsed: started.elapsed(),
            cancelled: lifecycle.phase == RunPhase::Cancelled,
            in_flight_at_shutdown: frontier.in_flight_urls(),
            pending_dropped: stats.pending_dropped,
            phase: lifecycle.phase,
        };

        let status = match (&fatal, summary.cancelled) {
            (Some(_), _) => RunStatus::Failed,
            (None, true) => RunStatus::Cancelled,
            (None, false) => RunStatus::Completed,
        };

        if let Some(e) = fatal {
            if let Err(store_err) =
                self.store
                    .finish_run(run_id, status, summary.pages_fetched, summary.failures)
            {
                tracing::warn!("Could not mark run {} failed: {}", run_id, store_err);
            }
            return Err(e);
        }
        self.store
            .finish_run(run_id, status, summary.pages_fetched, summary.failures)?;

        tracing::info!(
            "Crawl run {} finished: {} pages, {} failures in {:.2?}{}",
            run_id,
            summary.pages_fetched,
            summary.failures,
            summary.elapsed,
            if summary.cancelled { " (cancelled)" } else { "" }
        );
        if !summary.in_flight_at_shutdown.is_empty() {
            tracing::warn!(
                "{} URLs were still in flight at shutdown",
                summary.in_flight_at_shutdown.len()
            );
        }

        Ok(summary)
    }

    /// Admits normalized seeds at depth 0; malformed seeds become failures
    fn seed(
        &self,
        frontier: &Frontier,
        counters: &RunCounters,
        seeds: &[String],
    ) -> Result<(), ArchiveError> {
        let unique: BTreeSet<&String> = seeds.iter().collect();
        for seed in unique {
            match normalize_url(seed) {
                Ok(url) => {
                    if frontier.enqueue(url.to_string(), 0) {
                        tracing::debug!("Seeded {}", url);
                    }
                }
                Err(e) => {
                    tracing::warn!("Rejecting seed {}: {}", seed, e);
                    self.store.record_failure(seed, MALFORMED_URL, Utc::now())?;
                    counters.record_failure();
                }
            }
        }
        Ok(())
    }
}

fn worker_result(joined: Result<Result<(), ArchiveError>, JoinError>) -> Result<(), ArchiveError> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(ArchiveError::Worker(e.to_string())),
    }
}
