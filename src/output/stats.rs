//! Statistics generation from the archive database
//!
//! This module provides functionality for extracting archive statistics
//! from the storage layer.

use crate::storage::{PageStore, StorageResult};
use crate::url::host_key;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use url::Url;

/// Default width of one activity bucket
pub const DEFAULT_BUCKET: Duration = Duration::from_secs(5);

/// Size figures for stored raw bodies, in KiB
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SizeSummary {
    pub avg_kib: f64,
    pub median_kib: f64,
    pub min_kib: f64,
    pub max_kib: f64,
}

/// Archive statistics summary
#[derive(Debug, Clone, Default)]
pub struct ArchiveStatistics {
    pub pages_total: u64,

    /// Share of pages stored with status 200, in `[0, 1]`
    pub http_200_rate: f64,

    pub status_breakdown: BTreeMap<u16, u64>,
    pub content_type_breakdown: BTreeMap<String, u64>,

    pub keywords_unique: usize,
    pub avg_keywords_per_page: f64,
    pub pages_with_keywords: u64,
    pub pages_without_keywords: u64,

    pub avg_headings_per_page: f64,
    pub avg_outbound_links_per_page: f64,

    pub raw_size: SizeSummary,

    pub failures_total: u64,
    /// Most frequent failure errors, at most five
    pub top_failures: Vec<(String, u64)>,
    /// Most frequent keywords, at most ten
    pub top_keywords: Vec<(String, u64)>,
    /// Hosts with the most pages, at most five
    pub top_hosts: Vec<(String, u64)>,
}

/// One point of the cumulative activity series
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityPoint {
    pub bucket_start: DateTime<Utc>,
    pub pages_cumulative: u64,
    pub links_cumulative: u64,
}

/// Loads statistics from storage
///
/// Raw body sizes come from the files each page references; pages without
/// a stored body, or whose file has gone missing, are left out of the size
/// figures.
pub fn load_statistics(store: &dyn PageStore) -> StorageResult<ArchiveStatistics> {
    let digests = store.page_digests()?;
    let pages_total = digests.len() as u64;

    let mut stats = ArchiveStatistics {
        pages_total,
        failures_total: store.count_failures()?,
        top_failures: store.failure_breakdown()?.into_iter().take(5).collect(),
        ..ArchiveStatistics::default()
    };

    let mut keyword_counts: Vec<(String, u64)> = Vec::new();
    let mut keyword_index: HashMap<String, usize> = HashMap::new();
    let mut host_counts: HashMap<String, u64> = HashMap::new();
    let mut total_keywords = 0usize;
    let mut total_headings = 0usize;
    let mut total_links = 0usize;
    let mut sizes = Vec::new();

    for digest in &digests {
        *stats.status_breakdown.entry(digest.http_status).or_default() += 1;
        *stats
            .content_type_breakdown
            .entry(digest.content_type.clone())
            .or_default() += 1;

        if digest.keywords.is_empty() {
            stats.pages_without_keywords += 1;
        } else {
            stats.pages_with_keywords += 1;
        }
        total_keywords += digest.keywords.len();
        for keyword in &digest.keywords {
            match keyword_index.get(keyword) {
                Some(&i) => keyword_counts[i].1 += 1,
                None => {
                    keyword_index.insert(keyword.clone(), keyword_counts.len());
                    keyword_counts.push((keyword.clone(), 1));
                }
            }
        }

        total_headings += digest.heading_count;
        total_links += digest.link_count;

        if let Some(host) = Url::parse(&digest.url).ok().as_ref().and_then(host_key) {
            *host_counts.entry(host).or_default() += 1;
        }

        if let Some(path) = &digest.raw_html_path {
            if let Ok(meta) = std::fs::metadata(path) {
                sizes.push(meta.len() as f64 / 1024.0);
            }
        }
    }

    if pages_total > 0 {
        let n = pages_total as f64;
        let ok = stats.status_breakdown.get(&200).copied().unwrap_or(0);
        stats.http_200_rate = ok as f64 / n;
        stats.avg_keywords_per_page = total_keywords as f64 / n;
        stats.avg_headings_per_page = total_headings as f64 / n;
        stats.avg_outbound_links_per_page = total_links as f64 / n;
    }

    stats.keywords_unique = keyword_counts.len();
    // Stable sort keeps first-seen order among equal counts
    keyword_counts.sort_by(|a, b| b.1.cmp(&a.1));
    keyword_counts.truncate(10);
    stats.top_keywords = keyword_counts;

    let mut hosts: Vec<(String, u64)> = host_counts.into_iter().collect();
    hosts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    hosts.truncate(5);
    stats.top_hosts = hosts;

    stats.raw_size = summarize_sizes(sizes);
    Ok(stats)
}

fn summarize_sizes(mut sizes: Vec<f64>) -> SizeSummary {
    if sizes.is_empty() {
        return SizeSummary::default();
    }
    sizes.sort_by(|a, b| a.total_cmp(b));

    let n = sizes.len();
    let median = if n % 2 == 1 {
        sizes[n / 2]
    } else {
        (sizes[n / 2 - 1] + sizes[n / 2]) / 2.0
    };

    SizeSummary {
        avg_kib: sizes.iter().sum::<f64>() / n as f64,
        median_kib: median,
        min_kib: sizes[0],
        max_kib: sizes[n - 1],
    }
}

/// Cumulative pages fetched and links extracted per fixed time bucket
///
/// Buckets run from the earliest to the latest `fetch_time`; empty buckets
/// in between repeat the previous totals.
pub fn activity_series(
    store: &dyn PageStore,
    bucket: Duration,
) -> StorageResult<Vec<ActivityPoint>> {
    let width = bucket.as_secs().max(1) as i64;

    let mut buckets: BTreeMap<i64, (u64, u64)> = BTreeMap::new();
    for digest in store.page_digests()? {
        let ts = digest.fetch_time.timestamp();
        let key = ts - ts.rem_euclid(width);
        let slot = buckets.entry(key).or_default();
        slot.0 += 1;
        slot.1 += digest.link_count as u64;
    }

    let (Some(&first), Some(&last)) = (buckets.keys().next(), buckets.keys().next_back()) else {
        return Ok(Vec::new());
    };

    let mut series = Vec::new();
    let (mut pages, mut links) = (0u64, 0u64);
    let mut key = first;
    while key <= last {
        if let Some((p, l)) = buckets.get(&key) {
            pages += p;
            links += l;
        }
        if let Some(bucket_start) = Utc.timestamp_opt(key, 0).single() {
            series.push(ActivityPoint {
                bucket_start,
                pages_cumulative: pages,
                links_cumulative: links,
            });
        }
        key += width;
    }

    Ok(series)
}
