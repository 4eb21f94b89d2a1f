//! Plain-text summary report

use crate::output::stats::{ActivityPoint, ArchiveStatistics};
use std::fmt::Write as _;
use std::path::Path;

fn join_counts<K: std::fmt::Display>(items: impl IntoIterator<Item = (K, u64)>) -> String {
    let parts: Vec<String> = items
        .into_iter()
        .map(|(key, count)| format!("{}: {}", key, count))
        .collect();
    if parts.is_empty() {
        "none".to_string()
    } else {
        parts.join(", ")
    }
}

/// Formats statistics as the text report
pub fn render_summary(stats: &ArchiveStatistics) -> String {
    let mut out = String::new();

    // Writing into a String cannot fail
    let _ = writeln!(out, "=== Archive Summary ===");
    let _ = writeln!(out, "Pages crawled              : {}", stats.pages_total);
    let _ = writeln!(
        out,
        "HTTP-200 success rate      : {:.1}%",
        stats.http_200_rate * 100.0
    );
    let _ = writeln!(
        out,
        "Status codes               : {}",
        join_counts(stats.status_breakdown.iter().map(|(k, v)| (k, *v)))
    );
    let _ = writeln!(
        out,
        "Content-types              : {}",
        join_counts(stats.content_type_breakdown.iter().map(|(k, v)| (k, *v)))
    );
    let _ = writeln!(out, "Unique keywords            : {}", stats.keywords_unique);
    let _ = writeln!(
        out,
        "Avg keywords/page          : {:.2}",
        stats.avg_keywords_per_page
    );
    let _ = writeln!(
        out,
        "Pages w/kw / w/o kw        : {} / {}",
        stats.pages_with_keywords, stats.pages_without_keywords
    );
    let _ = writeln!(
        out,
        "Avg headings/page          : {:.2}",
        stats.avg_headings_per_page
    );
    let _ = writeln!(
        out,
        "Avg outbound links/page    : {:.2}",
        stats.avg_outbound_links_per_page
    );
    let _ = writeln!(
        out,
        "Avg HTML size KiB          : {:.1} (median {:.1})",
        stats.raw_size.avg_kib, stats.raw_size.median_kib
    );
    let _ = writeln!(
        out,
        "Min-Max HTML size KiB      : {:.1} - {:.1}",
        stats.raw_size.min_kib, stats.raw_size.max_kib
    );
    let _ = writeln!(out, "Failures total             : {}", stats.failures_total);
    let _ = writeln!(
        out,
        "Top failures               : {}",
        join_counts(stats.top_failures.iter().cloned())
    );

    let _ = writeln!(out);
    let _ = writeln!(out, "Top-10 keywords:");
    for (keyword, count) in &stats.top_keywords {
        let _ = writeln!(out, "  {:<15} {:>5}", keyword, count);
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Top-5 hosts:");
    for (host, count) in &stats.top_hosts {
        let _ = writeln!(out, "  {:<25} {:>5}", host, count);
    }

    out
}

/// Formats the activity series as a table
pub fn render_activity(series: &[ActivityPoint]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<25} {:>8} {:>8}", "bucket", "pages", "links");
    for point in series {
        let _ = writeln!(
            out,
            "{:<25} {:>8} {:>8}",
            point.bucket_start.format("%Y-%m-%d %H:%M:%S"),
            point.pages_cumulative,
            point.links_cumulative
        );
    }
    out
}

/// Writes the text report to `path`, creating parent directories
///
/// # Arguments
///
/// * `stats` - Statistics to render
/// * `path` - Destination file, overwritten if present
pub fn write_summary(stats: &ArchiveStatistics, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, render_summary(stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample() -> ArchiveStatistics {
        ArchiveStatistics {
            pages_total: 4,
            http_200_rate: 0.75,
            top_failures: vec![("HTTP 404".to_string(), 3)],
            top_keywords: vec![("otters".to_string(), 2)],
            top_hosts: vec![("a.test".to_string(), 4)],
            ..ArchiveStatistics::default()
        }
    }

    #[test]
    fn test_render_summary() {
        let text = render_summary(&sample());
        assert!(text.contains("Pages crawled              : 4"));
        assert!(text.contains("75.0%"));
        assert!(text.contains("HTTP 404: 3"));
        assert!(text.contains("otters"));
        assert!(text.contains("a.test"));
    }

    #[test]
    fn test_render_empty_breakdowns() {
        let text = render_summary(&ArchiveStatistics::default());
        assert!(text.contains("Status codes               : none"));
    }

    #[test]
    fn test_render_activity() {
        let series = vec![ActivityPoint {
            bucket_start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 5).unwrap(),
            pages_cumulative: 3,
            links_cumulative: 9,
        }];
        let text = render_activity(&series);
        assert!(text.contains("2024-01-01 00:00:05"));
        assert!(text.lines().count() == 2);
    }

    #[test]
    fn test_write_summary_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results").join("summary.txt");
        write_summary(&sample(), &path).unwrap();
        assert!(std::fs::read_to_string(&path)
            .unwrap()
            .contains("Archive Summary"));
    }
}
