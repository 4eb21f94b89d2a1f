//! Backoff policy for transient failures

use chrono::{DateTime, Utc};
use rand::Rng;
use std::time::Duration;

/// Retry timing for one crawl run
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub retry_limit: u32,
    pub base: Duration,
    /// Ceiling for any single wait, backoff or Retry-After
    pub cap: Duration,
}

impl RetryPolicy {
    /// Whether another attempt is allowed after `attempt` (0-based) failed
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.retry_limit
    }

    /// Wait before the attempt that follows `attempt`
    ///
    /// A server-provided Retry-After wins over the computed backoff; both are
    /// capped.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(wait) => wait.min(self.cap),
            None => backoff_delay(self.base, attempt, self.cap, jitter()),
        }
    }
}

/// `base * 2^attempt * jitter`, capped at `cap`
pub fn backoff_delay(base: Duration, attempt: u32, cap: Duration, jitter: f64) -> Duration {
    let factor = 2f64.powi(attempt.min(32) as i32) * jitter;
    let millis = base.as_millis() as f64 * factor;
    if !millis.is_finite() || millis >= cap.as_millis() as f64 {
        return cap;
    }
    Duration::from_millis(millis.max(0.0) as u64)
}

/// Uniform multiplier in `[0.5, 1.5)`
pub fn jitter() -> f64 {
    rand::rng().random_range(0.5..1.5)
}

/// Parses a Retry-After header: delta-seconds or an HTTP date
///
/// A date in the past yields a zero wait.
///
/// # Arguments
///
/// * `value` - Raw header value
/// * `now` - Reference time for HTTP-date values
///
/// # Returns
///
/// The wait, or `None` when the value is neither form
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let wait = date.with_timezone(&Utc) - now;
    Some(wait.to_std().unwrap_or(Duration::ZERO))
}
