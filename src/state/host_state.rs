use std::time::{Duration, Instant};

/// Tracks politeness bookkeeping for one host
#[derive(Debug, Clone, Default)]
pub struct HostState {
    /// When a worker last contacted this host
    pub last_contact_at: Option<Instant>,
}

impl HostState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculates the time until the host may be contacted again
    ///
    /// # Arguments
    ///
    /// * `delay` - Minimum spacing between two contacts
    /// * `now` - The instant to measure from
    ///
    /// # Returns
    ///
    /// None if a request can be made now, or the duration to wait otherwise.
    pub fn time_until_next_contact(&self, delay: Duration, now: Instant) -> Option<Duration> {
        let last = self.last_contact_at?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed < delay {
            Some(delay - elapsed)
        } else {
            None
        }
    }

    /// Records that a request was made to this host
    pub fn record_contact(&mut self, now: Instant) {
        self.last_contact_at = Some(now);
    }
}
