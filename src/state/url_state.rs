//! URL state definitions for one crawl run
//!
//! A URL absent from the run's dedup map is unseen. Once admitted it moves
//! forward through these states and never returns to an earlier one.

use std::fmt;

/// Represents the state of an admitted URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrlState {
    /// Admitted to the frontier and waiting for a worker
    Pending,

    /// Dequeued by a worker; fetch, parse, or persistence under way
    InFlight,

    /// Stored as a page record
    Fetched,

    /// Stored as a failure record
    Failed,
}

impl UrlState {
    /// Returns true if moving from `self` to `next` is a legal step
    pub fn can_transition_to(&self, next: UrlState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InFlight)
                | (Self::InFlight, Self::Fetched)
                | (Self::InFlight, Self::Failed)
        )
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Fetched => "fetched",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for UrlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
