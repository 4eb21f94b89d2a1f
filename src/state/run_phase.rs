use std::fmt;

/// Lifecycle phase of a crawl run
///
/// `Init -> Running -> Draining -> Done`, with `Cancelled` reachable from
/// `Running` or `Draining`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunPhase {
    /// Seeds are being admitted and workers started
    Init,

    /// Workers dequeue, fetch, and feed discoveries back
    Running,

    /// The frontier is closed; in-flight jobs are finishing
    Draining,

    /// Every admitted URL that was dispatched has an outcome
    Done,

    /// Operator interrupt or fatal error stopped the run
    Cancelled,
}

impl RunPhase {
    pub fn can_transition_to(&self, next: RunPhase) -> bool {
        matches!(
            (self, next),
            (Self::Init, Self::Running)
                | (Self::Running, Self::Draining)
                | (Self::Draining, Self::Done)
                | (Self::Running, Self::Cancelled)
                | (Self::Draining, Self::Cancelled)
        )
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}
