//! Crawl frontier and dedup set
//!
//! The frontier owns every piece of per-run URL bookkeeping behind one mutex:
//! the pending queue, the map of every URL ever admitted (the dedup set),
//! the in-flight counter, and the closed flag. Admission is a single
//! check-and-insert under that lock, so two workers discovering the same URL
//! can never both admit it.
//!
//! # Depth relaxation
//!
//! With concurrent workers a URL can first be discovered along a longer path
//! than its shortest one. The frontier keeps the outbound links of every
//! fetched URL; when a URL turns up again at a smaller depth its recorded
//! depth is lowered and the improvement flows through its recorded children,
//! admitting any child that now falls within `max_depth`. Nothing is ever
//! queued twice, so this only changes *which* URLs are admitted, never how
//! often they are fetched.
//!
//! # Redirects
//!
//! A redirect target is admitted like a link, but at the depth of the URL that
//! redirected to it and with its hop count carried along. Relaxing the source
//! relaxes the target at the same depth.

use crate::state::UrlState;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// A URL handed to a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub url: String,
    pub depth: u32,
    pub discovered_at: Instant,
    /// Redirect hops that led to this URL
    pub redirects: u32,
}

/// Result of a non-blocking dequeue attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dequeue {
    /// An entry was dispatched; the URL is now in flight
    Entry(FrontierEntry),

    /// Nothing queued, but in-flight jobs may still discover more
    Empty,

    /// The frontier is closed; no entry will ever be served again
    Done,
}

/// Counters describing the frontier at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrontierStats {
    pub admitted: usize,
    pub queued: usize,
    pub in_flight: usize,
    pub dispatched: u64,
    pub pending_dropped: u64,
    pub closed: bool,
}

#[derive(Debug)]
struct Admission {
    state: UrlState,
    depth: u32,
    discovered_at: Instant,
    redirects: u32,
    /// Outbound links, known once the URL's page has been parsed
    children: Vec<String>,
    /// Where the URL redirected to, if it did
    redirect_to: Option<String>,
}

impl Admission {
    fn new(depth: u32) -> Self {
        Self {
            state: UrlState::Pending,
            depth,
            discovered_at: Instant::now(),
            redirects: 0,
            children: Vec::new(),
            redirect_to: None,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    queue: VecDeque<String>,
    seen: HashMap<String, Admission>,
    in_flight: usize,
    dispatched: u64,
    pending_dropped: u64,
    closed: bool,
}

impl Inner {
    /// Admits `url` at `depth`, relaxing depths of already-known URLs
    ///
    /// Returns the number of URLs newly queued, which includes `url` itself
    /// and any children admitted through relaxation.
    fn admit(&mut self, url: String, depth: u32, max_depth: u32) -> usize {
        let mut queued = 0;
        let mut work = vec![(url, depth)];

        while let Some((url, depth)) = work.pop() {
            if depth > max_depth {
                continue;
            }

            match self.seen.get_mut(&url) {
                Some(admission) => {
                    if depth < admission.depth {
                        trace!("Relaxing depth of {} from {} to {}", url, admission.depth, depth);
                        admission.depth = depth;
                        work.extend(admission.children.iter().map(|c| (c.clone(), depth + 1)));
                        if let Some(target) = &admission.redirect_to {
                            work.push((target.clone(), depth));
                        }
                    }
                }
                None => {
                    self.seen.insert(url.clone(), Admission::new(depth));
                    self.queue.push_back(url);
                    queued += 1;
                }
            }
        }

        queued
    }

    fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        self.pending_dropped += self.queue.len() as u64;
        self.queue.clear();
        true
    }
}

/// Queue of pending URLs plus the set of every URL admitted this run
#[derive(Debug)]
pub struct Frontier {
    inner: Mutex<Inner>,
    notify: Notify,
    max_depth: u32,
    max_pages: Option<u64>,
}

impl Frontier {
    pub fn new(max_depth: u32, max_pages: Option<u64>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
            max_depth,
            max_pages,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admits `url` if it was never admitted before and `depth <= max_depth`
    ///
    /// Returns whether this call admitted the URL. A known URL offered at a
    /// smaller depth has its depth lowered but is not admitted again.
    pub fn enqueue(&self, url: impl Into<String>, depth: u32) -> bool {
        let url = url.into();
        let mut inner = self.lock();
        if inner.closed {
            return false;
        }

        let is_new = depth <= self.max_depth && !inner.seen.contains_key(&url);
        let queued = inner.admit(url, depth, self.max_depth);
        drop(inner);

        if queued > 0 {
            self.notify.notify_waiters();
        }
        is_new
    }

    /// Records `parent`'s outbound links and admits them one level deeper
    ///
    /// The parent's depth is read under the same lock as the admissions, so a
    /// relaxation that lands concurrently is never missed. Self-links and
    /// repeats are dropped before any admission check. Returns the number of
    /// URLs newly queued.
    pub fn offer_links<I>(&self, parent: &str, links: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let mut children: Vec<String> = Vec::new();
        for link in links {
            if link != parent && !children.contains(&link) {
                children.push(link);
            }
        }

        let mut inner = self.lock();
        let Some(admission) = inner.seen.get_mut(parent) else {
            warn!("Links offered for unknown URL {}", parent);
            return 0;
        };
        admission.children = children.clone();
        let child_depth = admission.depth + 1;

        if inner.closed {
            return 0;
        }

        let mut queued = 0;
        for child in children {
            queued += inner.admit(child, child_depth, self.max_depth);
        }
        drop(inner);

        if queued > 0 {
            self.notify.notify_waiters();
        }
        queued
    }

    /// Records that `source` redirected to `target` and admits the target
    ///
    /// The target is admitted at the source's depth with one more redirect
    /// hop than the source. A target seen before keeps its own hop count.
    ///
    /// # Returns
    ///
    /// Whether the target was newly queued
    pub fn offer_redirect(&self, source: &str, target: impl Into<String>) -> bool {
        let target = target.into();
        if target == source {
            return false;
        }

        let mut inner = self.lock();
        let Some(admission) = inner.seen.get_mut(source) else {
            warn!("Redirect offered for unknown URL {}", source);
            return false;
        };
        admission.redirect_to = Some(target.clone());
        let depth = admission.depth;
        let redirects = admission.redirects + 1;

        if inner.closed {
            return false;
        }

        let is_new = !inner.seen.contains_key(&target);
        let queued = inner.admit(target.clone(), depth, self.max_depth);
        if is_new {
            if let Some(admission) = inner.seen.get_mut(&target) {
                admission.redirects = redirects;
            }
        }
        drop(inner);

        if queued > 0 {
            trace!("Redirect target {} queued from {}", target, source);
            self.notify.notify_waiters();
        }
        is_new
    }

    /// Takes the next entry without waiting
    ///
    /// Reaching `max_pages` dispatches closes the frontier. When nothing is
    /// queued and nothing is in flight the frontier closes itself, since no
    /// job remains that could discover more work.
    pub fn dequeue(&self) -> Dequeue {
        let mut inner = self.lock();
        if inner.closed {
            return Dequeue::Done;
        }

        let Some(url) = inner.queue.pop_front() else {
            if inner.in_flight == 0 {
                inner.close();
                drop(inner);
                debug!("Frontier exhausted");
                self.notify.notify_waiters();
                return Dequeue::Done;
            }
            return Dequeue::Empty;
        };

        let entry = match inner.seen.get_mut(&url) {
            Some(admission) => {
                admission.state = UrlState::InFlight;
                FrontierEntry {
                    url,
                    depth: admission.depth,
                    discovered_at: admission.discovered_at,
                    redirects: admission.redirects,
                }
            }
            None => {
                // Every queued URL is in the map; keep the counters consistent anyway
                warn!("Queued URL {} missing from dedup map", url);
                return Dequeue::Empty;
            }
        };
        inner.in_flight += 1;
        inner.dispatched += 1;

        let limit_reached = self
            .max_pages
            .is_some_and(|limit| inner.dispatched >= limit);
        if limit_reached && inner.close() {
            drop(inner);
            debug!("Page limit reached; frontier closed");
            self.notify.notify_waiters();
        }

        Dequeue::Entry(entry)
    }

    /// Waits for the next entry
    ///
    /// Returns None once the frontier is done or `cancel` fires.
    pub async fn next_entry(&self, cancel: &CancellationToken) -> Option<FrontierEntry> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }

            // Register before checking so a wake-up between the check and the
            // await is not lost
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.dequeue() {
                Dequeue::Entry(entry) => return Some(entry),
                Dequeue::Done => return None,
                Dequeue::Empty => {}
            }

            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = &mut notified => {}
            }
        }
    }

    /// Records the terminal outcome of an in-flight URL
    pub fn finish(&self, url: &str, outcome: UrlState) {
        let mut inner = self.lock();
        match inner.seen.get_mut(url) {
            Some(admission) if admission.state.can_transition_to(outcome) => {
                admission.state = outcome;
            }
            Some(admission) => {
                warn!(
                    "Ignoring transition {} -> {} for {}",
                    admission.state, outcome, url
                );
                return;
            }
            None => {
                warn!("Finish for unknown URL {}", url);
                return;
            }
        }

        inner.in_flight = inner.in_flight.saturating_sub(1);
        if inner.in_flight == 0 && inner.queue.is_empty() {
            inner.close();
        }
        drop(inner);

        self.notify.notify_waiters();
    }

    /// Stops admitting and serving entries; queued entries are dropped
    pub fn close(&self) {
        let closed = self.lock().close();
        if closed {
            debug!("Frontier closed");
        }
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn state_of(&self, url: &str) -> Option<UrlState> {
        self.lock().seen.get(url).map(|a| a.state)
    }

    pub fn depth_of(&self, url: &str) -> Option<u32> {
        self.lock().seen.get(url).map(|a| a.depth)
    }

    /// URLs dispatched to a worker that never reached an outcome, sorted
    pub fn in_flight_urls(&self) -> Vec<String> {
        let inner = self.lock();
        let mut urls: Vec<String> = inner
            .seen
            .iter()
            .filter(|(_, a)| a.state == UrlState::InFlight)
            .map(|(url, _)| url.clone())
            .collect();
        urls.sort();
        urls
    }

    pub fn stats(&self) -> FrontierStats {
        let inner = self.lock();
        FrontierStats {
            admitted: inner.seen.len(),
            queued: inner.queue.len(),
            in_flight: inner.in_flight,
            dispatched: inner.dispatched,
            pending_dropped: inner.pending_dropped,
            closed: inner.closed,
        }
    }
}
