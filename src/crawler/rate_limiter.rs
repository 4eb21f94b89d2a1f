//! Per-host politeness control
//!
//! Each host gets its own async slot. `acquire` holds that slot while it
//! checks the last contact, sleeps out any remaining delay, and records the
//! new contact, so two workers can never both slip into one host's delay
//! window. The map of slots is only locked long enough to look a slot up;
//! workers contacting different hosts never wait on each other.

use crate::state::HostState;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Debug)]
pub struct HostRateLimiter {
    delay: Duration,
    hosts: Mutex<HashMap<String, Arc<tokio::sync::Mutex<HostState>>>>,
}

impl HostRateLimiter {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, host: &str) -> Arc<tokio::sync::Mutex<HostState>> {
        let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(hosts.entry(host.to_string()).or_default())
    }

    /// Waits until `host` may be contacted, then records the contact
    ///
    /// # Arguments
    ///
    /// * `host` - Rate-limit key from [`crate::url::host_key`]
    ///
    /// # Returns
    ///
    /// The time spent waiting for the delay window
    pub async fn acquire(&self, host: &str) -> Duration {
        let slot = self.slot(host);
        let mut state = slot.lock().await;

        let waited = match state.time_until_next_contact(self.delay, Instant::now()) {
            Some(wait) => {
                trace!("Waiting {:?} before contacting {}", wait, host);
                tokio::time::sleep(wait).await;
                wait
            }
            None => Duration::ZERO,
        };

        state.record_contact(Instant::now());
        waited
    }
}
