//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `UrlState`: where a URL is in its single pass through a run
//! - `HostState`: last-contact bookkeeping behind the politeness delay
//! - `RunPhase`: the lifecycle of one crawl run

mod host_state;
mod run_phase;
mod url_state;

pub use host_state::HostState;
pub use run_phase::RunPhase;
pub use url_state::UrlState;
