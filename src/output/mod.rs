//! Output module for archive reports
//!
//! This module handles:
//! - Computing statistics over the stored pages and failures
//! - The cumulative activity series over fetch times
//! - Rendering and writing the plain-text summary report

mod report;
pub mod stats;

pub use report::{render_activity, render_summary, write_summary};
pub use stats::{activity_series, load_statistics, ActivityPoint, ArchiveStatistics, SizeSummary};
