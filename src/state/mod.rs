//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `UrlStatus`: lifecycle of a single url record (pending, fetched, failed)
//! - `CrawlRunState`: the completion monitor's view of a whole crawl

mod run_state;
mod url_status;

// Re-export main types
pub use run_state::{CrawlRunState, MonitorPhase, PollSample, ProgressSnapshot};
pub use url_status::UrlStatus;
