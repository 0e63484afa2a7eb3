//! Utility functions shared by the pipeline, spider and jobs.
//!
//! - **URL helpers**: host extraction, link resolution and feed URL validation
//! - **Filesystem**: atomic file writes for the article archive

mod fs;
mod links;

pub use fs::atomic_write;
pub use links::{host_name, resolve_href, validate_feed_url, UrlValidationError};
