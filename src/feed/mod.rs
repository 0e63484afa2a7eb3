//! Feed spider: fetching, parsing and OPML import of RSS/Atom sources.
//!
//! - [`parser`] - RSS/Atom documents into [`FeedEntry`] values via `feed-rs`
//! - [`fetcher`] - HTTP retrieval with retries and the per-site crawl that
//!   feeds entries through the item pipeline
//! - [`opml`] - OPML subscription lists into sites
//!
//! # Example
//!
//! ```ignore
//! let client = build_client(&config.user_agent, Duration::from_secs(30))?;
//! let spider = Spider::standard(db.clone(), client);
//! let report = spider.crawl_site(&site, &[]).await?;
//! ```

mod fetcher;
pub mod opml;
mod parser;

pub use fetcher::{build_client, fetch_feed, CrawlReport, FetchError, Spider};
pub use opml::OpmlError;
pub use parser::{parse_feed, FeedEntry};
