//! feedmill: background worker of an RSS aggregator.
//!
//! Crawled feed entries pass through the item [`pipeline`] (validation,
//! HTML sanitizing, storage); periodic [`jobs`] refresh sources, archive old
//! articles, extract keywords, compute similar articles and rank sites.

pub mod config;
pub mod feed;
pub mod jobs;
pub mod pipeline;
pub mod storage;
pub mod text;
pub mod util;
