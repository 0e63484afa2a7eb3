//! Item pipeline run on every scraped record before it becomes an article.
//!
//! Stages run in order and each either hands the (possibly rewritten) item
//! to the next stage or drops it:
//!
//! - [`ValidPipeline`] - required fields present
//! - [`DomPipeline`] - absolute links, neutralized scripts, trimmed nodes
//! - [`InsertDbPipeline`] - stored as an article of its site
//!
//! # Example
//!
//! ```ignore
//! let pipeline = ItemPipeline::standard(db.clone());
//! match pipeline.process(item).await? {
//!     Processed::Passed(item) => tracing::info!(uindex = ?item.uindex, "stored"),
//!     Processed::Dropped(reason) => tracing::debug!(%reason, "dropped"),
//! }
//! ```

mod dom;
mod insert;
mod valid;

use async_trait::async_trait;
use thiserror::Error;

pub use dom::{sanitize_html, DomPipeline};
pub use insert::InsertDbPipeline;
pub use valid::ValidPipeline;

use crate::storage::Database;

/// A scraped record on its way to storage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Item {
    /// Name of the owning site
    pub name: String,
    pub title: String,
    /// Source URL of the article; also the base for relative links
    pub url: String,
    /// Raw HTML body
    pub content: String,
    /// CSS selectors whose matching elements are emptied
    pub trims: Vec<String>,
    /// Set once the item was stored as an article
    pub uindex: Option<i64>,
}

/// Errors raised by pipeline stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The item must not continue; not a failure of the pipeline itself
    #[error("Item dropped: {0}")]
    Drop(String),
    /// A trim selector does not parse as CSS
    #[error("Invalid trim selector {0}")]
    Selector(String),
    /// Database operation failed while storing the item
    #[error("Storage error: {0}")]
    Storage(String),
}

/// One stage of the item pipeline.
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Stage name used in logs
    fn name(&self) -> &'static str;

    /// Inspect or rewrite an item. Return `PipelineError::Drop` to discard it.
    async fn process_item(&self, item: Item) -> Result<Item, PipelineError>;
}

/// Outcome of running an item through the whole chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Processed {
    /// Every stage accepted the item
    Passed(Item),
    /// A stage dropped the item, with its reason
    Dropped(String),
}

/// Ordered chain of pipeline stages.
pub struct ItemPipeline {
    stages: Vec<Box<dyn Pipeline>>,
}

impl ItemPipeline {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Appends a stage to the chain.
    pub fn with_stage<P: Pipeline + 'static>(mut self, stage: P) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// The chain used for crawled feeds: validate, sanitize, store.
    pub fn standard(db: Database) -> Self {
        Self::new()
            .with_stage(ValidPipeline)
            .with_stage(DomPipeline)
            .with_stage(InsertDbPipeline::new(db))
    }

    /// Run an item through every stage in order.
    ///
    /// Drops are reported as [`Processed::Dropped`]; any other stage error
    /// aborts the chain and is returned.
    pub async fn process(&self, mut item: Item) -> Result<Processed, PipelineError> {
        for stage in &self.stages {
            item = match stage.process_item(item).await {
                Ok(item) => item,
                Err(PipelineError::Drop(reason)) => {
                    tracing::debug!(stage = stage.name(), reason = %reason, "Item dropped");
                    return Ok(Processed::Dropped(reason));
                }
                Err(e) => return Err(e),
            };
        }
        Ok(Processed::Passed(item))
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Default for ItemPipeline {
    fn default() -> Self {
        Self::new()
    }
}
