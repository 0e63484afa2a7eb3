use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::feed::{build_client, Spider};
use crate::storage::Database;

/// Shared state handed to every job.
pub struct JobContext {
    pub db: Database,
    pub config: Arc<Config>,
    spider: Spider,
}

impl JobContext {
    /// Build the context with the standard spider and an HTTP client
    /// configured from `config`.
    pub fn new(db: Database, config: Config) -> Result<Self> {
        let timeout = Duration::from_secs(config.refresh.timeout_secs);
        let client = build_client(&config.user_agent, timeout).context("Failed to build HTTP client")?;
        let spider = Spider::standard(db.clone(), client).with_timeout(timeout);
        Ok(Self::with_spider(db, config, spider))
    }

    pub fn with_spider(db: Database, config: Config, spider: Spider) -> Self {
        Self {
            db,
            config: Arc::new(config),
            spider,
        }
    }

    pub fn spider(&self) -> &Spider {
        &self.spider
    }
}
