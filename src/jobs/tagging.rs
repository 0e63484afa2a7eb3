use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::context::JobContext;
use super::scheduler::{JobResult, SchedulerJob};
use crate::config::TaggingConfig;
use crate::storage::Database;
use crate::text::extract_tags;

const SECS_PER_DAY: i64 = 86_400;

/// Totals of one tagging run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaggingSummary {
    /// Articles that left the recent window
    pub expired: u64,
    /// Articles that received a keyword map
    pub tagged: usize,
    /// Articles with no keyword frequent enough, left untagged
    pub empty: usize,
}

/// Expire old articles, then compute keywords for recent untagged ones.
///
/// Articles created `recent_days` or more before `now` lose their recency
/// flag. Recent, active, untagged articles of sites at or above `min_star`
/// are tagged newest first; an empty keyword map is not stored.
pub async fn cal_all_article_tag_cron(
    db: &Database,
    config: &TaggingConfig,
    now: i64,
) -> Result<TaggingSummary> {
    let cutoff = now.saturating_sub(config.recent_days.saturating_mul(SECS_PER_DAY));
    let expired = db.expire_recent_articles(cutoff).await?;

    let articles = db.untagged_recent_articles(config.min_star).await?;
    let options = config.tag_options();
    let mut summary = TaggingSummary {
        expired,
        ..Default::default()
    };

    for article in articles {
        let tags = extract_tags(&article.content, &article.title, options);
        if tags.is_empty() {
            summary.empty += 1;
            continue;
        }

        let json = tags.to_json().context("Failed to serialize tags")?;
        db.set_article_tags(article.id, &json).await?;
        tracing::debug!(uindex = article.uindex, tags = %json, "Article tagged");
        summary.tagged += 1;
    }

    tracing::info!(
        expired = summary.expired,
        tagged = summary.tagged,
        empty = summary.empty,
        "Tagging finished"
    );
    Ok(summary)
}

/// Periodic keyword extraction.
pub struct TaggingJob {
    ctx: Arc<JobContext>,
    interval: Duration,
}

impl TaggingJob {
    pub fn new(ctx: Arc<JobContext>, interval: Duration) -> Self {
        Self { ctx, interval }
    }
}

#[async_trait]
impl SchedulerJob for TaggingJob {
    fn name(&self) -> &'static str {
        "tagging"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn execute(&self) -> JobResult {
        let now = chrono::Utc::now().timestamp();
        cal_all_article_tag_cron(&self.ctx.db, &self.ctx.config.tagging, now).await?;
        Ok(())
    }
}
