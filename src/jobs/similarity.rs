use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::context::JobContext;
use super::scheduler::{JobResult, SchedulerJob};
use crate::config::SimilarityConfig;
use crate::storage::{Database, SimilarArticle, TaggedArticle};
use crate::text::{rank_similar, TagMap};

const SECS_PER_DAY: i64 = 86_400;

/// Totals of one similarity run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimilaritySummary {
    /// Recent articles compared against the window
    pub computed: usize,
    /// Articles that got a stored neighbour list
    pub stored: usize,
}

fn parse_tags(articles: Vec<TaggedArticle>) -> Vec<(i64, TagMap)> {
    articles
        .into_iter()
        .filter_map(|a| match TagMap::from_json(&a.tags) {
            Ok(tags) => Some((a.uindex, tags)),
            Err(e) => {
                tracing::warn!(uindex = a.uindex, error = %e, "Ignoring malformed tags");
                None
            }
        })
        .collect()
}

/// Compute similar articles for recent tagged articles without a result.
///
/// Each one is compared with every tagged article of the last `window_days`;
/// matches scoring strictly between `min_score` and 1 are kept and the best
/// `top_n` stored, highest first. Nothing is stored when no article matches,
/// so the article is compared again on the next run.
pub async fn cal_article_distance_cron(
    db: &Database,
    config: &SimilarityConfig,
    now: i64,
) -> Result<SimilaritySummary> {
    let recent = parse_tags(db.tagged_recent_articles(config.min_star).await?);
    let since = now.saturating_sub(config.window_days.saturating_mul(SECS_PER_DAY));
    let window = parse_tags(db.tagged_articles_since(config.min_star, since).await?);

    let mut summary = SimilaritySummary::default();

    for (uindex, tags) in &recent {
        if db.get_similar_articles(*uindex).await?.is_some() {
            continue;
        }
        summary.computed += 1;

        let candidates = window
            .iter()
            .filter(|(other, _)| other != uindex)
            .map(|(other, other_tags)| (other, other_tags));
        let ranked = rank_similar(tags, candidates, config.min_score, 1.0, config.top_n);
        if ranked.is_empty() {
            continue;
        }

        let similar: Vec<SimilarArticle> = ranked
            .into_iter()
            .map(|(uindex, score)| SimilarArticle { uindex, score })
            .collect();
        db.set_similar_articles(*uindex, &similar).await?;
        summary.stored += 1;
    }

    tracing::info!(
        candidates = window.len(),
        computed = summary.computed,
        stored = summary.stored,
        "Similarity finished"
    );
    Ok(summary)
}

/// Periodic similar-article computation.
pub struct SimilarityJob {
    ctx: Arc<JobContext>,
    interval: Duration,
}

impl SimilarityJob {
    pub fn new(ctx: Arc<JobContext>, interval: Duration) -> Self {
        Self { ctx, interval }
    }
}

#[async_trait]
impl SchedulerJob for SimilarityJob {
    fn name(&self) -> &'static str {
        "similarity"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn execute(&self) -> JobResult {
        let now = chrono::Utc::now().timestamp();
        cal_article_distance_cron(&self.ctx.db, &self.ctx.config.similarity, now).await?;
        Ok(())
    }
}
