use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::context::JobContext;
use super::scheduler::{JobResult, SchedulerJob};
use crate::storage::{Database, RankedSite};
use crate::text::most_common;

/// Rebuild the most-subscribed sites ranking.
///
/// Subscriptions of every user are counted per site name and the `top_n`
/// most frequent kept (ties in first-seen order). Names without a site row
/// are logged and skipped. The result replaces the stored ranking and is
/// returned.
pub async fn cal_site_ranking_cron(db: &Database, top_n: usize) -> Result<Vec<RankedSite>> {
    let mut subscribed: Vec<String> = Vec::new();
    for oauth_id in db.all_user_oauth_ids().await? {
        subscribed.extend(db.user_sub_feeds(&oauth_id).await?);
    }

    let mut ranking = Vec::with_capacity(top_n);
    for (name, score) in most_common(subscribed, top_n) {
        let Some(site) = db.get_site_by_name(&name).await? else {
            tracing::warn!(site = %name, "Subscribed site not found, left out of ranking");
            continue;
        };

        ranking.push(RankedSite {
            position: ranking.len() as i64 + 1,
            site_id: site.id,
            name: site.name,
            cname: site.cname,
            link: site.link,
            brief: site.brief,
            star: site.star,
            score: score as i64,
        });
    }

    db.replace_site_ranking(&ranking).await?;
    tracing::info!(sites = ranking.len(), "Site ranking rebuilt");
    Ok(ranking)
}

/// Daily ranking snapshot.
pub struct RankingJob {
    ctx: Arc<JobContext>,
    interval: Duration,
}

impl RankingJob {
    pub fn new(ctx: Arc<JobContext>, interval: Duration) -> Self {
        Self { ctx, interval }
    }
}

#[async_trait]
impl SchedulerJob for RankingJob {
    fn name(&self) -> &'static str {
        "ranking"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn execute(&self) -> JobResult {
        cal_site_ranking_cron(&self.ctx.db, self.ctx.config.ranking.top_n).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{SiteCreator, SiteSeed};
    use pretty_assertions::assert_eq;

    async fn add_site(db: &Database, name: &str) {
        db.upsert_site(&SiteSeed {
            name: name.into(),
            cname: format!("{name} cname"),
            link: format!("https://{name}.example.com"),
            brief: format!("about {name}"),
            rss: format!("https://{name}.example.com/feed"),
            star: 10,
            creator: SiteCreator::User,
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_ranking_orders_by_subscribers() {
        let db = Database::open(":memory:").await.unwrap();
        for name in ["alpha", "beta", "gamma"] {
            add_site(&db, name).await;
        }
        db.subscribe("u1", "beta").await.unwrap();
        db.subscribe("u1", "alpha").await.unwrap();
        db.subscribe("u2", "alpha").await.unwrap();
        db.subscribe("u2", "gamma").await.unwrap();
        db.subscribe("u3", "alpha").await.unwrap();
        db.subscribe("u3", "gamma").await.unwrap();
        db.subscribe("u3", "ghost").await.unwrap();

        let ranking = cal_site_ranking_cron(&db, 100).await.unwrap();
        let summary: Vec<(i64, &str, i64)> = ranking
            .iter()
            .map(|r| (r.position, r.name.as_str(), r.score))
            .collect();
        assert_eq!(summary, vec![(1, "alpha", 3), (2, "gamma", 2), (3, "beta", 1)]);
        assert_eq!(ranking[0].cname, "alpha cname");
        assert_eq!(ranking[0].brief, "about alpha");

        assert_eq!(db.get_site_ranking().await.unwrap(), ranking);
    }

    #[tokio::test]
    async fn test_ranking_truncates_and_replaces() {
        let db = Database::open(":memory:").await.unwrap();
        add_site(&db, "alpha").await;
        add_site(&db, "beta").await;
        db.subscribe("u1", "alpha").await.unwrap();
        db.subscribe("u1", "beta").await.unwrap();
        db.subscribe("u2", "alpha").await.unwrap();

        cal_site_ranking_cron(&db, 100).await.unwrap();
        let top = cal_site_ranking_cron(&db, 1).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].name, "alpha");
        assert_eq!(db.get_site_ranking().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_users_gives_empty_ranking() {
        let db = Database::open(":memory:").await.unwrap();
        assert!(cal_site_ranking_cron(&db, 100).await.unwrap().is_empty());
    }
}
