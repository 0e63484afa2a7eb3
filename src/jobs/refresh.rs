use anyhow::Result;
use async_trait::async_trait;
use chrono::Timelike;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;

use super::context::JobContext;
use super::scheduler::{JobResult, SchedulerJob};
use crate::storage::{Site, SiteCreator};
use crate::util::host_name;

/// Totals of one refresh run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Sites crawled successfully
    pub crawled: usize,
    /// Sites whose crawl failed
    pub failed: usize,
    /// Sites not crawled in this run
    pub skipped: usize,
    /// New articles stored across all sites
    pub stored: usize,
}

impl JobContext {
    fn refresh_window_secs(&self) -> i64 {
        i64::try_from(self.config.refresh.min_interval_minutes.saturating_mul(60)).unwrap_or(i64::MAX)
    }
}

/// Crawl `sites` with bounded concurrency and total the outcome.
async fn crawl_sites(ctx: &JobContext, sites: Vec<Site>, mut summary: RefreshSummary) -> RefreshSummary {
    let concurrency = ctx.config.refresh.concurrency.max(1);

    let results: Vec<_> = stream::iter(sites)
        .map(|site| async move {
            let trims = ctx.config.trims_for(&site.name);
            ctx.spider().crawl_site(&site, trims).await
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    for result in results {
        match result {
            Ok(report) => {
                summary.crawled += 1;
                summary.stored += report.stored;
            }
            Err(_) => summary.failed += 1,
        }
    }
    summary
}

/// Refresh a batch of sites by name.
///
/// Unknown or inactive names are skipped. Sites refreshed within the
/// configured window are skipped unless `force`. Only `user` sites are
/// crawled: `wemp` mirrors are rate limited and left to the wemp job,
/// `system` sites are never crawled.
pub async fn update_sites(ctx: &JobContext, names: &[String], force: bool) -> Result<RefreshSummary> {
    let now = chrono::Utc::now().timestamp();
    let window = ctx.refresh_window_secs();
    let mut summary = RefreshSummary::default();
    let mut due = Vec::new();

    for name in names {
        let Some(site) = ctx.db.get_active_site(name).await? else {
            tracing::debug!(site = %name, "Site unknown or inactive, skipping");
            summary.skipped += 1;
            continue;
        };

        match site.creator {
            SiteCreator::User => {
                if !force && site.updated_within(window, now) {
                    tracing::debug!(site = %site.name, "Site updated recently, skipping");
                    summary.skipped += 1;
                } else {
                    due.push(site);
                }
            }
            SiteCreator::Wemp => {
                tracing::debug!(site = %site.name, "Wemp site is only refreshed by the wemp job");
                summary.skipped += 1;
            }
            SiteCreator::System => {
                summary.skipped += 1;
            }
        }
    }

    let summary = crawl_sites(ctx, due, summary).await;
    tracing::info!(
        requested = names.len(),
        crawled = summary.crawled,
        failed = summary.failed,
        stored = summary.stored,
        "Batch refresh finished"
    );
    Ok(summary)
}

/// Hourly refresh of `user` sites.
///
/// Even hours take every active site, odd hours only recommended ones
/// (star at or above `refresh.recommended_star`). Sites without subscribers
/// below the recommended star, and sites refreshed within the window, are
/// skipped.
pub async fn update_all_atom_cron(ctx: &JobContext, hour: u32) -> Result<RefreshSummary> {
    let recommended = ctx.config.refresh.recommended_star;
    let min_star = if hour % 2 == 0 { i64::MIN } else { recommended };
    let sites = ctx.db.get_active_sites(SiteCreator::User, min_star).await?;

    let now = chrono::Utc::now().timestamp();
    let window = ctx.refresh_window_secs();
    let mut summary = RefreshSummary::default();
    let mut due = Vec::with_capacity(sites.len());

    for site in sites {
        if site.star < recommended && ctx.db.subscriber_count(&site.name).await? == 0 {
            tracing::debug!(site = %site.name, "No subscribers, skipping");
            summary.skipped += 1;
            continue;
        }
        if site.updated_within(window, now) {
            tracing::debug!(site = %site.name, "Site updated recently, skipping");
            summary.skipped += 1;
            continue;
        }
        due.push(site);
    }

    tracing::info!(hour, due = due.len(), skipped = summary.skipped, "Starting atom refresh");
    let summary = crawl_sites(ctx, due, summary).await;
    tracing::info!(
        crawled = summary.crawled,
        failed = summary.failed,
        stored = summary.stored,
        "Atom refresh finished"
    );
    Ok(summary)
}

/// Daily refresh of `wemp` mirror sites.
///
/// The host of the feed URL decides how a site is fetched: hosts listed in
/// `wemp.atom_hosts` serve plain RSS/Atom and go through the spider; other
/// mirrors are not supported and skipped.
pub async fn update_all_wemp_cron(ctx: &JobContext) -> Result<RefreshSummary> {
    let sites = ctx.db.get_active_sites(SiteCreator::Wemp, i64::MIN).await?;
    let mut summary = RefreshSummary::default();
    let mut due = Vec::with_capacity(sites.len());

    for site in sites {
        let host = host_name(&site.rss);
        let is_atom = ctx
            .config
            .wemp
            .atom_hosts
            .iter()
            .any(|h| host == *h || host.ends_with(&format!(".{h}")));

        if is_atom {
            due.push(site);
        } else {
            tracing::debug!(site = %site.name, host = %host, "No fetcher for wemp host, skipping");
            summary.skipped += 1;
        }
    }

    let summary = crawl_sites(ctx, due, summary).await;
    tracing::info!(
        crawled = summary.crawled,
        failed = summary.failed,
        skipped = summary.skipped,
        stored = summary.stored,
        "Wemp refresh finished"
    );
    Ok(summary)
}

// ============================================================================
// Scheduled Jobs
// ============================================================================

/// Hourly `user` site refresh, using the local hour for the even/odd split.
pub struct AtomRefreshJob {
    ctx: Arc<JobContext>,
    interval: Duration,
}

impl AtomRefreshJob {
    pub fn new(ctx: Arc<JobContext>, interval: Duration) -> Self {
        Self { ctx, interval }
    }
}

#[async_trait]
impl SchedulerJob for AtomRefreshJob {
    fn name(&self) -> &'static str {
        "atom_refresh"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn execute(&self) -> JobResult {
        let hour = chrono::Local::now().hour();
        update_all_atom_cron(&self.ctx, hour).await?;
        Ok(())
    }
}

/// Daily `wemp` mirror refresh.
pub struct WempRefreshJob {
    ctx: Arc<JobContext>,
    interval: Duration,
}

impl WempRefreshJob {
    pub fn new(ctx: Arc<JobContext>, interval: Duration) -> Self {
        Self { ctx, interval }
    }
}

#[async_trait]
impl SchedulerJob for WempRefreshJob {
    fn name(&self) -> &'static str {
        "wemp_refresh"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn execute(&self) -> JobResult {
        update_all_wemp_cron(&self.ctx).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::feed::Spider;
    use crate::storage::{Database, SiteSeed, Status};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><title>Post</title><link>https://example.com/p/{site}</link><description>Body</description></item>
</channel></rss>"#;

    async fn context(config: Config) -> JobContext {
        let db = Database::open(":memory:").await.unwrap();
        let spider = Spider::standard(db.clone(), reqwest::Client::new())
            .with_timeout(Duration::from_secs(5));
        JobContext::with_spider(db, config, spider)
    }

    /// Register a site whose feed is served by the mock server under `/<name>`.
    async fn add_site(ctx: &JobContext, server: &MockServer, name: &str, star: i64, creator: SiteCreator) {
        Mock::given(method("GET"))
            .and(path(format!("/{name}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS.replace("{site}", name)))
            .mount(server)
            .await;

        ctx.db
            .upsert_site(&SiteSeed {
                name: name.into(),
                cname: name.to_uppercase(),
                link: String::new(),
                brief: String::new(),
                rss: format!("{}/{name}", server.uri()),
                star,
                creator,
            })
            .await
            .unwrap();
    }

    async fn stored(ctx: &JobContext, name: &str) -> i64 {
        let site = ctx.db.get_site_by_name(name).await.unwrap().unwrap();
        ctx.db.count_articles_for_site(site.id).await.unwrap()
    }

    #[tokio::test]
    async fn test_update_sites_crawls_user_sites_only() {
        let server = MockServer::start().await;
        let ctx = context(Config::default()).await;
        add_site(&ctx, &server, "user", 5, SiteCreator::User).await;
        add_site(&ctx, &server, "wemp", 5, SiteCreator::Wemp).await;
        add_site(&ctx, &server, "off", 5, SiteCreator::User).await;
        ctx.db.set_site_status("off", Status::Inactive).await.unwrap();

        let names: Vec<String> = ["user", "wemp", "off", "ghost"].map(String::from).to_vec();
        let summary = update_sites(&ctx, &names, false).await.unwrap();

        assert_eq!(
            summary,
            RefreshSummary {
                crawled: 1,
                failed: 0,
                skipped: 3,
                stored: 1,
            }
        );
        assert_eq!(stored(&ctx, "user").await, 1);
        assert_eq!(stored(&ctx, "wemp").await, 0);
    }

    #[tokio::test]
    async fn test_recently_updated_skipped_unless_forced() {
        let server = MockServer::start().await;
        let ctx = context(Config::default()).await;
        add_site(&ctx, &server, "blog", 5, SiteCreator::User).await;
        let names = vec!["blog".to_string()];

        update_sites(&ctx, &names, false).await.unwrap();
        let again = update_sites(&ctx, &names, false).await.unwrap();
        assert_eq!(again.crawled, 0);
        assert_eq!(again.skipped, 1);

        let forced = update_sites(&ctx, &names, true).await.unwrap();
        assert_eq!(forced.crawled, 1);
        // URL already crawled: nothing new
        assert_eq!(forced.stored, 0);
    }

    #[tokio::test]
    async fn test_atom_cron_hour_parity_and_subscribers() {
        let server = MockServer::start().await;
        let ctx = context(Config::default()).await;
        add_site(&ctx, &server, "star", 9, SiteCreator::User).await;
        add_site(&ctx, &server, "followed", 3, SiteCreator::User).await;
        add_site(&ctx, &server, "lonely", 3, SiteCreator::User).await;
        ctx.db.subscribe("alice", "followed").await.unwrap();

        // Odd hour: recommended sites only
        let odd = update_all_atom_cron(&ctx, 13).await.unwrap();
        assert_eq!(odd.crawled, 1);
        assert_eq!(stored(&ctx, "star").await, 1);
        assert_eq!(stored(&ctx, "followed").await, 0);

        // Even hour: everything, minus unsubscribed low-star and fresh sites
        let even = update_all_atom_cron(&ctx, 14).await.unwrap();
        assert_eq!(even.crawled, 1);
        assert_eq!(even.skipped, 2);
        assert_eq!(stored(&ctx, "followed").await, 1);
        assert_eq!(stored(&ctx, "lonely").await, 0);
    }

    #[tokio::test]
    async fn test_atom_cron_counts_failures() {
        let server = MockServer::start().await;
        let ctx = context(Config::default()).await;
        ctx.db
            .upsert_site(&SiteSeed {
                name: "gone".into(),
                cname: "Gone".into(),
                link: String::new(),
                brief: String::new(),
                rss: format!("{}/missing", server.uri()),
                star: 10,
                creator: SiteCreator::User,
            })
            .await
            .unwrap();

        let summary = update_all_atom_cron(&ctx, 0).await.unwrap();
        assert_eq!(summary.failed, 1);
        let site = ctx.db.get_site_by_name("gone").await.unwrap().unwrap();
        assert!(site.error.is_some());
    }

    #[tokio::test]
    async fn test_wemp_cron_dispatches_by_host() {
        let server = MockServer::start().await;
        let mut config = Config::default();
        // The mock server stands in for an atom-capable mirror
        config.wemp.atom_hosts = vec![host_name(&server.uri())];
        let ctx = context(config).await;

        add_site(&ctx, &server, "mirror", 5, SiteCreator::Wemp).await;
        ctx.db
            .upsert_site(&SiteSeed {
                name: "other".into(),
                cname: "Other".into(),
                link: String::new(),
                brief: String::new(),
                rss: "https://unsupported.example.org/feed".into(),
                star: 5,
                creator: SiteCreator::Wemp,
            })
            .await
            .unwrap();

        let summary = update_all_wemp_cron(&ctx).await.unwrap();
        assert_eq!(summary.crawled, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(stored(&ctx, "mirror").await, 1);
    }
}
