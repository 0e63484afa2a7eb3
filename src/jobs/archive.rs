use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::context::JobContext;
use super::scheduler::{JobResult, SchedulerJob};
use crate::storage::{ArchiveCandidate, Database};
use crate::util::atomic_write;

const PAGE_SIZE: i64 = 200;

/// Totals of one archive run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Old articles of low-star sites removed
    pub deleted: u64,
    /// Bodies moved to disk
    pub archived: usize,
    /// Bodies that could not be written, left in place for the next run
    pub failed: usize,
}

/// Path of an archived article body.
pub fn archive_path(dir: &Path, uindex: i64) -> PathBuf {
    dir.join(format!("{uindex}.dat"))
}

/// Move old article bodies out of the database.
///
/// Non-recent articles of sites below `keep_star` are deleted. For the rest,
/// newest first, each body is written to `<dir>/<uindex>.dat` and replaced
/// by a single space. A body that cannot be written is logged and kept.
/// Stops at the first body that is already blank, since everything older was
/// archived by an earlier run.
pub async fn archive_article_cron(db: &Database, dir: &Path, keep_star: i64) -> Result<ArchiveSummary> {
    let deleted = db.delete_stale_articles(keep_star).await?;
    if deleted > 0 {
        tracing::info!(deleted, keep_star, "Deleted old articles of low-star sites");
    }

    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create archive directory {}", dir.display()))?;

    let mut summary = ArchiveSummary {
        deleted,
        ..Default::default()
    };
    let mut before_id = i64::MAX;

    'pages: loop {
        let page = db.archive_candidates(keep_star, before_id, PAGE_SIZE).await?;
        let Some(last) = page.last() else {
            break;
        };
        before_id = last.id;
        let full_page = page.len() as i64 == PAGE_SIZE;

        for ArchiveCandidate { id, uindex, content } in page {
            if content.trim().is_empty() {
                tracing::debug!(uindex, "Reached archived articles, stopping");
                break 'pages;
            }

            let dst = archive_path(dir, uindex);
            let written = tokio::task::spawn_blocking(move || atomic_write(&dst, content.as_bytes()))
                .await
                .map_err(anyhow::Error::from)
                .and_then(|result| result);
            if let Err(e) = written {
                tracing::warn!(uindex, error = %e, "Failed to archive article, keeping body");
                summary.failed += 1;
                continue;
            }

            db.clear_article_content(id).await?;
            summary.archived += 1;
        }

        if !full_page {
            break;
        }
    }

    tracing::info!(
        deleted = summary.deleted,
        archived = summary.archived,
        failed = summary.failed,
        dir = %dir.display(),
        "Archive finished"
    );
    Ok(summary)
}

/// Daily archive of old articles.
pub struct ArchiveJob {
    ctx: Arc<JobContext>,
    interval: Duration,
}

impl ArchiveJob {
    pub fn new(ctx: Arc<JobContext>, interval: Duration) -> Self {
        Self { ctx, interval }
    }
}

#[async_trait]
impl SchedulerJob for ArchiveJob {
    fn name(&self) -> &'static str {
        "archive"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn execute(&self) -> JobResult {
        let config = &self.ctx.config;
        archive_article_cron(&self.ctx.db, &config.archive_dir, config.archive.keep_star).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{NewArticle, SiteCreator, SiteSeed};

    async fn add_site(db: &Database, name: &str, star: i64) -> i64 {
        db.upsert_site(&SiteSeed {
            name: name.into(),
            cname: name.into(),
            link: String::new(),
            brief: String::new(),
            rss: format!("https://{name}.example.com/feed"),
            star,
            creator: SiteCreator::User,
        })
        .await
        .unwrap()
    }

    async fn add_old_article(db: &Database, site_id: i64, content: &str) -> (i64, i64) {
        let article = db
            .insert_article(&NewArticle {
                site_id,
                title: "t".into(),
                content: content.into(),
                src_url: format!("https://x.test/{}", content.len()),
                remark: String::new(),
            })
            .await
            .unwrap();
        (article.id, article.uindex)
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("feedmill_archive_test_{name}"));
        std::fs::remove_dir_all(&dir).ok();
        dir
    }

    #[tokio::test]
    async fn test_archives_high_star_and_deletes_low_star() {
        let db = Database::open(":memory:").await.unwrap();
        let high = add_site(&db, "high", 10).await;
        let low = add_site(&db, "low", 3).await;

        let (_, kept) = add_old_article(&db, high, "<p>keep me</p>").await;
        add_old_article(&db, low, "<p>drop me</p>").await;
        add_old_article(&db, high, "<p>still recent</p>").await;
        // Everything but the last article leaves the recent window
        db.expire_recent_articles(i64::MAX).await.unwrap();
        let (_, recent) = add_old_article(&db, high, "<p>new</p>").await;

        let dir = temp_dir("tiers");
        let summary = archive_article_cron(&db, &dir, 10).await.unwrap();

        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.archived, 2);
        assert_eq!(db.count_articles_for_site(low).await.unwrap(), 0);

        let archived = db.get_article_by_uindex(kept).await.unwrap().unwrap();
        assert_eq!(archived.content, " ");
        assert_eq!(
            std::fs::read_to_string(archive_path(&dir, kept)).unwrap(),
            "<p>keep me</p>"
        );

        let untouched = db.get_article_by_uindex(recent).await.unwrap().unwrap();
        assert_eq!(untouched.content, "<p>new</p>");
        assert!(!archive_path(&dir, recent).exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_stops_at_first_blank_body() {
        let db = Database::open(":memory:").await.unwrap();
        let site = add_site(&db, "blog", 20).await;

        let (_, oldest) = add_old_article(&db, site, "<p>oldest</p>").await;
        let (blank_id, _) = add_old_article(&db, site, "<p>middle</p>").await;
        db.clear_article_content(blank_id).await.unwrap();
        let (_, newest) = add_old_article(&db, site, "<p>newest</p>").await;
        db.expire_recent_articles(i64::MAX).await.unwrap();

        let dir = temp_dir("blank");
        let summary = archive_article_cron(&db, &dir, 10).await.unwrap();

        assert_eq!(summary.archived, 1);
        assert!(archive_path(&dir, newest).exists());
        // Older than the blank body: left alone
        assert!(!archive_path(&dir, oldest).exists());
        let oldest = db.get_article_by_uindex(oldest).await.unwrap().unwrap();
        assert_eq!(oldest.content, "<p>oldest</p>");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_failed_write_is_skipped_and_run_continues() {
        let db = Database::open(":memory:").await.unwrap();
        let site = add_site(&db, "blog", 20).await;
        let (_, older) = add_old_article(&db, site, "<p>older</p>").await;
        let (_, blocked) = add_old_article(&db, site, "<p>blocked</p>").await;
        db.expire_recent_articles(i64::MAX).await.unwrap();

        // A non-empty directory at the destination makes the rename fail
        let dir = temp_dir("failed_write");
        let in_the_way = archive_path(&dir, blocked);
        std::fs::create_dir_all(in_the_way.join("occupied")).unwrap();

        let summary = archive_article_cron(&db, &dir, 10).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.archived, 1);

        let kept = db.get_article_by_uindex(blocked).await.unwrap().unwrap();
        assert_eq!(kept.content, "<p>blocked</p>");
        assert_eq!(
            std::fs::read_to_string(archive_path(&dir, older)).unwrap(),
            "<p>older</p>"
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let db = Database::open(":memory:").await.unwrap();
        let site = add_site(&db, "blog", 20).await;
        add_old_article(&db, site, "<p>a</p>").await;
        add_old_article(&db, site, "<p>bb</p>").await;
        db.expire_recent_articles(i64::MAX).await.unwrap();

        let dir = temp_dir("rerun");
        assert_eq!(archive_article_cron(&db, &dir, 10).await.unwrap().archived, 2);
        assert_eq!(archive_article_cron(&db, &dir, 10).await.unwrap().archived, 0);

        std::fs::remove_dir_all(&dir).ok();
    }
}
