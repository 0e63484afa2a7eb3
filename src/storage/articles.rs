use anyhow::Result;
use std::sync::atomic::{AtomicI64, Ordering};

use super::schema::Database;
use super::types::{
    ArchiveCandidate, Article, ArticleDbRow, DatabaseError, NewArticle, Status, TaggedArticle,
};

const ARTICLE_COLUMNS: &str = "a.id, a.site_id, a.uindex, a.title, a.content, a.src_url, a.tags, \
                               a.is_recent, a.status, a.remark, a.ctime, a.mtime";

/// Last uindex handed out by this process
static LAST_UINDEX: AtomicI64 = AtomicI64::new(0);

/// Next article uindex: the current millisecond timestamp, bumped past the
/// previous value when two inserts land in the same millisecond.
pub fn next_uindex() -> i64 {
    let now = chrono::Utc::now().timestamp_millis();
    let mut last = LAST_UINDEX.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(last + 1);
        match LAST_UINDEX.compare_exchange_weak(last, candidate, Ordering::Relaxed, Ordering::Relaxed)
        {
            Ok(_) => return candidate,
            Err(actual) => last = actual,
        }
    }
}

impl Database {
    // ========================================================================
    // Article Writes
    // ========================================================================

    /// Insert a new recent, active article and return it.
    pub async fn insert_article(&self, article: &NewArticle) -> Result<Article, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let uindex = next_uindex();

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO articles (site_id, uindex, title, content, src_url, remark, ctime, mtime)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(article.site_id)
        .bind(uindex)
        .bind(&article.title)
        .bind(&article.content)
        .bind(&article.src_url)
        .bind(&article.remark)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(Article {
            id,
            site_id: article.site_id,
            uindex,
            title: article.title.clone(),
            content: article.content.clone(),
            src_url: article.src_url.clone(),
            tags: String::new(),
            is_recent: true,
            status: Status::Active,
            remark: article.remark.clone(),
            ctime: now,
            mtime: now,
        })
    }

    /// Replace an article's body with a single space after it was archived
    pub async fn clear_article_content(&self, article_id: i64) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("UPDATE articles SET content = ' ', mtime = ? WHERE id = ?")
            .bind(now)
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Store the JSON keyword map for an article
    pub async fn set_article_tags(&self, article_id: i64, tags: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("UPDATE articles SET tags = ?, mtime = ? WHERE id = ?")
            .bind(tags)
            .bind(now)
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Clear the recency flag on articles created at or before `cutoff`.
    pub async fn expire_recent_articles(&self, cutoff: i64) -> Result<u64> {
        let result = sqlx::query("UPDATE articles SET is_recent = 0 WHERE is_recent = 1 AND ctime <= ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete non-recent articles whose site has `star < max_star`.
    pub async fn delete_stale_articles(&self, max_star: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM articles
            WHERE is_recent = 0
              AND site_id IN (SELECT id FROM sites WHERE star < ?)
        "#,
        )
        .bind(max_star)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // ========================================================================
    // Article Queries
    // ========================================================================

    /// Get a single article by its uindex
    pub async fn get_article_by_uindex(&self, uindex: i64) -> Result<Option<Article>, DatabaseError> {
        let row = sqlx::query_as::<_, ArticleDbRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles a WHERE a.uindex = ?"
        ))
        .bind(uindex)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ArticleDbRow::into_article).transpose()
    }

    /// One page of non-recent articles from sites with `star >= min_star`,
    /// newest first, starting below `before_id`.
    ///
    /// Paged so the archive job never holds a read cursor open while it writes.
    pub async fn archive_candidates(
        &self,
        min_star: i64,
        before_id: i64,
        limit: i64,
    ) -> Result<Vec<ArchiveCandidate>> {
        let rows = sqlx::query_as::<_, ArchiveCandidate>(
            r#"
            SELECT a.id, a.uindex, a.content
            FROM articles a
            JOIN sites s ON s.id = a.site_id
            WHERE a.is_recent = 0 AND s.star >= ? AND a.id < ?
            ORDER BY a.id DESC
            LIMIT ?
        "#,
        )
        .bind(min_star)
        .bind(before_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Recent active untagged articles of sites with `star >= min_star`, newest first
    pub async fn untagged_recent_articles(&self, min_star: i64) -> Result<Vec<Article>, DatabaseError> {
        let rows = sqlx::query_as::<_, ArticleDbRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles a JOIN sites s ON s.id = a.site_id \
             WHERE a.is_recent = 1 AND a.status = 'active' AND s.star >= ? AND a.tags = '' \
             ORDER BY a.id DESC"
        ))
        .bind(min_star)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ArticleDbRow::into_article).collect()
    }

    /// Recent active tagged articles of sites with `star >= min_star`, newest first
    pub async fn tagged_recent_articles(&self, min_star: i64) -> Result<Vec<TaggedArticle>> {
        let rows = sqlx::query_as::<_, TaggedArticle>(
            r#"
            SELECT a.uindex, a.tags
            FROM articles a
            JOIN sites s ON s.id = a.site_id
            WHERE a.is_recent = 1 AND a.status = 'active' AND s.star >= ? AND a.tags != ''
            ORDER BY a.id DESC
        "#,
        )
        .bind(min_star)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Active tagged articles of sites with `star >= min_star` created after `since`
    pub async fn tagged_articles_since(&self, min_star: i64, since: i64) -> Result<Vec<TaggedArticle>> {
        let rows = sqlx::query_as::<_, TaggedArticle>(
            r#"
            SELECT a.uindex, a.tags
            FROM articles a
            JOIN sites s ON s.id = a.site_id
            WHERE a.status = 'active' AND s.star >= ? AND a.ctime > ? AND a.tags != ''
        "#,
        )
        .bind(min_star)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Count articles stored for a site
    pub async fn count_articles_for_site(&self, site_id: i64) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles WHERE site_id = ?")
            .bind(site_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Backdate an article
    #[cfg(test)]
    pub(crate) async fn set_article_ctime(&self, article_id: i64, ctime: i64) -> Result<()> {
        sqlx::query("UPDATE articles SET ctime = ? WHERE id = ?")
            .bind(ctime)
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
