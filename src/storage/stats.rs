use anyhow::{Context, Result};
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{RankedSite, RefererHit, SimilarArticle};

impl Database {
    // ========================================================================
    // Users & Subscriptions
    // ========================================================================

    /// Register a user by OAuth id, returning the user id
    pub async fn add_user(&self, oauth_id: &str) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO users (oauth_id, ctime) VALUES (?, ?)
            ON CONFLICT(oauth_id) DO UPDATE SET oauth_id = excluded.oauth_id
            RETURNING id
        "#,
        )
        .bind(oauth_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Subscribe a user to a site by name (idempotent)
    pub async fn subscribe(&self, oauth_id: &str, site_name: &str) -> Result<()> {
        let user_id = self.add_user(oauth_id).await?;
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            "INSERT OR IGNORE INTO subscriptions (user_id, site_name, ctime) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(site_name)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remove a subscription; returns false when none existed
    pub async fn unsubscribe(&self, oauth_id: &str, site_name: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM subscriptions
            WHERE site_name = ?
              AND user_id = (SELECT id FROM users WHERE oauth_id = ?)
        "#,
        )
        .bind(site_name)
        .bind(oauth_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// OAuth ids of every registered user
    pub async fn all_user_oauth_ids(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT oauth_id FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Site names one user is subscribed to, in subscription order
    pub async fn user_sub_feeds(&self, oauth_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT s.site_name
            FROM subscriptions s
            JOIN users u ON u.id = s.user_id
            WHERE u.oauth_id = ?
            ORDER BY s.ctime, s.rowid
        "#,
        )
        .bind(oauth_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Number of users subscribed to a site
    pub async fn subscriber_count(&self, site_name: &str) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM subscriptions WHERE site_name = ?")
                .bind(site_name)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    // ========================================================================
    // Crawled URLs
    // ========================================================================

    /// True when an article with this source URL was already stored
    pub async fn is_crawled_url(&self, url: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM crawled_urls WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Remember a source URL so later crawls skip it
    pub async fn mark_crawled_url(&self, url: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT OR IGNORE INTO crawled_urls (url, ctime) VALUES (?, ?)")
            .bind(url)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ========================================================================
    // Similar Articles
    // ========================================================================

    /// Stored neighbours of an article, or `None` when never computed
    pub async fn get_similar_articles(&self, uindex: i64) -> Result<Option<Vec<SimilarArticle>>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT payload FROM similar_articles WHERE uindex = ?")
                .bind(uindex)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((payload,)) => {
                let similar = serde_json::from_str(&payload).with_context(|| {
                    format!("Corrupt similar-article payload for uindex {uindex}")
                })?;
                Ok(Some(similar))
            }
            None => Ok(None),
        }
    }

    /// Store (or replace) the neighbours of an article
    pub async fn set_similar_articles(&self, uindex: i64, similar: &[SimilarArticle]) -> Result<()> {
        let payload = serde_json::to_string(similar)?;
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO similar_articles (uindex, payload, ctime) VALUES (?, ?, ?)
            ON CONFLICT(uindex) DO UPDATE SET payload = excluded.payload, ctime = excluded.ctime
        "#,
        )
        .bind(uindex)
        .bind(payload)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ========================================================================
    // Site Ranking
    // ========================================================================

    /// Replace the ranking snapshot in a single transaction
    pub async fn replace_site_ranking(&self, ranking: &[RankedSite]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM site_ranking")
            .execute(&mut *tx)
            .await?;

        // 9 columns * 100 rows stays under SQLite's parameter limit
        for chunk in ranking.chunks(100) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT INTO site_ranking (position, site_id, name, cname, link, brief, star, score, ctime) ",
            );
            builder.push_values(chunk, |mut b, site| {
                b.push_bind(site.position)
                    .push_bind(site.site_id)
                    .push_bind(&site.name)
                    .push_bind(&site.cname)
                    .push_bind(&site.link)
                    .push_bind(&site.brief)
                    .push_bind(site.star)
                    .push_bind(site.score)
                    .push_bind(now);
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Current ranking snapshot, best first
    pub async fn get_site_ranking(&self) -> Result<Vec<RankedSite>> {
        let rows = sqlx::query_as::<_, RankedSite>(
            r#"
            SELECT position, site_id, name, cname, link, brief, star, score
            FROM site_ranking
            ORDER BY position
        "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ========================================================================
    // Referer Stats
    // ========================================================================

    /// Increment the hit counter of `host` for `day` (YYYY-MM-DD)
    pub async fn add_referer_hit(&self, day: &str, host: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO referer_stats (day, host, hits) VALUES (?, ?, 1)
            ON CONFLICT(day, host) DO UPDATE SET hits = hits + 1
        "#,
        )
        .bind(day)
        .bind(host)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Referer hits for one day, most hits first
    pub async fn referer_hits(&self, day: &str) -> Result<Vec<RefererHit>> {
        let rows = sqlx::query_as::<_, RefererHit>(
            "SELECT day, host, hits FROM referer_stats WHERE day = ? ORDER BY hits DESC, host",
        )
        .bind(day)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriptions_roundtrip() {
        let db = Database::open(":memory:").await.unwrap();
        db.subscribe("u1", "alpha").await.unwrap();
        db.subscribe("u1", "beta").await.unwrap();
        db.subscribe("u1", "alpha").await.unwrap();
        db.subscribe("u2", "alpha").await.unwrap();

        assert_eq!(db.user_sub_feeds("u1").await.unwrap(), vec!["alpha", "beta"]);
        assert_eq!(db.subscriber_count("alpha").await.unwrap(), 2);
        assert_eq!(db.all_user_oauth_ids().await.unwrap(), vec!["u1", "u2"]);

        assert!(db.unsubscribe("u2", "alpha").await.unwrap());
        assert!(!db.unsubscribe("u2", "alpha").await.unwrap());
        assert_eq!(db.subscriber_count("alpha").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_crawled_urls() {
        let db = Database::open(":memory:").await.unwrap();
        assert!(!db.is_crawled_url("https://a.example.com/1").await.unwrap());
        db.mark_crawled_url("https://a.example.com/1").await.unwrap();
        db.mark_crawled_url("https://a.example.com/1").await.unwrap();
        assert!(db.is_crawled_url("https://a.example.com/1").await.unwrap());
    }

    #[tokio::test]
    async fn test_similar_articles_replace() {
        let db = Database::open(":memory:").await.unwrap();
        assert!(db.get_similar_articles(42).await.unwrap().is_none());

        let first = vec![SimilarArticle { uindex: 1, score: 0.5 }];
        db.set_similar_articles(42, &first).await.unwrap();
        assert_eq!(db.get_similar_articles(42).await.unwrap(), Some(first));

        let second = vec![
            SimilarArticle { uindex: 2, score: 0.9 },
            SimilarArticle { uindex: 3, score: 0.2 },
        ];
        db.set_similar_articles(42, &second).await.unwrap();
        assert_eq!(db.get_similar_articles(42).await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_referer_hits_accumulate() {
        let db = Database::open(":memory:").await.unwrap();
        db.add_referer_hit("2026-10-19", "news.example.com").await.unwrap();
        db.add_referer_hit("2026-10-19", "news.example.com").await.unwrap();
        db.add_referer_hit("2026-10-19", "blog.example.com").await.unwrap();
        db.add_referer_hit("2026-10-18", "news.example.com").await.unwrap();

        let hits = db.referer_hits("2026-10-19").await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].host, "news.example.com");
        assert_eq!(hits[0].hits, 2);
    }
}
