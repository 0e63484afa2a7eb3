use anyhow::Result;
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{DatabaseError, Site, SiteCreator, SiteDbRow, SiteSeed, Status};

const SITE_COLUMNS: &str = "id, name, cname, link, brief, rss, star, status, creator, \
                            last_fetched, error, ctime, mtime";

impl Database {
    // ========================================================================
    // Site Registration
    // ========================================================================

    /// Insert or update a site keyed by name, returning its id.
    ///
    /// Existing sites keep their status, fetch metadata and ctime.
    pub async fn upsert_site(&self, seed: &SiteSeed) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO sites (name, cname, link, brief, rss, star, creator, ctime, mtime)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                cname = excluded.cname,
                link = excluded.link,
                brief = excluded.brief,
                rss = excluded.rss,
                star = excluded.star,
                creator = excluded.creator,
                mtime = excluded.mtime
            RETURNING id
        "#,
        )
        .bind(&seed.name)
        .bind(&seed.cname)
        .bind(&seed.link)
        .bind(&seed.brief)
        .bind(&seed.rss)
        .bind(seed.star)
        .bind(seed.creator.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Bulk import sites (OPML), batched in chunks of 100.
    ///
    /// Only descriptive fields are refreshed on conflict; star and creator
    /// set by an operator are not overwritten by an import.
    pub async fn import_sites(&self, seeds: &[SiteSeed]) -> Result<usize> {
        if seeds.is_empty() {
            return Ok(0);
        }

        const BATCH_SIZE: usize = 100;
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        let mut affected = 0usize;

        for chunk in seeds.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT INTO sites (name, cname, link, brief, rss, star, creator, ctime, mtime) ",
            );

            builder.push_values(chunk, |mut b, seed| {
                b.push_bind(&seed.name)
                    .push_bind(&seed.cname)
                    .push_bind(&seed.link)
                    .push_bind(&seed.brief)
                    .push_bind(&seed.rss)
                    .push_bind(seed.star)
                    .push_bind(seed.creator.as_str())
                    .push_bind(now)
                    .push_bind(now);
            });

            builder.push(
                " ON CONFLICT(name) DO UPDATE SET cname = excluded.cname, link = excluded.link, \
                 rss = excluded.rss, mtime = excluded.mtime",
            );

            let result = builder.build().execute(&mut *tx).await?;
            affected += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(affected)
    }

    /// Change a site's status; returns false when no site has that name.
    pub async fn set_site_status(&self, name: &str, status: Status) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query("UPDATE sites SET status = ?, mtime = ? WHERE name = ?")
            .bind(status.as_str())
            .bind(now)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Site Queries
    // ========================================================================

    /// Get a site by name regardless of status
    pub async fn get_site_by_name(&self, name: &str) -> Result<Option<Site>, DatabaseError> {
        let row = sqlx::query_as::<_, SiteDbRow>(&format!(
            "SELECT {SITE_COLUMNS} FROM sites WHERE name = ?"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SiteDbRow::into_site).transpose()
    }

    /// Get a site by name only when it is active
    pub async fn get_active_site(&self, name: &str) -> Result<Option<Site>, DatabaseError> {
        let row = sqlx::query_as::<_, SiteDbRow>(&format!(
            "SELECT {SITE_COLUMNS} FROM sites WHERE name = ? AND status = 'active'"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SiteDbRow::into_site).transpose()
    }

    /// Active sites of one creator with `star >= min_star`, most popular first.
    pub async fn get_active_sites(
        &self,
        creator: SiteCreator,
        min_star: i64,
    ) -> Result<Vec<Site>, DatabaseError> {
        let rows = sqlx::query_as::<_, SiteDbRow>(&format!(
            "SELECT {SITE_COLUMNS} FROM sites \
             WHERE status = 'active' AND creator = ? AND star >= ? \
             ORDER BY star DESC, id"
        ))
        .bind(creator.as_str())
        .bind(min_star)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SiteDbRow::into_site).collect()
    }

    // ========================================================================
    // Fetch Bookkeeping
    // ========================================================================

    /// Record a successful refresh: stamp last_fetched and clear any error
    pub async fn mark_site_fetched(&self, site_id: i64) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("UPDATE sites SET last_fetched = ?, error = NULL WHERE id = ?")
            .bind(now)
            .bind(site_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Set or clear the error status for a site
    pub async fn set_site_error(&self, site_id: i64, error: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE sites SET error = ? WHERE id = ?")
            .bind(error)
            .bind(site_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
