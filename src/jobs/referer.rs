use anyhow::Result;
use chrono::NaiveDate;

use crate::storage::Database;
use crate::util::host_name;

/// Count one visit referred by `referer` under today's local date.
///
/// Returns false, recording nothing, when the referer has no host.
pub async fn add_referer_stats(db: &Database, referer: &str) -> Result<bool> {
    let today = chrono::Local::now().date_naive();
    record_referer(db, referer, today).await
}

/// Count one visit referred by `referer` on `day`.
pub async fn record_referer(db: &Database, referer: &str, day: NaiveDate) -> Result<bool> {
    let host = host_name(referer);
    if host.is_empty() {
        tracing::debug!(referer = %referer, "Referer without host ignored");
        return Ok(false);
    }

    db.add_referer_hit(&day.format("%Y-%m-%d").to_string(), &host)
        .await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hits_are_counted_per_host_and_day() {
        let db = Database::open(":memory:").await.unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let next = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();

        assert!(record_referer(&db, "https://www.Google.com/search?q=x", day).await.unwrap());
        assert!(record_referer(&db, "https://www.google.com/", day).await.unwrap());
        assert!(record_referer(&db, "https://news.ycombinator.com/item?id=1", day).await.unwrap());
        assert!(record_referer(&db, "https://www.google.com/", next).await.unwrap());

        let hits = db.referer_hits("2024-03-09").await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].host, "www.google.com");
        assert_eq!(hits[0].hits, 2);
        assert_eq!(hits[1].host, "news.ycombinator.com");
        assert_eq!(hits[1].hits, 1);

        assert_eq!(db.referer_hits("2024-03-10").await.unwrap()[0].hits, 1);
    }

    #[tokio::test]
    async fn test_referer_without_host_is_ignored() {
        let db = Database::open(":memory:").await.unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();

        assert!(!record_referer(&db, "", day).await.unwrap());
        assert!(!record_referer(&db, "not a url", day).await.unwrap());
        assert!(db.referer_hits("2024-03-09").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_today_is_used_by_default() {
        let db = Database::open(":memory:").await.unwrap();
        assert!(add_referer_stats(&db, "https://example.com/a").await.unwrap());

        let today = chrono::Local::now().date_naive().format("%Y-%m-%d").to_string();
        let hits = db.referer_hits(&today).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].host, "example.com");
    }
}
