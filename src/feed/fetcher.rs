use futures::StreamExt;
use reqwest::redirect::Policy;
use std::time::Duration;
use thiserror::Error;

use crate::feed::parser::{parse_feed, FeedEntry};
use crate::pipeline::{Item, ItemPipeline, Processed};
use crate::storage::{Database, Site};

const MAX_RETRIES: u32 = 3;
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Retry n waits `BACKOFF_UNIT * 2^(n+1)`: 2s, 4s, 8s
const BACKOFF_UNIT: Duration = Duration::from_secs(1);

/// Errors that can occur while crawling one site.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the timeout
    #[error("Request timed out")]
    Timeout,
    /// Feed XML could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),
    /// A pipeline stage failed for a reason other than dropping the item
    #[error("Pipeline error: {0}")]
    Pipeline(String),
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Outcome of crawling one site.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    /// Site name
    pub site: String,
    /// Entries found in the feed
    pub fetched: usize,
    /// Entries stored as new articles
    pub stored: usize,
    /// Entries dropped by a pipeline stage
    pub dropped: usize,
    /// Entries already crawled, or accepted without being stored
    pub skipped: usize,
}

/// Build the HTTP client shared by every crawl.
///
/// Follows at most 3 redirects and rejects redirect loops.
pub fn build_client(user_agent: &str, timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .redirect(redirect_policy())
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .timeout(timeout)
        .build()
}

fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        for prev in attempt.previous() {
            if prev.as_str() == url.as_str() {
                return attempt.error("Redirect loop detected");
            }
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );

        attempt.follow()
    })
}

/// Feed spider: fetches a site's feed and runs every new entry through the
/// item pipeline.
pub struct Spider {
    db: Database,
    client: reqwest::Client,
    pipeline: ItemPipeline,
    timeout: Duration,
    backoff_unit: Duration,
}

impl Spider {
    pub fn new(db: Database, client: reqwest::Client, pipeline: ItemPipeline) -> Self {
        Self {
            db,
            client,
            pipeline,
            timeout: DEFAULT_TIMEOUT,
            backoff_unit: BACKOFF_UNIT,
        }
    }

    /// Spider using the standard validate, sanitize, store pipeline.
    pub fn standard(db: Database, client: reqwest::Client) -> Self {
        let pipeline = ItemPipeline::standard(db.clone());
        Self::new(db, client, pipeline)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Crawl one site and record the outcome on it.
    ///
    /// On success the site's fetch time is updated and its error cleared; on
    /// failure the error message is stored on the site.
    pub async fn crawl_site(&self, site: &Site, trims: &[String]) -> Result<CrawlReport, FetchError> {
        let result = self.crawl(site, trims).await;

        match &result {
            Ok(report) => {
                tracing::info!(
                    site = %site.name,
                    fetched = report.fetched,
                    stored = report.stored,
                    dropped = report.dropped,
                    skipped = report.skipped,
                    "Site crawled"
                );
                if let Err(e) = self.db.mark_site_fetched(site.id).await {
                    tracing::warn!(site = %site.name, error = %e, "Failed to record fetch time");
                }
            }
            Err(e) => {
                tracing::warn!(site = %site.name, rss = %site.rss, error = %e, "Site crawl failed");
                if let Err(db_err) = self.db.set_site_error(site.id, Some(&e.to_string())).await {
                    tracing::warn!(site = %site.name, error = %db_err, "Failed to record site error");
                }
            }
        }

        result
    }

    async fn crawl(&self, site: &Site, trims: &[String]) -> Result<CrawlReport, FetchError> {
        let bytes =
            fetch_with_backoff(&self.client, &site.rss, self.timeout, self.backoff_unit).await?;
        let entries = parse_feed(&bytes).map_err(|e| FetchError::Parse(e.to_string()))?;

        let mut report = CrawlReport {
            site: site.name.clone(),
            fetched: entries.len(),
            ..Default::default()
        };

        // Oldest first, so article ids follow publication order
        for entry in entries.into_iter().rev() {
            if !entry.url.is_empty() {
                let seen = self
                    .db
                    .is_crawled_url(&entry.url)
                    .await
                    .map_err(|e| FetchError::Database(e.to_string()))?;
                if seen {
                    report.skipped += 1;
                    continue;
                }
            }

            let item = into_item(entry, &site.name, trims);
            match self.pipeline.process(item).await {
                Ok(Processed::Passed(item)) if item.uindex.is_some() => report.stored += 1,
                Ok(Processed::Passed(_)) => report.skipped += 1,
                Ok(Processed::Dropped(_)) => report.dropped += 1,
                Err(e) => return Err(FetchError::Pipeline(e.to_string())),
            }
        }

        Ok(report)
    }
}

fn into_item(entry: FeedEntry, site_name: &str, trims: &[String]) -> Item {
    Item {
        name: site_name.to_string(),
        title: entry.title,
        url: entry.url,
        content: entry.content,
        trims: trims.to_vec(),
        uindex: None,
    }
}

/// Download a feed document.
///
/// Rate limiting (429), server errors (5xx) and truncated bodies are retried
/// with exponential backoff (2s, 4s, 8s); other non-2xx statuses fail at once.
pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<Vec<u8>, FetchError> {
    fetch_with_backoff(client, url, timeout, BACKOFF_UNIT).await
}

async fn fetch_with_backoff(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
    backoff_unit: Duration,
) -> Result<Vec<u8>, FetchError> {
    let mut retry_count = 0;

    loop {
        let response = tokio::time::timeout(timeout, client.get(url).send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            if retry_count >= MAX_RETRIES {
                return Err(FetchError::RateLimited(MAX_RETRIES));
            }

            let delay = backoff_unit * 2u32.pow(retry_count + 1);
            tracing::warn!(
                feed = %url,
                retry = retry_count,
                delay_ms = delay.as_millis() as u64,
                "Rate limited, backing off"
            );

            tokio::time::sleep(delay).await;
            retry_count += 1;
            continue;
        }

        if response.status().is_server_error() {
            if retry_count >= MAX_RETRIES {
                return Err(FetchError::HttpStatus(response.status().as_u16()));
            }

            let delay = backoff_unit * 2u32.pow(retry_count + 1);
            tracing::warn!(
                feed = %url,
                status = %response.status(),
                retry = retry_count,
                delay_ms = delay.as_millis() as u64,
                "Server error, retrying after delay"
            );

            tokio::time::sleep(delay).await;
            retry_count += 1;
            continue;
        }

        // 4xx fails immediately
        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        match read_limited_bytes(response, MAX_FEED_SIZE).await {
            Ok(bytes) => return Ok(bytes),
            Err(FetchError::IncompleteResponse { expected, received }) => {
                if retry_count >= MAX_RETRIES {
                    return Err(FetchError::IncompleteResponse { expected, received });
                }

                let delay = backoff_unit * 2u32.pow(retry_count + 1);
                tracing::debug!(
                    feed = %url,
                    expected = expected,
                    received = received,
                    attempt = retry_count + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying incomplete download"
                );

                tokio::time::sleep(delay).await;
                retry_count += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: Content-Length already over the limit
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
