use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another worker process has locked the database
    #[error("Another feedmill worker appears to be holding the database lock. Stop it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A stored enum column holds a value this build does not know
    #[error("Invalid value '{value}' in column {column}")]
    InvalidColumn { column: &'static str, value: String },

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Enumerated Columns
// ============================================================================

/// Lifecycle state shared by sites and articles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Inactive,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Inactive => "inactive",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Status::Active),
            "inactive" => Ok(Status::Inactive),
            other => Err(DatabaseError::InvalidColumn {
                column: "status",
                value: other.to_string(),
            }),
        }
    }
}

/// Who registered a site, which decides how it gets refreshed.
///
/// - `User`: a regular RSS/Atom source, crawled by the hourly refresh
/// - `Wemp`: a public-account mirror, only refreshed by the daily wemp job
/// - `System`: built-in sources that are never crawled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteCreator {
    User,
    Wemp,
    System,
}

impl SiteCreator {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteCreator::User => "user",
            SiteCreator::Wemp => "wemp",
            SiteCreator::System => "system",
        }
    }
}

impl fmt::Display for SiteCreator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SiteCreator {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(SiteCreator::User),
            "wemp" => Ok(SiteCreator::Wemp),
            "system" => Ok(SiteCreator::System),
            other => Err(DatabaseError::InvalidColumn {
                column: "creator",
                value: other.to_string(),
            }),
        }
    }
}

// ============================================================================
// Input Types
// ============================================================================

/// A site to register or update, keyed by `name`.
#[derive(Debug, Clone)]
pub struct SiteSeed {
    pub name: String,
    pub cname: String,
    pub link: String,
    pub brief: String,
    pub rss: String,
    pub star: i64,
    pub creator: SiteCreator,
}

/// A sanitized article ready to be stored.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub site_id: i64,
    pub title: String,
    pub content: String,
    pub src_url: String,
    pub remark: String,
}

// ============================================================================
// Row Types
// ============================================================================

/// Internal row type for site queries; enum columns are validated in `into_site()`.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SiteDbRow {
    pub id: i64,
    pub name: String,
    pub cname: String,
    pub link: String,
    pub brief: String,
    pub rss: String,
    pub star: i64,
    pub status: String,
    pub creator: String,
    pub last_fetched: Option<i64>,
    pub error: Option<String>,
    pub ctime: i64,
    pub mtime: i64,
}

impl SiteDbRow {
    pub(crate) fn into_site(self) -> Result<Site, DatabaseError> {
        Ok(Site {
            id: self.id,
            name: self.name,
            cname: self.cname,
            link: self.link,
            brief: self.brief,
            rss: self.rss,
            star: self.star,
            status: self.status.parse()?,
            creator: self.creator.parse()?,
            last_fetched: self.last_fetched,
            error: self.error,
            ctime: self.ctime,
            mtime: self.mtime,
        })
    }
}

/// Internal row type for article queries
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ArticleDbRow {
    pub id: i64,
    pub site_id: i64,
    pub uindex: i64,
    pub title: String,
    pub content: String,
    pub src_url: String,
    pub tags: String,
    pub is_recent: bool,
    pub status: String,
    pub remark: String,
    pub ctime: i64,
    pub mtime: i64,
}

impl ArticleDbRow {
    pub(crate) fn into_article(self) -> Result<Article, DatabaseError> {
        Ok(Article {
            id: self.id,
            site_id: self.site_id,
            uindex: self.uindex,
            title: self.title,
            content: self.content,
            src_url: self.src_url,
            tags: self.tags,
            is_recent: self.is_recent,
            status: self.status.parse()?,
            remark: self.remark,
            ctime: self.ctime,
            mtime: self.mtime,
        })
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// Subscription source
#[derive(Debug, Clone)]
pub struct Site {
    pub id: i64,
    pub name: String,
    pub cname: String,
    pub link: String,
    pub brief: String,
    pub rss: String,
    pub star: i64,
    pub status: Status,
    pub creator: SiteCreator,
    /// Unix seconds of the last successful refresh
    pub last_fetched: Option<i64>,
    pub error: Option<String>,
    pub ctime: i64,
    pub mtime: i64,
}

impl Site {
    /// True when the site was refreshed less than `window_secs` before `now`.
    pub fn updated_within(&self, window_secs: i64, now: i64) -> bool {
        match self.last_fetched {
            Some(ts) => now.saturating_sub(ts) < window_secs,
            None => false,
        }
    }
}

/// Stored article
///
/// `tags` holds the JSON keyword map, or an empty string while untagged.
/// `content` is a single space once the body has been archived to disk.
#[derive(Debug, Clone)]
pub struct Article {
    pub id: i64,
    pub site_id: i64,
    pub uindex: i64,
    pub title: String,
    pub content: String,
    pub src_url: String,
    pub tags: String,
    pub is_recent: bool,
    pub status: Status,
    pub remark: String,
    pub ctime: i64,
    pub mtime: i64,
}

/// Archive candidate: only what the archive job needs.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ArchiveCandidate {
    pub id: i64,
    pub uindex: i64,
    pub content: String,
}

/// An article's keyword map as stored, used by the similarity job.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaggedArticle {
    pub uindex: i64,
    pub tags: String,
}

/// One neighbour in a stored similarity result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarArticle {
    pub uindex: i64,
    pub score: f64,
}

/// One row of the subscription ranking snapshot.
///
/// Carries only the public site fields; fetch metadata stays private.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RankedSite {
    pub position: i64,
    pub site_id: i64,
    pub name: String,
    pub cname: String,
    pub link: String,
    pub brief: String,
    pub star: i64,
    pub score: i64,
}

/// Daily hit count for one referring host.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct RefererHit {
    pub day: String,
    pub host: String,
    pub hits: i64,
}
