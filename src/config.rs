//! Configuration file parser for ~/.config/feedmill/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Every section uses `#[serde(default)]`, so any subset of keys can be set.
//! Unknown top-level keys are accepted but logged as potential typos.
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::text::TagOptions;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level worker configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database shared with the web application.
    pub database_path: PathBuf,

    /// Directory receiving archived article bodies (`<uindex>.dat`).
    pub archive_dir: PathBuf,

    /// User-Agent sent with feed requests.
    pub user_agent: String,

    pub refresh: RefreshConfig,
    pub archive: ArchiveConfig,
    pub tagging: TaggingConfig,
    pub similarity: SimilarityConfig,
    pub ranking: RankingConfig,
    pub wemp: WempConfig,
    pub schedule: ScheduleConfig,

    /// CSS selectors emptied in article bodies, keyed by site name.
    pub trims: BTreeMap<String, Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        let base = default_data_dir();
        Self {
            database_path: base.join("feedmill.db"),
            archive_dir: base.join("archive"),
            user_agent: format!("feedmill/{}", env!("CARGO_PKG_VERSION")),
            refresh: RefreshConfig::default(),
            archive: ArchiveConfig::default(),
            tagging: TaggingConfig::default(),
            similarity: SimilarityConfig::default(),
            ranking: RankingConfig::default(),
            wemp: WempConfig::default(),
            schedule: ScheduleConfig::default(),
            trims: BTreeMap::new(),
        }
    }
}

/// Feed refresh policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// A site refreshed less than this many minutes ago is skipped unless forced.
    pub min_interval_minutes: u64,
    /// Sites at or above this star are refreshed every hour and even without subscribers.
    pub recommended_star: i64,
    /// Maximum sites crawled at the same time.
    pub concurrency: usize,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            min_interval_minutes: 30,
            recommended_star: 9,
            concurrency: 4,
            timeout_secs: 30,
        }
    }
}

/// Archive tiering.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Old articles of sites below this star are deleted; the rest are moved to disk.
    pub keep_star: i64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self { keep_star: 10 }
    }
}

/// Keyword extraction.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TaggingConfig {
    /// Articles older than this lose their recency flag.
    pub recent_days: i64,
    /// Only articles of sites at or above this star are tagged.
    pub min_star: i64,
    pub top_n: usize,
    pub min_count: u32,
    pub title_weight: usize,
}

impl Default for TaggingConfig {
    fn default() -> Self {
        let defaults = TagOptions::default();
        Self {
            recent_days: 7,
            min_star: 10,
            top_n: defaults.top_n,
            min_count: defaults.min_count,
            title_weight: defaults.title_weight,
        }
    }
}

impl TaggingConfig {
    pub fn tag_options(&self) -> TagOptions {
        TagOptions {
            top_n: self.top_n,
            min_count: self.min_count,
            title_weight: self.title_weight,
        }
    }
}

/// Similar-article recommendation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    /// Articles are compared against everything from this many days back.
    pub window_days: i64,
    /// Only articles of sites at or above this star take part.
    pub min_star: i64,
    /// Matches must score strictly above this.
    pub min_score: f64,
    pub top_n: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            window_days: 30,
            min_star: 10,
            min_score: 0.1,
            top_n: 10,
        }
    }
}

/// Subscription ranking.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub top_n: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self { top_n: 100 }
    }
}

/// Public-account mirrors.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WempConfig {
    /// Mirror hosts that serve a regular RSS/Atom feed and can be crawled.
    pub atom_hosts: Vec<String>,
}

impl Default for WempConfig {
    fn default() -> Self {
        Self {
            atom_hosts: vec!["qnmlgb.tech".to_string()],
        }
    }
}

/// Job intervals in minutes. 0 disables a job in the scheduler.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub atom_refresh_minutes: u64,
    pub wemp_refresh_minutes: u64,
    pub archive_minutes: u64,
    pub tagging_minutes: u64,
    pub similarity_minutes: u64,
    pub ranking_minutes: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            atom_refresh_minutes: 60,
            wemp_refresh_minutes: 720,
            archive_minutes: 1440,
            tagging_minutes: 20,
            similarity_minutes: 30,
            ranking_minutes: 1440,
        }
    }
}

impl ScheduleConfig {
    /// Longest interval a job can be given: one year.
    pub const MAX_INTERVAL_MINUTES: u64 = 365 * 24 * 60;

    /// Interval for a job, or `None` when disabled. Capped at one year.
    pub fn interval(minutes: u64) -> Option<Duration> {
        let minutes = minutes.min(Self::MAX_INTERVAL_MINUTES);
        (minutes > 0).then(|| Duration::from_secs(minutes.saturating_mul(60)))
    }
}

fn default_data_dir() -> PathBuf {
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".local").join("share").join("feedmill"),
        Err(_) => PathBuf::from("."),
    }
}

/// Default config path (~/.config/feedmill/config.toml)
pub fn default_config_path() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(|home| {
        PathBuf::from(home)
            .join(".config")
            .join("feedmill")
            .join("config.toml")
    })
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 11] = [
        "database_path",
        "archive_dir",
        "user_agent",
        "refresh",
        "archive",
        "tagging",
        "similarity",
        "ranking",
        "wemp",
        "schedule",
        "trims",
    ];

    /// Trim selectors configured for a site, empty when none.
    pub fn trims_for(&self, site: &str) -> &[String] {
        self.trims.get(site).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            database = %config.database_path.display(),
            "Loaded configuration"
        );
        Ok(config)
    }
}

// ============================================================================
// Tests
// ============================================================================
