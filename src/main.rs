use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use feedmill::config::{default_config_path, Config};
use feedmill::feed::opml;
use feedmill::jobs::{self, JobContext, Scheduler};
use feedmill::storage::{Database, DatabaseError};

#[derive(Parser, Debug)]
#[command(
    name = "feedmill",
    version,
    about = "Background worker for an RSS aggregator"
)]
struct Args {
    /// Config file (default: ~/.config/feedmill/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// SQLite database, overriding the config file
    #[arg(long, value_name = "FILE", global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler until interrupted
    Run,

    /// Run one job once: atom_refresh, wemp_refresh, archive, tagging, similarity, ranking
    Job { name: String },

    /// Refresh the named sites now
    Refresh {
        #[arg(required = true)]
        sites: Vec<String>,

        /// Crawl even when refreshed recently
        #[arg(long)]
        force: bool,
    },

    /// Import sites from an OPML file
    Import {
        file: PathBuf,

        /// Star given to imported sites
        #[arg(long, default_value_t = 10)]
        star: i64,
    },

    /// Subscribe a user to a site
    Subscribe { user: String, site: String },

    /// Remove a user's subscription to a site
    Unsubscribe { user: String, site: String },

    /// Record a visit referred by the given URL
    Referer { url: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG overrides; info otherwise
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    let mut config = match args.config.or_else(default_config_path) {
        Some(path) => Config::load(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(database) = args.database {
        config.database_path = database;
    }

    let db = open_database(&config).await?;

    match args.command {
        Command::Run => run_scheduler(db, config).await,
        Command::Job { name } => {
            let ctx = Arc::new(JobContext::new(db, config)?);
            let Some(job) = jobs::find_job(&ctx, &name) else {
                anyhow::bail!(
                    "Unknown job '{}'. Available: {}",
                    name,
                    jobs::JOB_NAMES.join(", ")
                );
            };
            job.execute()
                .await
                .with_context(|| format!("Job '{}' failed", name))
        }
        Command::Refresh { sites, force } => {
            let ctx = JobContext::new(db, config)?;
            let summary = jobs::update_sites(&ctx, &sites, force).await?;
            println!(
                "Crawled {} sites ({} failed, {} skipped), {} new articles",
                summary.crawled, summary.failed, summary.skipped, summary.stored
            );
            Ok(())
        }
        Command::Import { file, star } => {
            // Resolve symlinks and refuse anything but a regular file
            let canonical = file
                .canonicalize()
                .with_context(|| format!("Failed to resolve import file: {}", file.display()))?;
            if !std::fs::metadata(&canonical)?.is_file() {
                anyhow::bail!("Import path must be a regular file");
            }
            let path = canonical
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in import path"))?;

            let written = opml::import(&db, path, star).await?;
            println!("Imported {} sites from {}", written, canonical.display());
            Ok(())
        }
        Command::Subscribe { user, site } => {
            if db.get_site_by_name(&site).await?.is_none() {
                tracing::warn!(site = %site, "Subscribing to a site that does not exist yet");
            }
            db.subscribe(&user, &site).await?;
            println!("{} subscribed to {}", user, site);
            Ok(())
        }
        Command::Unsubscribe { user, site } => {
            if db.unsubscribe(&user, &site).await? {
                println!("{} unsubscribed from {}", user, site);
            } else {
                eprintln!("Warning: {} was not subscribed to {}", user, site);
            }
            Ok(())
        }
        Command::Referer { url } => {
            if !jobs::add_referer_stats(&db, &url).await? {
                eprintln!("Warning: '{}' has no host, nothing recorded", url);
            }
            Ok(())
        }
    }
}

async fn open_database(config: &Config) -> Result<Database> {
    if let Some(parent) = config.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {}", parent.display())
            })?;
        }
    }

    let path = config
        .database_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;

    match Database::open(path).await {
        Ok(db) => Ok(db),
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: the database at {} is locked by another process.", path);
            std::process::exit(1);
        }
        Err(e) => Err(anyhow::anyhow!("Failed to open database: {}", e)),
    }
}

async fn run_scheduler(db: Database, config: Config) -> Result<()> {
    let ctx = Arc::new(JobContext::new(db, config)?);
    let scheduler = Scheduler::from_context(&ctx);
    if scheduler.job_count() == 0 {
        anyhow::bail!("Every job is disabled in the configuration");
    }

    tracing::info!(jobs = ?scheduler.job_names(), "Scheduler starting");
    let handles = scheduler.start();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested, stopping jobs");

    for handle in handles {
        handle.abort();
    }
    Ok(())
}
