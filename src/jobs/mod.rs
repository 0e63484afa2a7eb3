//! Periodic background jobs and the scheduler that runs them.
//!
//! Every job is a plain async function taking its inputs explicitly, plus a
//! [`SchedulerJob`] wrapper reading them from the shared [`JobContext`]:
//!
//! | Job            | Function                      |
//! |----------------|-------------------------------|
//! | `atom_refresh` | [`update_all_atom_cron`]      |
//! | `wemp_refresh` | [`update_all_wemp_cron`]      |
//! | `archive`      | [`archive_article_cron`]      |
//! | `tagging`      | [`cal_all_article_tag_cron`]  |
//! | `similarity`   | [`cal_article_distance_cron`] |
//! | `ranking`      | [`cal_site_ranking_cron`]     |
//!
//! [`update_sites`] and [`add_referer_stats`] are on-demand operations.

mod archive;
mod context;
mod ranking;
mod referer;
mod refresh;
mod scheduler;
mod similarity;
mod tagging;

use std::sync::Arc;

pub use archive::{archive_article_cron, archive_path, ArchiveJob, ArchiveSummary};
pub use context::JobContext;
pub use ranking::{cal_site_ranking_cron, RankingJob};
pub use referer::{add_referer_stats, record_referer};
pub use refresh::{
    update_all_atom_cron, update_all_wemp_cron, update_sites, AtomRefreshJob, RefreshSummary,
    WempRefreshJob,
};
pub use scheduler::{run_once, JobResult, Scheduler, SchedulerJob};
pub use similarity::{cal_article_distance_cron, SimilarityJob, SimilaritySummary};
pub use tagging::{cal_all_article_tag_cron, TaggingJob, TaggingSummary};

use crate::config::ScheduleConfig;

/// Every job with its configured interval, in a fixed order.
///
/// Jobs whose interval is 0 still appear, with a one-day interval, so they
/// can be run once by name; [`Scheduler::from_context`] leaves them out.
pub fn all_jobs(ctx: &Arc<JobContext>) -> Vec<(Arc<dyn SchedulerJob>, bool)> {
    let schedule = &ctx.config.schedule;
    let entry = |minutes: u64| -> (std::time::Duration, bool) {
        match ScheduleConfig::interval(minutes) {
            Some(interval) => (interval, true),
            None => (std::time::Duration::from_secs(86_400), false),
        }
    };

    let (atom, atom_on) = entry(schedule.atom_refresh_minutes);
    let (wemp, wemp_on) = entry(schedule.wemp_refresh_minutes);
    let (archive, archive_on) = entry(schedule.archive_minutes);
    let (tagging, tagging_on) = entry(schedule.tagging_minutes);
    let (similarity, similarity_on) = entry(schedule.similarity_minutes);
    let (ranking, ranking_on) = entry(schedule.ranking_minutes);

    vec![
        (Arc::new(AtomRefreshJob::new(ctx.clone(), atom)) as Arc<dyn SchedulerJob>, atom_on),
        (Arc::new(WempRefreshJob::new(ctx.clone(), wemp)), wemp_on),
        (Arc::new(ArchiveJob::new(ctx.clone(), archive)), archive_on),
        (Arc::new(TaggingJob::new(ctx.clone(), tagging)), tagging_on),
        (Arc::new(SimilarityJob::new(ctx.clone(), similarity)), similarity_on),
        (Arc::new(RankingJob::new(ctx.clone(), ranking)), ranking_on),
    ]
}

impl Scheduler {
    /// Scheduler holding every job enabled in the configuration.
    pub fn from_context(ctx: &Arc<JobContext>) -> Self {
        all_jobs(ctx)
            .into_iter()
            .filter(|(job, enabled)| {
                if !enabled {
                    tracing::info!(job = job.name(), "Job disabled in configuration");
                }
                *enabled
            })
            .fold(Scheduler::new(), |scheduler, (job, _)| scheduler.with_arc_job(job))
    }
}

/// Find a job by name among all jobs, enabled or not.
pub fn find_job(ctx: &Arc<JobContext>, name: &str) -> Option<Arc<dyn SchedulerJob>> {
    all_jobs(ctx)
        .into_iter()
        .map(|(job, _)| job)
        .find(|job| job.name() == name)
}

/// Names of every job, for command-line help and errors.
pub const JOB_NAMES: [&str; 6] = [
    "atom_refresh",
    "wemp_refresh",
    "archive",
    "tagging",
    "similarity",
    "ranking",
];
