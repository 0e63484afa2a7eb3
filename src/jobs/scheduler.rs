use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Result type for job execution.
pub type JobResult = anyhow::Result<()>;

/// A periodic background job.
#[async_trait]
pub trait SchedulerJob: Send + Sync {
    /// Stable name, also used to run the job once from the command line
    fn name(&self) -> &'static str;

    /// Time between two runs
    fn interval(&self) -> Duration;

    /// Run the job once
    async fn execute(&self) -> JobResult;
}

/// Runs registered jobs at their intervals, each in its own tokio task.
///
/// # Example
///
/// ```rust,ignore
/// let handles = Scheduler::new()
///     .with_job(ArchiveJob::new(ctx.clone(), Duration::from_secs(86400)))
///     .start();
/// ```
pub struct Scheduler {
    jobs: Vec<Arc<dyn SchedulerJob>>,
}

impl Scheduler {
    /// Creates a scheduler with no jobs.
    pub fn new() -> Self {
        Self { jobs: Vec::new() }
    }

    /// Adds a job. Jobs are not started until [`start`](Self::start) is called.
    pub fn with_job<J: SchedulerJob + 'static>(mut self, job: J) -> Self {
        self.jobs.push(Arc::new(job));
        self
    }

    /// Adds an already-wrapped job.
    pub fn with_arc_job(mut self, job: Arc<dyn SchedulerJob>) -> Self {
        self.jobs.push(job);
        self
    }

    /// Spawns one task per job and returns their handles.
    ///
    /// Every job runs once right away, then on each interval tick. Ticks
    /// missed while a run is still going are skipped, never queued.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        self.jobs
            .iter()
            .map(|job| {
                let job = Arc::clone(job);
                tokio::spawn(async move {
                    Self::run_job_loop(job).await;
                })
            })
            .collect()
    }

    async fn run_job_loop(job: Arc<dyn SchedulerJob>) {
        let name = job.name();
        let interval = job.interval();
        tracing::info!(job = name, interval_secs = interval.as_secs(), "Job scheduled");

        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            timer.tick().await;
            run_once(job.as_ref()).await;
        }
    }

    /// Names of the registered jobs, in registration order.
    pub fn job_names(&self) -> Vec<&'static str> {
        self.jobs.iter().map(|job| job.name()).collect()
    }

    /// Finds a registered job by name.
    pub fn job(&self, name: &str) -> Option<Arc<dyn SchedulerJob>> {
        self.jobs.iter().find(|job| job.name() == name).cloned()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Execute a job once, logging its outcome. Failures never escape.
pub async fn run_once(job: &dyn SchedulerJob) -> bool {
    let name = job.name();
    let started = std::time::Instant::now();

    match job.execute().await {
        Ok(()) => {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            tracing::debug!(job = name, elapsed_ms, "Job completed");
            true
        }
        Err(e) => {
            let error = format!("{e:#}");
            tracing::error!(job = name, error = %error, "Job failed");
            false
        }
    }
}
