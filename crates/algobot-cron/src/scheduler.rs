//! Job scheduler: computes next firing instants and drives job runs.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use algobot_gateway::{BotError, ErrorKind};
use algobot_types::{Clock, SystemClock};

use crate::{Job, JobOutcome};

/// Owns the job set and the time zone its triggers are evaluated in.
pub struct Scheduler {
    tz: Tz,
    clock: Arc<dyn Clock>,
    jobs: Vec<Arc<dyn Job>>,
}

impl Scheduler {
    /// Create an empty scheduler on the system clock.
    pub fn new(tz: Tz) -> Self {
        Self::with_clock(tz, Arc::new(SystemClock::new(tz)))
    }

    /// Create an empty scheduler reading time from `clock`.
    pub fn with_clock(tz: Tz, clock: Arc<dyn Clock>) -> Self {
        Self {
            tz,
            clock,
            jobs: Vec::new(),
        }
    }

    /// Add a job. Names are unique.
    pub fn add_job(&mut self, job: Arc<dyn Job>) -> Result<(), BotError> {
        if self.find(job.name()).is_some() {
            return Err(BotError::DuplicateJob(job.name().to_string()));
        }
        info!(job = job.name(), trigger = %job.trigger(), "Job registered");
        self.jobs.push(job);
        Ok(())
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn jobs(&self) -> &[Arc<dyn Job>] {
        &self.jobs
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn Job>> {
        self.jobs.iter().find(|j| j.name() == name).cloned()
    }

    /// Next firing instant of every job after `now`.
    pub fn next_runs(&self, now: DateTime<Utc>) -> Vec<(String, Option<DateTime<Tz>>)> {
        let local = now.with_timezone(&self.tz);
        self.jobs
            .iter()
            .map(|j| (j.name().to_string(), j.trigger().next_after(local)))
            .collect()
    }

    /// Run every job loop until `shutdown` is cancelled.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(jobs = self.jobs.len(), timezone = %self.tz, "Scheduler started");

        let mut loops = JoinSet::new();
        for job in &self.jobs {
            loops.spawn(job_loop(
                job.clone(),
                self.tz,
                self.clock.clone(),
                shutdown.clone(),
            ));
        }
        while let Some(result) = loops.join_next().await {
            if let Err(e) = result {
                error!("Job loop panicked: {e}");
            }
        }

        info!("Scheduler stopped");
    }
}

/// Run a job once and contain any failure at the job boundary.
pub async fn run_job(job: &dyn Job, today: NaiveDate) -> Option<JobOutcome> {
    info!(job = job.name(), %today, "Running job");
    match job.run(today).await {
        Ok(outcome) => {
            info!(
                job = job.name(),
                sent = outcome.sent,
                failed = outcome.failed,
                "Job finished"
            );
            Some(outcome)
        }
        Err(e) => {
            match e.kind() {
                ErrorKind::NotFound => warn!(job = job.name(), "Job aborted: {e}"),
                _ => error!(job = job.name(), "Job failed: {e}"),
            }
            None
        }
    }
}

async fn job_loop(
    job: Arc<dyn Job>,
    tz: Tz,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
) {
    let mut after = clock.now().with_timezone(&tz);
    loop {
        let Some(next) = job.trigger().next_after(after) else {
            warn!(job = job.name(), "Trigger has no future instant, job loop exiting");
            return;
        };

        let wait = (next - clock.now().with_timezone(&tz))
            .to_std()
            .unwrap_or_default();
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(wait) => {}
        }

        run_job(job.as_ref(), next.date_naive()).await;

        // Instants missed while the run was in progress are skipped, not replayed.
        let now = clock.now().with_timezone(&tz);
        if now > next {
            if let Some(skipped) = job.trigger().next_after(next).filter(|s| *s <= now) {
                warn!(job = job.name(), skipped = %skipped, "Missed trigger instant skipped");
            }
        }
        after = next.max(now);
    }
}
