//! algobot-cron: Scheduled notification engine.
//!
//! Each job pairs a [`WeeklyTrigger`] with a handler. The [`Scheduler`] runs
//! one loop per job that sleeps until the next nominal instant and runs the
//! handler; a failing run is logged and the job waits for its next instant.

pub mod jobs;
pub mod scheduler;
pub mod trigger;

use chrono::NaiveDate;

use algobot_gateway::BotError;

pub use scheduler::Scheduler;
pub use trigger::WeeklyTrigger;

/// Message counts from one job run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobOutcome {
    /// Messages the platform accepted.
    pub sent: usize,
    /// Messages the platform rejected.
    pub failed: usize,
}

/// A time-triggered unit of work.
#[async_trait::async_trait]
pub trait Job: Send + Sync {
    /// Unique job name.
    fn name(&self) -> &str;

    /// When the job fires.
    fn trigger(&self) -> &WeeklyTrigger;

    /// Run once for the calendar date of the firing instant.
    async fn run(&self, today: NaiveDate) -> Result<JobOutcome, BotError>;
}
