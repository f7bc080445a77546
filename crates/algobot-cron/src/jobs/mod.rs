//! The bot's scheduled notification jobs.

pub mod algo_reminder;
pub mod role_reminder;
pub mod weekly_report;

use std::sync::Arc;

use chrono::Weekday;

use algobot_config::AlgoBotConfig;
use algobot_gateway::Platform;
use algobot_storage::AlgoBotStorage;

use crate::{Job, WeeklyTrigger};

pub use algo_reminder::AlgoReminderJob;
pub use role_reminder::RoleReminderJob;
pub use weekly_report::WeeklyReportJob;

/// Build every job enabled in `config`.
pub fn configured_jobs(
    config: &AlgoBotConfig,
    storage: Arc<AlgoBotStorage>,
    platform: Arc<dyn Platform>,
) -> anyhow::Result<Vec<Arc<dyn Job>>> {
    let schedule = &config.schedule;
    let mut jobs: Vec<Arc<dyn Job>> = Vec::new();

    if schedule.standup_reminder {
        jobs.push(Arc::new(RoleReminderJob::standup(
            WeeklyTrigger::workdays(9, 45)?,
            &config.roles.mentee,
            config.channels.current_mentees,
            platform.clone(),
        )));
    }
    if schedule.algo_reminder {
        jobs.push(Arc::new(AlgoReminderJob::new(
            WeeklyTrigger::workdays(13, 0)?,
            storage.clone(),
            platform.clone(),
        )));
    }
    if schedule.timecard_reminder {
        jobs.push(Arc::new(RoleReminderJob::timecard(
            WeeklyTrigger::new(&[Weekday::Mon], 9, 30)?,
            &config.roles.timecard,
            config.channels.current_mentees,
            platform.clone(),
        )));
    }
    if schedule.weekly_report {
        jobs.push(Arc::new(WeeklyReportJob::new(
            WeeklyTrigger::new(&[Weekday::Mon], 0, 0)?,
            &config.roles.mentee,
            config.channels.weekly_report,
            storage,
            platform,
        )));
    }

    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use algobot_gateway::testing::MockPlatform;

    use super::*;

    #[test]
    fn test_all_jobs_enabled_by_default() {
        let config = AlgoBotConfig::default();
        let storage = Arc::new(AlgoBotStorage::open_in_memory().unwrap());
        let jobs = configured_jobs(&config, storage, Arc::new(MockPlatform::new())).unwrap();
        let names: Vec<&str> = jobs.iter().map(|j| j.name()).collect();
        assert_eq!(
            names,
            vec![
                "standup-reminder",
                "algo-reminder",
                "timecard-reminder",
                "weekly-report"
            ]
        );
        assert_eq!(jobs[0].trigger().to_string(), "09:45 Mon-Fri");
        assert_eq!(jobs[1].trigger().to_string(), "13:00 Mon-Fri");
        assert_eq!(jobs[2].trigger().to_string(), "09:30 Mon");
        assert_eq!(jobs[3].trigger().to_string(), "00:00 Mon");
    }

    #[test]
    fn test_disabled_jobs_are_skipped() {
        let mut config = AlgoBotConfig::default();
        config.schedule.timecard_reminder = false;
        config.schedule.weekly_report = false;
        let storage = Arc::new(AlgoBotStorage::open_in_memory().unwrap());
        let jobs = configured_jobs(&config, storage, Arc::new(MockPlatform::new())).unwrap();
        assert_eq!(jobs.len(), 2);
    }
}
