//! Reminders that mention a role in a channel (standup, timecard).

use std::sync::Arc;

use chrono::NaiveDate;

use algobot_gateway::{BotError, Platform};
use algobot_types::OutboundMessage;

use crate::{Job, JobOutcome, WeeklyTrigger};

pub const STANDUP_MESSAGE: &str = "Standup in 15 minutes.";
pub const TIMECARD_MESSAGE: &str = "Remember to submit your hours for last week!";

pub struct RoleReminderJob {
    name: String,
    trigger: WeeklyTrigger,
    role_name: String,
    channel_id: u64,
    message: String,
    platform: Arc<dyn Platform>,
}

impl RoleReminderJob {
    pub fn new(
        name: &str,
        trigger: WeeklyTrigger,
        role_name: &str,
        channel_id: u64,
        message: &str,
        platform: Arc<dyn Platform>,
    ) -> Self {
        Self {
            name: name.to_string(),
            trigger,
            role_name: role_name.to_string(),
            channel_id,
            message: message.to_string(),
            platform,
        }
    }

    pub fn standup(
        trigger: WeeklyTrigger,
        role_name: &str,
        channel_id: u64,
        platform: Arc<dyn Platform>,
    ) -> Self {
        Self::new(
            "standup-reminder",
            trigger,
            role_name,
            channel_id,
            STANDUP_MESSAGE,
            platform,
        )
    }

    pub fn timecard(
        trigger: WeeklyTrigger,
        role_name: &str,
        channel_id: u64,
        platform: Arc<dyn Platform>,
    ) -> Self {
        Self::new(
            "timecard-reminder",
            trigger,
            role_name,
            channel_id,
            TIMECARD_MESSAGE,
            platform,
        )
    }
}

#[async_trait::async_trait]
impl Job for RoleReminderJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn trigger(&self) -> &WeeklyTrigger {
        &self.trigger
    }

    async fn run(&self, _today: NaiveDate) -> Result<JobOutcome, BotError> {
        let role = self
            .platform
            .resolve_role_by_name(&self.role_name)
            .await?
            .ok_or_else(|| BotError::RoleNotFound(self.role_name.clone()))?;

        let text = format!("{} {}", role.mention(), self.message);
        self.platform
            .send(OutboundMessage::channel(self.channel_id, text))
            .await?;

        Ok(JobOutcome { sent: 1, failed: 0 })
    }
}

#[cfg(test)]
mod tests {
    use algobot_gateway::testing::MockPlatform;

    use super::*;

    const CHANNEL: u64 = 300;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()
    }

    fn standup(platform: Arc<MockPlatform>) -> RoleReminderJob {
        RoleReminderJob::standup(
            WeeklyTrigger::workdays(9, 45).unwrap(),
            "mentee",
            CHANNEL,
            platform,
        )
    }

    #[tokio::test]
    async fn test_standup_mentions_role() {
        let platform = Arc::new(MockPlatform::new());
        platform.add_role(11, "Mentee");
        let outcome = standup(platform.clone()).run(today()).await.unwrap();
        assert_eq!(outcome.sent, 1);
        assert_eq!(
            platform.channel_messages(CHANNEL),
            vec!["<@&11> Standup in 15 minutes.".to_string()]
        );
    }

    #[tokio::test]
    async fn test_first_matching_role_wins() {
        let platform = Arc::new(MockPlatform::new());
        platform.add_role(11, "mentee");
        platform.add_role(12, "MENTEE");
        standup(platform.clone()).run(today()).await.unwrap();
        assert!(platform.channel_messages(CHANNEL)[0].starts_with("<@&11>"));
    }

    #[tokio::test]
    async fn test_missing_role_aborts() {
        let platform = Arc::new(MockPlatform::new());
        platform.add_role(12, "mentees");
        let err = standup(platform.clone()).run(today()).await.unwrap_err();
        assert!(matches!(err, BotError::RoleNotFound(ref n) if n == "mentee"));
        assert!(platform.sent().is_empty());
    }

    #[tokio::test]
    async fn test_missing_channel_aborts() {
        let platform = Arc::new(MockPlatform::new());
        platform.add_role(11, "mentee");
        platform.remove_channel(CHANNEL);
        let err = standup(platform.clone()).run(today()).await.unwrap_err();
        assert!(matches!(err, BotError::ChannelNotFound(CHANNEL)));
    }

    #[tokio::test]
    async fn test_timecard_targets_its_role() {
        let platform = Arc::new(MockPlatform::new());
        platform.add_role(11, "mentee");
        platform.add_role(12, "mentees");
        let job = RoleReminderJob::timecard(
            WeeklyTrigger::new(&[chrono::Weekday::Mon], 9, 30).unwrap(),
            "mentees",
            CHANNEL,
            platform.clone(),
        );
        assert_eq!(job.name(), "timecard-reminder");
        job.run(today()).await.unwrap();
        assert_eq!(
            platform.channel_messages(CHANNEL),
            vec!["<@&12> Remember to submit your hours for last week!".to_string()]
        );
    }
}
