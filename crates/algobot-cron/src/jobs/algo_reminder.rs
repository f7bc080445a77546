//! Direct-message every tracked member who has not submitted today.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::future::join_all;
use tracing::{info, warn};

use algobot_gateway::{BotError, Platform};
use algobot_storage::AlgoBotStorage;
use algobot_types::{Member, OutboundMessage};

use crate::{Job, JobOutcome, WeeklyTrigger};

pub const ALGO_REMINDER_MESSAGE: &str = "Make sure to complete your daily algo!";

pub struct AlgoReminderJob {
    trigger: WeeklyTrigger,
    storage: Arc<AlgoBotStorage>,
    platform: Arc<dyn Platform>,
}

impl AlgoReminderJob {
    pub fn new(
        trigger: WeeklyTrigger,
        storage: Arc<AlgoBotStorage>,
        platform: Arc<dyn Platform>,
    ) -> Self {
        Self {
            trigger,
            storage,
            platform,
        }
    }

    /// Members with no submission dated `today`.
    pub async fn unsubmitted(&self, today: NaiveDate) -> Result<Vec<Member>, BotError> {
        let members = self.storage.list_members().await?;
        let submitted: HashSet<u64> = self
            .storage
            .find_submissions_by_date(today)
            .await?
            .into_iter()
            .map(|s| s.member_id)
            .collect();
        Ok(members
            .into_iter()
            .filter(|m| !submitted.contains(&m.id))
            .collect())
    }
}

#[async_trait::async_trait]
impl Job for AlgoReminderJob {
    fn name(&self) -> &str {
        "algo-reminder"
    }

    fn trigger(&self) -> &WeeklyTrigger {
        &self.trigger
    }

    async fn run(&self, today: NaiveDate) -> Result<JobOutcome, BotError> {
        let pending = self.unsubmitted(today).await?;
        if pending.is_empty() {
            info!(%today, "Every member has submitted, no reminders sent");
            return Ok(JobOutcome::default());
        }

        // Sends are independent; one failure must not hold up the rest.
        let results = join_all(pending.iter().map(|member| async move {
            let result = self
                .platform
                .send(OutboundMessage::direct(member.id, ALGO_REMINDER_MESSAGE))
                .await;
            (member, result)
        }))
        .await;

        let mut outcome = JobOutcome::default();
        for (member, result) in results {
            match result {
                Ok(()) => outcome.sent += 1,
                Err(e) => {
                    outcome.failed += 1;
                    warn!(
                        member_id = member.id,
                        member_name = %member.name,
                        "Failed to send algo reminder: {e}"
                    );
                }
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use algobot_gateway::testing::MockPlatform;
    use algobot_types::NewSubmission;

    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()
    }

    async fn setup(members: &[(u64, &str)]) -> (Arc<AlgoBotStorage>, Arc<MockPlatform>, AlgoReminderJob) {
        let storage = Arc::new(AlgoBotStorage::open_in_memory().unwrap());
        for (id, name) in members {
            storage.save_member(&Member::new(*id, *name)).await.unwrap();
        }
        let platform = Arc::new(MockPlatform::new());
        let job = AlgoReminderJob::new(
            WeeklyTrigger::workdays(13, 0).unwrap(),
            storage.clone(),
            platform.clone(),
        );
        (storage, platform, job)
    }

    async fn submit(storage: &AlgoBotStorage, member_id: u64, on: NaiveDate) {
        storage
            .save_submission(&NewSubmission {
                member_id,
                title: "Two Sum".into(),
                link: "http://x".into(),
                code: "...".into(),
                date_submitted: on,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reminds_only_unsubmitted() {
        let (storage, platform, job) = setup(&[(1, "A"), (2, "B")]).await;
        submit(&storage, 1, today()).await;

        let outcome = job.run(today()).await.unwrap();
        assert_eq!(outcome, JobOutcome { sent: 1, failed: 0 });
        assert_eq!(
            platform.direct_messages(),
            vec![(2, ALGO_REMINDER_MESSAGE.to_string())]
        );
    }

    #[tokio::test]
    async fn test_yesterdays_submission_does_not_count() {
        let (storage, platform, job) = setup(&[(1, "A")]).await;
        submit(&storage, 1, today().pred_opt().unwrap()).await;

        job.run(today()).await.unwrap();
        assert_eq!(platform.direct_messages().len(), 1);
    }

    #[tokio::test]
    async fn test_everyone_submitted_sends_nothing() {
        let (storage, platform, job) = setup(&[(1, "A"), (2, "B")]).await;
        submit(&storage, 1, today()).await;
        submit(&storage, 2, today()).await;

        assert!(job.unsubmitted(today()).await.unwrap().is_empty());
        let outcome = job.run(today()).await.unwrap();
        assert_eq!(outcome, JobOutcome::default());
        assert!(platform.sent().is_empty());
    }

    #[tokio::test]
    async fn test_one_failed_dm_does_not_block_others() {
        let (_storage, platform, job) = setup(&[(1, "A"), (2, "B"), (3, "C")]).await;
        platform.fail_direct_messages_to(2);

        let outcome = job.run(today()).await.unwrap();
        assert_eq!(outcome, JobOutcome { sent: 2, failed: 1 });
        let recipients: Vec<u64> = platform.direct_messages().into_iter().map(|(id, _)| id).collect();
        assert!(recipients.contains(&1));
        assert!(recipients.contains(&3));
    }

    #[tokio::test]
    async fn test_unsubmitted_is_set_difference() {
        let (storage, _platform, job) = setup(&[(1, "A"), (2, "B"), (3, "C"), (4, "D")]).await;
        submit(&storage, 2, today()).await;
        submit(&storage, 2, today()).await;
        submit(&storage, 4, today()).await;

        let ids: Vec<u64> = job
            .unsubmitted(today())
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![1, 3]);
    }
}
