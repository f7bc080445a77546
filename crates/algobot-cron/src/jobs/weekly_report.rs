//! Weekly per-mentee submission report.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use tracing::debug;

use algobot_gateway::{BotError, Platform};
use algobot_storage::AlgoBotStorage;
use algobot_types::{Member, OutboundMessage, Submission};

use crate::{Job, JobOutcome, WeeklyTrigger};

const RULE: &str = "============================\n\n";
const SEPARATOR: &str = "- - - - - - - - - - - - - - - - - - -\n\n";

pub struct WeeklyReportJob {
    trigger: WeeklyTrigger,
    role_name: String,
    channel_id: u64,
    storage: Arc<AlgoBotStorage>,
    platform: Arc<dyn Platform>,
}

impl WeeklyReportJob {
    pub fn new(
        trigger: WeeklyTrigger,
        role_name: &str,
        channel_id: u64,
        storage: Arc<AlgoBotStorage>,
        platform: Arc<dyn Platform>,
    ) -> Self {
        Self {
            trigger,
            role_name: role_name.to_string(),
            channel_id,
            storage,
            platform,
        }
    }

    /// Collect each mentee's submissions dated in `[today - 7 days, today)`.
    pub async fn collect(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<(Member, Vec<Submission>)>, BotError> {
        let start = today
            .checked_sub_days(Days::new(7))
            .unwrap_or(NaiveDate::MIN);
        let mentees = self.storage.find_members_by_role(&self.role_name).await?;

        let mut sections = Vec::with_capacity(mentees.len());
        for mentee in mentees {
            let submissions = self
                .storage
                .find_submissions_by_member_and_date_range(mentee.id, start, today)
                .await?;
            debug!(member_id = mentee.id, count = submissions.len(), "Collected weekly submissions");
            sections.push((mentee, submissions));
        }
        Ok(sections)
    }
}

/// Render the report. Every member gets a section, including those with no submissions.
pub fn build_report(sections: &[(Member, Vec<Submission>)]) -> String {
    let mut report = String::new();
    report.push_str(RULE);
    report.push_str("***WEEKLY MENTEE ALGO REPORT***\n\n");
    report.push_str(RULE);

    for (member, submissions) in sections {
        report.push_str(SEPARATOR);
        let noun = if submissions.len() == 1 { "algo" } else { "algos" };
        let _ = write!(
            report,
            "**{}** completed **{}** {noun} this week.\n\n",
            member.name,
            submissions.len()
        );
        for s in submissions {
            let _ = write!(
                report,
                "**Date:** {}\n**Title:** {}\n**Link:** <{}>\n\n",
                s.date_submitted, s.title, s.link
            );
        }
    }
    if !sections.is_empty() {
        report.push_str(SEPARATOR);
    }
    report
}

#[async_trait::async_trait]
impl Job for WeeklyReportJob {
    fn name(&self) -> &str {
        "weekly-report"
    }

    fn trigger(&self) -> &WeeklyTrigger {
        &self.trigger
    }

    async fn run(&self, today: NaiveDate) -> Result<JobOutcome, BotError> {
        let sections = self.collect(today).await?;
        let report = build_report(&sections);
        self.platform
            .send(OutboundMessage::channel(self.channel_id, report))
            .await?;
        Ok(JobOutcome { sent: 1, failed: 0 })
    }
}
