//! `/post-algo`: record a daily algorithm submission and show it to mentors.

use std::sync::Arc;

use tracing::{info, warn};

use algobot_storage::AlgoBotStorage;
use algobot_types::{NewSubmission, OutboundMessage, Submission};

use crate::error::BotError;
use crate::platform::Platform;

use super::{
    Command, CommandOptions, CommandReply, CommandSpec, InvocationContext, ParamSpec, ParamType,
};

pub const SUBMITTED_REPLY: &str = "Your algo has been submitted successfully";
pub const UNTRACKED_REPLY: &str =
    "You are not registered as a member yet, so your algo was not recorded. Ask a mentor to assign you a role.";
pub const REVIEW_FAILED_REPLY: &str =
    "Your algo has been submitted, but it could not be posted for review.";

/// Longest accepted `language` value. It becomes the code fence info string.
pub const MAX_LANGUAGE_LEN: usize = 20;

pub struct PostAlgoCommand {
    spec: CommandSpec,
    storage: Arc<AlgoBotStorage>,
    platform: Arc<dyn Platform>,
    review_channel_id: u64,
}

impl PostAlgoCommand {
    pub fn new(
        storage: Arc<AlgoBotStorage>,
        platform: Arc<dyn Platform>,
        review_channel_id: u64,
    ) -> Self {
        Self {
            spec: CommandSpec {
                name: "post-algo".to_string(),
                description: "Saves daily algorithm submission".to_string(),
                params: vec![
                    ParamSpec::required("title", "The title of the problem", ParamType::String),
                    ParamSpec::required("link", "The url of the problem", ParamType::String),
                    ParamSpec::required("code", "Your solution to the problem", ParamType::String),
                    ParamSpec::optional(
                        "language",
                        "Language of the solution, for syntax highlighting",
                        ParamType::String,
                    ),
                ],
                // Saving and posting for review can outlast the reply deadline.
                deferred: true,
            },
            storage,
            platform,
            review_channel_id,
        }
    }
}

#[async_trait::async_trait]
impl Command for PostAlgoCommand {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    async fn execute(
        &self,
        options: CommandOptions,
        ctx: &InvocationContext,
    ) -> Result<CommandReply, BotError> {
        let title = options.require_str("title")?;
        let link = options.require_str("link")?;
        let code = options.require_str("code")?;
        let language = options.get_str("language").map(str::trim).unwrap_or("");
        if !is_fence_language(language) {
            return Err(BotError::invalid_option(
                "language",
                format!("must be a language name of at most {MAX_LANGUAGE_LEN} characters"),
            ));
        }

        // Only known members may submit.
        let Some(member) = self.storage.find_member(ctx.member_id).await? else {
            warn!(
                member_id = ctx.member_id,
                member_name = %ctx.member_name,
                "Member not found in store, submission not recorded"
            );
            return Ok(CommandReply::ephemeral(UNTRACKED_REPLY));
        };

        let submission = self
            .storage
            .save_submission(&NewSubmission {
                member_id: member.id,
                title: title.to_string(),
                link: link.to_string(),
                code: code.to_string(),
                date_submitted: ctx.today,
            })
            .await?;

        info!(
            member_id = member.id,
            submission_id = submission.id,
            title = %submission.title,
            "Algo submission recorded"
        );

        let notice = format_review_notice(&member.name, &submission, language);
        if let Err(e) = self
            .platform
            .send(OutboundMessage::channel(self.review_channel_id, notice))
            .await
        {
            warn!(
                channel_id = self.review_channel_id,
                submission_id = submission.id,
                "Failed to post submission for review: {e}"
            );
            return Ok(CommandReply::ephemeral(REVIEW_FAILED_REPLY));
        }

        Ok(CommandReply::ephemeral(SUBMITTED_REPLY))
    }
}

/// Short and free of characters that would end the fence line early.
fn is_fence_language(language: &str) -> bool {
    language.len() <= MAX_LANGUAGE_LEN
        && language
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "+#-._".contains(c))
}

/// Message shown to mentors in the review channel.
pub fn format_review_notice(member_name: &str, submission: &Submission, language: &str) -> String {
    format!(
        "**Mentee: {member_name}**\n*Algo Title:* {}\n*Algo Link:* <{}>\n```{language}\n{}\n```\n",
        submission.title,
        submission.link,
        submission.code.trim_end(),
    )
}
