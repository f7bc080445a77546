//! Discord platform for algobot.
//!
//! Uses serenity to connect to the Discord Gateway. Inbound interactions and
//! member role changes are forwarded as [`InboundEvent`]s; outbound messages,
//! role lookups and member lookups go through the [`Platform`] impl.
//!
//! # Configuration
//!
//! ```json5
//! discord: {
//!   bot_token: "MTIzNDU2Nzg5...",
//!   guild_id: 123456789012345678,
//!   bot_role_id: 223456789012345678,
//!   status: "Grinding algos",
//! }
//! ```

pub mod commands;
pub mod handler;

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::{bail, Context};
use serenity::all::{
    ChannelId, CreateInteractionResponse, CreateInteractionResponseFollowup,
    CreateInteractionResponseMessage, CreateMessage, EditInteractionResponse, GatewayIntents,
    GuildId, Http, Member, RoleId, UserId,
};
use serenity::http::HttpError;
use serenity::Client;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::info;

use algobot_config::DiscordConfig;
use algobot_gateway::{CommandSpec, GatewayError, Platform};
use algobot_types::{InboundEvent, MemberProfile, OutboundMessage, RoleRef};

use crate::handler::{display_name, DiscordHandler, PendingInteractions};

/// Maximum characters per Discord message (API limit is 2000).
const MAX_MESSAGE_LEN: usize = 2000;

/// Page size for guild member listing (API maximum).
const MEMBER_PAGE: u64 = 1000;

/// Closes a fenced code block cut at a chunk boundary.
const FENCE_CLOSE: &str = "\n```";

/// Split a long message into chunks that fit within Discord's limit.
///
/// Cuts at a paragraph break, then a line break, then a space, then anywhere.
/// A fenced code block cut across chunks is closed at the end of one chunk and
/// reopened with its info string at the start of the next. The fence lines
/// count against `max_len`.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    // A fence is carried across chunks only if it leaves room for content.
    let carried = |fence: &str| fence.len() + 1 + FENCE_CLOSE.len() <= max_len / 2;

    let mut chunks = Vec::new();
    let mut open_fence: Option<String> = None;
    let mut rest = text;

    while !rest.is_empty() {
        let reopen = open_fence.as_deref().filter(|f| carried(f));
        let prefix_len = reopen.map_or(0, |f| f.len() + 1);

        let piece = if prefix_len + rest.len() <= max_len {
            rest
        } else {
            let window = &rest[..floor_char_boundary(rest, max_len - prefix_len)];
            let reserve = if reopen.is_some() || window.contains("```") {
                FENCE_CLOSE.len()
            } else {
                0
            };
            let area = &rest[..floor_char_boundary(rest, max_len - prefix_len - reserve)];
            let mut cut = find_split_point(area);
            if cut == 0 {
                cut = rest.chars().next().map_or(rest.len(), char::len_utf8);
            }
            &rest[..cut]
        };

        let mut chunk = String::with_capacity(max_len);
        if let Some(fence) = reopen {
            chunk.push_str(fence);
            chunk.push('\n');
        }
        chunk.push_str(piece);

        for line in piece.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with("```") {
                open_fence = match open_fence {
                    Some(_) => None,
                    None => Some(trimmed.to_string()),
                };
            }
        }

        rest = rest[piece.len()..].trim_start_matches('\n');
        if !rest.is_empty() && open_fence.as_deref().is_some_and(|f| carried(f)) {
            chunk.push_str(FENCE_CLOSE);
        }
        chunks.push(chunk);
    }

    chunks
}

/// Largest index `<= max` that falls on a char boundary of `text`.
fn floor_char_boundary(text: &str, max: usize) -> usize {
    let mut end = max.min(text.len());
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    end
}

/// Find the best position to split text, searching backwards from the end.
fn find_split_point(text: &str) -> usize {
    // Priority 1: paragraph break (\n\n)
    if let Some(pos) = text.rfind("\n\n") {
        if pos > 0 {
            return pos + 1;
        }
    }

    // Priority 2: line break (\n)
    if let Some(pos) = text.rfind('\n') {
        if pos > 0 {
            return pos + 1;
        }
    }

    // Priority 3: space
    if let Some(pos) = text.rfind(' ') {
        if pos > 0 {
            return pos + 1;
        }
    }

    // Priority 4: hard cut at max_len
    text.len()
}

fn is_not_found(err: &serenity::Error) -> bool {
    matches!(
        err,
        serenity::Error::Http(HttpError::UnsuccessfulRequest(resp)) if resp.status_code.as_u16() == 404
    )
}

fn transport(err: serenity::Error) -> GatewayError {
    GatewayError::Transport(err.into())
}

/// Fetch role id -> name for every role in the guild.
pub(crate) async fn fetch_role_names(
    http: &Http,
    guild_id: GuildId,
) -> serenity::Result<HashMap<u64, String>> {
    let roles = http.get_guild_roles(guild_id).await?;
    Ok(roles.into_iter().map(|r| (r.id.get(), r.name)).collect())
}

/// Map role ids to names, skipping ids the guild does not know.
pub(crate) fn label_roles(names: &HashMap<u64, String>, ids: &[u64]) -> BTreeSet<String> {
    ids.iter().filter_map(|id| names.get(id).cloned()).collect()
}

/// First role whose name matches `wanted`, ignoring case.
fn pick_role<'a>(roles: impl IntoIterator<Item = (u64, &'a str)>, wanted: &str) -> Option<RoleRef> {
    roles
        .into_iter()
        .find(|(_, name)| name.eq_ignore_ascii_case(wanted))
        .map(|(id, name)| RoleRef {
            id,
            name: name.to_string(),
        })
}

fn profile_from_member(member: &Member, names: &HashMap<u64, String>) -> MemberProfile {
    let ids: Vec<u64> = member.roles.iter().map(|r| r.get()).collect();
    MemberProfile {
        id: member.user.id.get(),
        display_name: display_name(
            member.nick.as_deref(),
            member.user.global_name.as_deref(),
            &member.user.name,
        ),
        roles: label_roles(names, &ids),
    }
}

/// Discord connection implementing [`Platform`].
pub struct DiscordPlatform {
    bot_token: String,
    guild_id: GuildId,
    bot_role_id: Option<RoleId>,
    status: Option<String>,
    pending: PendingInteractions,
    ready: Arc<Notify>,
    state: Mutex<DiscordState>,
}

struct DiscordState {
    http: Option<Arc<Http>>,
    client_handle: Option<JoinHandle<()>>,
    /// Serenity shard manager for graceful shutdown.
    shard_manager: Option<Arc<serenity::gateway::ShardManager>>,
}

impl DiscordPlatform {
    /// Create a platform from the `discord` config section.
    ///
    /// Expects a non-empty bot token and a non-zero guild id.
    pub fn from_config(config: &DiscordConfig) -> anyhow::Result<Self> {
        if config.bot_token.trim().is_empty() {
            bail!("Discord platform requires discord.bot_token");
        }
        let guild_id = std::num::NonZeroU64::new(config.guild_id)
            .map(GuildId::from)
            .context("Discord platform requires discord.guild_id")?;
        let bot_role_id = config
            .bot_role_id
            .and_then(std::num::NonZeroU64::new)
            .map(RoleId::from);

        Ok(Self {
            bot_token: config.bot_token.clone(),
            guild_id,
            bot_role_id,
            status: config.status.clone(),
            pending: Arc::new(StdMutex::new(HashMap::new())),
            ready: Arc::new(Notify::new()),
            state: Mutex::new(DiscordState {
                http: None,
                client_handle: None,
                shard_manager: None,
            }),
        })
    }

    /// Connect to the gateway, publishing `commands` once ready and
    /// forwarding inbound events to `sender`.
    pub async fn start(
        &self,
        commands: Vec<CommandSpec>,
        sender: mpsc::Sender<InboundEvent>,
    ) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        if state.client_handle.is_some() {
            bail!("Discord platform is already running");
        }

        let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_MEMBERS;

        let event_handler = DiscordHandler {
            guild_id: self.guild_id,
            bot_role_id: self.bot_role_id,
            status: self.status.clone(),
            commands,
            sender,
            pending: self.pending.clone(),
            ready: self.ready.clone(),
        };

        let mut client = Client::builder(&self.bot_token, intents)
            .event_handler(event_handler)
            .await
            .context("Failed to create Discord client")?;

        let http = client.http.clone();
        let shard_manager = client.shard_manager.clone();

        let handle = tokio::spawn(async move {
            if let Err(e) = client.start().await {
                tracing::error!("Discord client error: {e}");
            }
        });

        state.http = Some(http);
        state.shard_manager = Some(shard_manager);
        state.client_handle = Some(handle);

        info!(guild_id = %self.guild_id, "Discord platform started");

        Ok(())
    }

    /// Enable outbound calls over the HTTP API without a gateway connection.
    ///
    /// No inbound events are received in this mode.
    pub async fn connect_http(&self) {
        let mut state = self.state.lock().await;
        if state.http.is_none() {
            state.http = Some(Arc::new(Http::new(&self.bot_token)));
            info!(guild_id = %self.guild_id, "Discord HTTP client ready");
        }
    }

    /// Wait for the gateway's ready event.
    pub async fn wait_ready(&self) {
        self.ready.notified().await;
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;

        if let Some(shard_manager) = state.shard_manager.take() {
            shard_manager.shutdown_all().await;
        }

        if let Some(handle) = state.client_handle.take() {
            let _ = handle.await;
        }

        state.http = None;

        info!(guild_id = %self.guild_id, "Discord platform stopped");

        Ok(())
    }

    async fn http(&self) -> Result<Arc<Http>, GatewayError> {
        let state = self.state.lock().await;
        Ok(state
            .http
            .clone()
            .context("Discord platform not started")?)
    }
}

#[async_trait::async_trait]
impl Platform for DiscordPlatform {
    async fn send(&self, message: OutboundMessage) -> Result<(), GatewayError> {
        let http = self.http().await?;

        match message {
            OutboundMessage::Channel { channel_id, text } => {
                let channel = std::num::NonZeroU64::new(channel_id)
                    .map(ChannelId::from)
                    .ok_or(GatewayError::ChannelNotFound(channel_id))?;
                for chunk in split_message(&text, MAX_MESSAGE_LEN) {
                    channel
                        .send_message(&http, CreateMessage::new().content(chunk))
                        .await
                        .map_err(|e| {
                            if is_not_found(&e) {
                                GatewayError::ChannelNotFound(channel_id)
                            } else {
                                transport(e)
                            }
                        })?;
                }
            }
            OutboundMessage::Direct { member_id, text } => {
                let user = std::num::NonZeroU64::new(member_id)
                    .map(UserId::from)
                    .ok_or(GatewayError::MemberNotFound(member_id))?;
                let dm = user.create_dm_channel(&http).await.map_err(|e| {
                    if is_not_found(&e) {
                        GatewayError::MemberNotFound(member_id)
                    } else {
                        transport(e)
                    }
                })?;
                for chunk in split_message(&text, MAX_MESSAGE_LEN) {
                    dm.send_message(&http, CreateMessage::new().content(chunk))
                        .await
                        .map_err(transport)?;
                }
            }
            OutboundMessage::InteractionReply {
                interaction_id,
                text,
                ephemeral,
            } => {
                let pending = self
                    .pending
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&interaction_id)
                    .with_context(|| format!("interaction {interaction_id} is not awaiting a reply"))?;
                // A deferred acknowledgement already fixed the reply's visibility.
                let ephemeral = ephemeral || pending.deferred;
                let command = pending.command;

                let mut chunks = split_message(&text, MAX_MESSAGE_LEN).into_iter();
                let first = chunks.next().unwrap_or_default();
                if pending.deferred {
                    command
                        .edit_response(&http, EditInteractionResponse::new().content(first))
                        .await
                        .map_err(transport)?;
                } else {
                    command
                        .create_response(
                            &http,
                            CreateInteractionResponse::Message(
                                CreateInteractionResponseMessage::new()
                                    .content(first)
                                    .ephemeral(ephemeral),
                            ),
                        )
                        .await
                        .map_err(transport)?;
                }
                for chunk in chunks {
                    command
                        .create_followup(
                            &http,
                            CreateInteractionResponseFollowup::new()
                                .content(chunk)
                                .ephemeral(ephemeral),
                        )
                        .await
                        .map_err(transport)?;
                }
            }
        }

        Ok(())
    }

    async fn resolve_role_by_name(&self, name: &str) -> Result<Option<RoleRef>, GatewayError> {
        let http = self.http().await?;
        let roles = http
            .get_guild_roles(self.guild_id)
            .await
            .map_err(transport)?;
        Ok(pick_role(
            roles.iter().map(|r| (r.id.get(), r.name.as_str())),
            name,
        ))
    }

    async fn resolve_member(&self, member_id: u64) -> Result<Option<MemberProfile>, GatewayError> {
        let Some(user) = std::num::NonZeroU64::new(member_id).map(UserId::from) else {
            return Ok(None);
        };
        let http = self.http().await?;
        let member = match http.get_member(self.guild_id, user).await {
            Ok(member) => member,
            Err(e) if is_not_found(&e) => return Ok(None),
            Err(e) => return Err(transport(e)),
        };
        let names = fetch_role_names(&http, self.guild_id)
            .await
            .map_err(transport)?;
        Ok(Some(profile_from_member(&member, &names)))
    }

    async fn list_members(&self) -> Result<Vec<MemberProfile>, GatewayError> {
        let http = self.http().await?;
        let names = fetch_role_names(&http, self.guild_id)
            .await
            .map_err(transport)?;

        let mut profiles = Vec::new();
        let mut after = None;
        loop {
            let page = http
                .get_guild_members(self.guild_id, Some(MEMBER_PAGE), after)
                .await
                .map_err(transport)?;
            after = page.last().map(|m| m.user.id.get());
            profiles.extend(
                page.iter()
                    .filter(|m| !m.user.bot)
                    .map(|m| profile_from_member(m, &names)),
            );
            if (page.len() as u64) < MEMBER_PAGE {
                break;
            }
        }
        Ok(profiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DiscordConfig {
        DiscordConfig {
            bot_token: "test-token-123".into(),
            guild_id: 42,
            bot_role_id: Some(7),
            status: Some("Grinding algos".into()),
        }
    }

    #[test]
    fn test_split_message_short() {
        let chunks = split_message("hello", 100);
        assert_eq!(chunks, vec!["hello"]);
    }

    #[test]
    fn test_split_message_paragraph_boundary() {
        let text = format!("{}\n\n{}", "a".repeat(50), "b".repeat(60));
        let chunks = split_message(&text, 80);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with("aaa"));
        assert!(chunks[1].starts_with("bbb"));
    }

    #[test]
    fn test_split_message_hard_cut() {
        let text = "a".repeat(200);
        let chunks = split_message(&text, 80);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 80);
        assert_eq!(chunks[2].len(), 40);
    }

    #[test]
    fn test_split_message_multibyte_hard_cut() {
        let text = "é".repeat(100);
        let chunks = split_message(&text, 51);
        assert!(chunks.iter().all(|c| c.len() <= 51));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_split_review_notice_keeps_fences_balanced() {
        let code = "let x = 1;\n".repeat(300);
        let text = format!("**Mentee: Ada**\n*Algo Title:* Two Sum\n```rust\n{code}```\n");
        let chunks = split_message(&text, MAX_MESSAGE_LEN);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.len() <= MAX_MESSAGE_LEN);
            assert_eq!(
                chunk.matches("```").count() % 2,
                0,
                "Unmatched code fences in chunk: {chunk}"
            );
            // Reopened fences keep the language tag.
            assert!(chunk.contains("```rust"));
        }
    }

    #[test]
    fn test_split_counts_long_fence_lines_against_limit() {
        let fence = format!("```{}", "k".repeat(300));
        let code = "let x = 1;\n".repeat(400);
        let text = format!("{fence}\n{code}```\n");
        let chunks = split_message(&text, MAX_MESSAGE_LEN);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.len() <= MAX_MESSAGE_LEN, "chunk of {} bytes", chunk.len());
            assert!(chunk.starts_with(&fence));
            assert_eq!(chunk.matches("```").count() % 2, 0);
        }
    }

    #[test]
    fn test_split_oversized_fence_is_not_carried() {
        let fence = format!("```{}", "k".repeat(1500));
        let text = format!("{fence}\n{}```", "y ".repeat(2000));
        let chunks = split_message(&text, MAX_MESSAGE_LEN);
        assert!(chunks.iter().all(|c| c.len() <= MAX_MESSAGE_LEN));
        assert!(!chunks[1].starts_with("```"));
    }

    #[test]
    fn test_split_message_discord_limit() {
        let text = "x ".repeat(3000);
        for chunk in split_message(&text, MAX_MESSAGE_LEN) {
            assert!(chunk.len() <= MAX_MESSAGE_LEN);
        }
    }

    #[test]
    fn test_pick_role_case_insensitive_first_match() {
        let roles = [(1, "Mentor"), (2, "MENTEE"), (3, "mentee")];
        let role = pick_role(roles, "mentee").unwrap();
        assert_eq!(role.id, 2);
        assert_eq!(role.name, "MENTEE");
        assert!(pick_role(roles, "mentees").is_none());
    }

    #[test]
    fn test_label_roles_skips_unknown_ids() {
        let names = HashMap::from([(1, "mentee".to_string()), (2, "mentor".to_string())]);
        let labels = label_roles(&names, &[2, 9, 1]);
        assert_eq!(
            labels.into_iter().collect::<Vec<_>>(),
            vec!["mentee".to_string(), "mentor".to_string()]
        );
    }

    #[test]
    fn test_from_config() {
        let platform = DiscordPlatform::from_config(&config()).unwrap();
        assert_eq!(platform.guild_id.get(), 42);
        assert_eq!(platform.bot_role_id.map(|r| r.get()), Some(7));
        assert_eq!(platform.status.as_deref(), Some("Grinding algos"));
    }

    #[test]
    fn test_from_config_missing_token() {
        let mut config = config();
        config.bot_token.clear();
        let err = DiscordPlatform::from_config(&config).err().unwrap();
        assert!(err.to_string().contains("bot_token"));
    }

    #[test]
    fn test_from_config_missing_guild() {
        let mut config = config();
        config.guild_id = 0;
        let err = DiscordPlatform::from_config(&config).err().unwrap();
        assert!(err.to_string().contains("guild_id"));
    }

    #[tokio::test]
    async fn test_send_before_start_is_transport_error() {
        let platform = DiscordPlatform::from_config(&config()).unwrap();
        let err = platform
            .send(OutboundMessage::channel(1, "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
    }

    #[tokio::test]
    async fn test_reply_without_pending_interaction_fails() {
        let platform = DiscordPlatform::from_config(&config()).unwrap();
        platform.connect_http().await;
        let err = platform
            .send(OutboundMessage::InteractionReply {
                interaction_id: 99,
                text: "hi".into(),
                ephemeral: true,
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not awaiting a reply"));
    }
}
