//! Serenity EventHandler that converts Discord events to InboundEvent.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serenity::all::{
    ActivityData, CommandDataOptionValue, CommandInteraction, GuildId, GuildMemberUpdateEvent,
    Interaction, Member, Ready, RoleId,
};
use serenity::async_trait;
use serenity::prelude::*;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};

use algobot_gateway::CommandSpec;
use algobot_types::{InboundEvent, InteractionEvent, MemberProfile, RoleAddEvent, RoleRemoveEvent};

use crate::commands::to_create_command;

/// A command interaction waiting for its single reply.
pub struct PendingInteraction {
    pub command: CommandInteraction,
    /// An ephemeral deferred response was already sent; the reply edits it.
    pub deferred: bool,
}

/// Command interactions waiting for their single reply, keyed by interaction id.
pub type PendingInteractions = Arc<Mutex<HashMap<u64, PendingInteraction>>>;

/// Serenity event handler that bridges Discord events into the dispatcher.
pub struct DiscordHandler {
    pub guild_id: GuildId,
    pub bot_role_id: Option<RoleId>,
    pub status: Option<String>,
    pub commands: Vec<CommandSpec>,
    pub sender: mpsc::Sender<InboundEvent>,
    pub pending: PendingInteractions,
    pub ready: Arc<Notify>,
}

impl DiscordHandler {
    async fn forward(&self, event: InboundEvent) {
        debug!(event = event.kind(), "Forwarding Discord event");
        if self.sender.send(event).await.is_err() {
            info!("Inbound channel closed, handler will stop processing");
        }
    }

    async fn role_names(&self, ctx: &Context) -> Option<HashMap<u64, String>> {
        if let Some(names) = cached_role_names(ctx, self.guild_id) {
            return Some(names);
        }
        match crate::fetch_role_names(&ctx.http, self.guild_id).await {
            Ok(names) => Some(names),
            Err(e) => {
                warn!(guild_id = %self.guild_id, "Failed to fetch guild roles: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(bot_name = %ready.user.name, "Discord bot connected and ready");

        let commands = self.commands.iter().map(to_create_command).collect();
        match self.guild_id.set_commands(&ctx.http, commands).await {
            Ok(published) => info!(count = published.len(), "Slash commands published"),
            Err(e) => error!(guild_id = %self.guild_id, "Failed to publish slash commands: {e}"),
        }

        if let Some(status) = &self.status {
            ctx.set_activity(Some(ActivityData::custom(status.clone())));
        }

        if let Some(role_id) = self.bot_role_id {
            if let Err(e) = ctx
                .http
                .add_member_role(self.guild_id, ready.user.id, role_id, Some("algobot startup"))
                .await
            {
                warn!(role_id = %role_id, "Failed to assign bot role: {e}");
            }
        }

        self.ready.notify_one();
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Command(command) = interaction else {
            return;
        };

        let deferred = defers(&self.commands, &command.data.name)
            && match command.defer_ephemeral(&ctx.http).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(command = %command.data.name, "Failed to defer interaction: {e}");
                    false
                }
            };

        let event = interaction_event(&command);
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(event.interaction_id, PendingInteraction { command, deferred });
        self.forward(InboundEvent::Interaction(event)).await;
    }

    async fn guild_member_update(
        &self,
        ctx: Context,
        old_if_available: Option<Member>,
        _new: Option<Member>,
        event: GuildMemberUpdateEvent,
    ) {
        if event.guild_id != self.guild_id || event.user.bot {
            return;
        }
        let Some(names) = self.role_names(&ctx).await else {
            return;
        };

        let member_id = event.user.id.get();
        let name = display_name(
            event.nick.as_deref(),
            event.user.global_name.as_deref(),
            &event.user.name,
        );
        let current: Vec<u64> = event.roles.iter().map(|r| r.get()).collect();

        // Without a cached snapshot there is nothing to diff against.
        let Some(old) = old_if_available else {
            let profile = MemberProfile {
                id: member_id,
                display_name: name,
                roles: crate::label_roles(&names, &current),
            };
            self.forward(InboundEvent::MemberRefresh(profile)).await;
            return;
        };

        let previous: Vec<u64> = old.roles.iter().map(|r| r.get()).collect();
        let (added, removed) = diff_roles(&previous, &current);
        if !added.is_empty() {
            self.forward(InboundEvent::RoleAdd(RoleAddEvent {
                member_id,
                display_name: name,
                added_roles: crate::label_roles(&names, &added),
            }))
            .await;
        }
        if !removed.is_empty() {
            self.forward(InboundEvent::RoleRemove(RoleRemoveEvent {
                member_id,
                removed_roles: crate::label_roles(&names, &removed),
            }))
            .await;
        }
    }
}

fn cached_role_names(ctx: &Context, guild_id: GuildId) -> Option<HashMap<u64, String>> {
    let guild = ctx.cache.guild(guild_id)?;
    Some(
        guild
            .roles
            .iter()
            .map(|(id, role)| (id.get(), role.name.clone()))
            .collect(),
    )
}

/// Whether the command named `name` is acknowledged before it runs.
fn defers(commands: &[CommandSpec], name: &str) -> bool {
    commands.iter().any(|c| c.name == name && c.deferred)
}

fn interaction_event(command: &CommandInteraction) -> InteractionEvent {
    let nick = command.member.as_ref().and_then(|m| m.nick.as_deref());
    InteractionEvent {
        interaction_id: command.id.get(),
        command_name: command.data.name.clone(),
        options: option_map(
            command
                .data
                .options
                .iter()
                .map(|o| (o.name.as_str(), &o.value)),
        ),
        acting_member_id: command.user.id.get(),
        acting_member_name: display_name(
            nick,
            command.user.global_name.as_deref(),
            &command.user.name,
        ),
        origin_channel_id: command.channel_id.get(),
    }
}

/// Flatten scalar option values to strings. Non-scalar options are dropped.
fn option_map<'a>(
    options: impl IntoIterator<Item = (&'a str, &'a CommandDataOptionValue)>,
) -> HashMap<String, String> {
    options
        .into_iter()
        .filter_map(|(name, value)| {
            let text = match value {
                CommandDataOptionValue::String(s) => s.clone(),
                CommandDataOptionValue::Integer(i) => i.to_string(),
                CommandDataOptionValue::Boolean(b) => b.to_string(),
                CommandDataOptionValue::Number(n) => n.to_string(),
                _ => return None,
            };
            Some((name.to_string(), text))
        })
        .collect()
}

/// Guild nickname, then global display name, then username.
pub(crate) fn display_name(nick: Option<&str>, global_name: Option<&str>, username: &str) -> String {
    nick.or(global_name).unwrap_or(username).to_string()
}

/// Role ids present only in `current` (added) and only in `previous` (removed).
fn diff_roles(previous: &[u64], current: &[u64]) -> (Vec<u64>, Vec<u64>) {
    let before: HashSet<u64> = previous.iter().copied().collect();
    let after: HashSet<u64> = current.iter().copied().collect();
    let added = current.iter().copied().filter(|id| !before.contains(id)).collect();
    let removed = previous.iter().copied().filter(|id| !after.contains(id)).collect();
    (added, removed)
}
