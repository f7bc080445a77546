//! Inbound event loop: routes platform events to the command registry or the
//! role synchronizer, one spawned task per event.
//!
//! Member events for the same member id are chained: each task waits for the
//! previous one for that member, so they apply in arrival order.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use algobot_types::{Clock, InboundEvent, InteractionEvent, OutboundMessage};

use crate::commands::{CommandRegistry, CommandReply, InvocationContext};
use crate::error::{BotError, ErrorKind};
use crate::platform::Platform;
use crate::role_sync::RoleSynchronizer;

pub struct EventDispatcher {
    registry: Arc<CommandRegistry>,
    roles: Arc<RoleSynchronizer>,
    platform: Arc<dyn Platform>,
    clock: Arc<dyn Clock>,
}

impl EventDispatcher {
    pub fn new(
        registry: Arc<CommandRegistry>,
        roles: Arc<RoleSynchronizer>,
        platform: Arc<dyn Platform>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            roles,
            platform,
            clock,
        }
    }

    /// Consume events until the sender side closes.
    ///
    /// Should be spawned as a background task.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<InboundEvent>) {
        info!("Event dispatch loop started");

        let mut chains: HashMap<u64, JoinHandle<()>> = HashMap::new();
        while let Some(event) = rx.recv().await {
            let dispatcher = self.clone();
            let Some(member_id) = event.member_id() else {
                tokio::spawn(async move {
                    dispatcher.handle(event).await;
                });
                continue;
            };

            chains.retain(|_, task| !task.is_finished());
            let previous = chains.remove(&member_id);
            let task = tokio::spawn(async move {
                if let Some(previous) = previous {
                    if let Err(e) = previous.await {
                        error!(member_id, "Previous member event task failed: {e}");
                    }
                }
                dispatcher.handle(event).await;
            });
            chains.insert(member_id, task);
        }

        // Let queued member events finish before reporting the loop as stopped.
        for (member_id, task) in chains {
            if let Err(e) = task.await {
                error!(member_id, "Member event task failed: {e}");
            }
        }

        info!("Event dispatch loop stopped");
    }

    /// Handle one event to completion. Never returns an error; failures are
    /// logged or turned into a reply.
    pub async fn handle(&self, event: InboundEvent) {
        let kind = event.kind();
        match event {
            InboundEvent::Interaction(interaction) => {
                self.handle_interaction(interaction).await;
            }
            InboundEvent::RoleAdd(ev) => {
                if let Err(e) = self.roles.on_role_add(&ev).await {
                    error!(member_id = ev.member_id, event = kind, "Role sync failed: {e}");
                }
            }
            InboundEvent::RoleRemove(ev) => {
                if let Err(e) = self.roles.on_role_remove(&ev).await {
                    error!(member_id = ev.member_id, event = kind, "Role sync failed: {e}");
                }
            }
            InboundEvent::MemberRefresh(profile) => {
                let member_id = profile.id;
                if let Err(e) = self.roles.apply_profile(profile).await {
                    error!(member_id, event = kind, "Role sync failed: {e}");
                }
            }
        }
    }

    /// Dispatch a command and send exactly one reply for it.
    pub async fn handle_interaction(&self, event: InteractionEvent) -> CommandReply {
        let ctx = InvocationContext {
            interaction_id: event.interaction_id,
            member_id: event.acting_member_id,
            member_name: event.acting_member_name.clone(),
            channel_id: event.origin_channel_id,
            today: self.clock.today(),
        };

        info!(
            command = %event.command_name,
            member_id = ctx.member_id,
            channel_id = ctx.channel_id,
            "Dispatching command"
        );

        let reply = match self
            .registry
            .dispatch(&event.command_name, &event.options, &ctx)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                match e.kind() {
                    ErrorKind::Validation | ErrorKind::NotFound => {
                        warn!(command = %event.command_name, "Command rejected: {e}")
                    }
                    _ => error!(command = %event.command_name, "Command failed: {e}"),
                }
                CommandReply::ephemeral(error_reply(&event.command_name, &e))
            }
        };

        let message = OutboundMessage::InteractionReply {
            interaction_id: event.interaction_id,
            text: reply.text.clone(),
            ephemeral: reply.ephemeral,
        };
        if let Err(e) = self.platform.send(message).await {
            warn!(
                command = %event.command_name,
                interaction_id = event.interaction_id,
                "Failed to reply to interaction: {e}"
            );
        }
        reply
    }
}

/// User-facing text for a failed command.
fn error_reply(command: &str, err: &BotError) -> String {
    match err {
        BotError::InvalidOptions { option, reason } => {
            format!("Could not run /{command}: option '{option}' {reason}.")
        }
        BotError::UnknownCommand(_) => format!("Unknown command /{command}."),
        _ => format!("Something went wrong while running /{command}. Please try again later."),
    }
}
