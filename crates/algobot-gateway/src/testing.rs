//! In-memory [`Platform`] for tests.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use algobot_types::{MemberProfile, OutboundMessage, RoleRef};

use crate::platform::{GatewayError, Platform};

#[derive(Default)]
struct MockState {
    sent: Vec<OutboundMessage>,
    roles: Vec<RoleRef>,
    members: Vec<MemberProfile>,
    missing_channels: HashSet<u64>,
    failing_members: HashSet<u64>,
}

/// Records every delivered message. Channels exist unless removed; direct
/// messages succeed unless the member is marked as failing.
#[derive(Default)]
pub struct MockPlatform {
    state: Mutex<MockState>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_role(&self, id: u64, name: &str) {
        self.state().roles.push(RoleRef {
            id,
            name: name.to_string(),
        });
    }

    pub fn add_member(&self, profile: MemberProfile) {
        self.state().members.push(profile);
    }

    pub fn remove_channel(&self, channel_id: u64) {
        self.state().missing_channels.insert(channel_id);
    }

    pub fn fail_direct_messages_to(&self, member_id: u64) {
        self.state().failing_members.insert(member_id);
    }

    /// Every successfully delivered message, in order.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.state().sent.clone()
    }

    pub fn channel_messages(&self, channel_id: u64) -> Vec<String> {
        self.state()
            .sent
            .iter()
            .filter_map(|m| match m {
                OutboundMessage::Channel { channel_id: c, text } if *c == channel_id => {
                    Some(text.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// `(member_id, text)` of every delivered direct message.
    pub fn direct_messages(&self) -> Vec<(u64, String)> {
        self.state()
            .sent
            .iter()
            .filter_map(|m| match m {
                OutboundMessage::Direct { member_id, text } => Some((*member_id, text.clone())),
                _ => None,
            })
            .collect()
    }

    /// `(interaction_id, text, ephemeral)` of every interaction reply.
    pub fn replies(&self) -> Vec<(u64, String, bool)> {
        self.state()
            .sent
            .iter()
            .filter_map(|m| match m {
                OutboundMessage::InteractionReply {
                    interaction_id,
                    text,
                    ephemeral,
                } => Some((*interaction_id, text.clone(), *ephemeral)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl Platform for MockPlatform {
    async fn send(&self, message: OutboundMessage) -> Result<(), GatewayError> {
        let mut state = self.state();
        match &message {
            OutboundMessage::Channel { channel_id, .. }
                if state.missing_channels.contains(channel_id) =>
            {
                return Err(GatewayError::ChannelNotFound(*channel_id));
            }
            OutboundMessage::Direct { member_id, .. }
                if state.failing_members.contains(member_id) =>
            {
                return Err(GatewayError::Transport(anyhow::anyhow!(
                    "cannot send messages to user {member_id}"
                )));
            }
            _ => {}
        }
        state.sent.push(message);
        Ok(())
    }

    async fn resolve_role_by_name(&self, name: &str) -> Result<Option<RoleRef>, GatewayError> {
        Ok(self
            .state()
            .roles
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn resolve_member(&self, member_id: u64) -> Result<Option<MemberProfile>, GatewayError> {
        Ok(self
            .state()
            .members
            .iter()
            .find(|m| m.id == member_id)
            .cloned())
    }

    async fn list_members(&self) -> Result<Vec<MemberProfile>, GatewayError> {
        Ok(self.state().members.clone())
    }
}
