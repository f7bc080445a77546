//! algobot-types: shared records, events, and outbound messages.

pub mod clock;

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub use clock::{Clock, FixedClock, SystemClock};

// ──────────────────── Member Types ────────────────────

/// A guild member tracked by the bot, keyed by the platform's numeric user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Platform-assigned user id.
    pub id: u64,
    /// Effective display name at the time the record was last written.
    pub name: String,
    /// Role labels, stored verbatim.
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl Member {
    /// Create a member with no roles.
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            roles: BTreeSet::new(),
        }
    }

    /// Union `labels` into the role set.
    pub fn add_roles<I, S>(&mut self, labels: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(labels.into_iter().map(Into::into));
    }

    /// Remove every label in `labels` from the role set.
    pub fn remove_roles<'a, I>(&mut self, labels: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        for label in labels {
            self.roles.remove(label);
        }
    }

    /// Case-insensitive role membership check.
    pub fn has_role(&self, label: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(label))
    }
}

/// A member as currently seen on the platform (used for roster sync).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberProfile {
    pub id: u64,
    pub display_name: String,
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl From<MemberProfile> for Member {
    fn from(profile: MemberProfile) -> Self {
        Self {
            id: profile.id,
            name: profile.display_name,
            roles: profile.roles,
        }
    }
}

/// A platform role resolved by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRef {
    pub id: u64,
    pub name: String,
}

impl RoleRef {
    /// Mention syntax that pings every holder of the role.
    pub fn mention(&self) -> String {
        format!("<@&{}>", self.id)
    }
}

// ──────────────────── Submission Types ────────────────────

/// A submission that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSubmission {
    pub member_id: u64,
    pub title: String,
    pub link: String,
    pub code: String,
    pub date_submitted: NaiveDate,
}

/// A persisted daily algorithm submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Store-generated id.
    pub id: i64,
    pub member_id: u64,
    pub title: String,
    pub link: String,
    pub code: String,
    pub date_submitted: NaiveDate,
}

// ──────────────────── Inbound Events ────────────────────

/// A slash-command invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionEvent {
    /// Platform interaction id, used to address the reply.
    pub interaction_id: u64,
    pub command_name: String,
    /// Raw option values keyed by option name.
    #[serde(default)]
    pub options: HashMap<String, String>,
    pub acting_member_id: u64,
    pub acting_member_name: String,
    pub origin_channel_id: u64,
}

/// Roles were granted to a member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleAddEvent {
    pub member_id: u64,
    pub display_name: String,
    pub added_roles: BTreeSet<String>,
}

/// Roles were taken from a member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRemoveEvent {
    pub member_id: u64,
    pub removed_roles: BTreeSet<String>,
}

/// Everything the platform delivers to the bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    Interaction(InteractionEvent),
    RoleAdd(RoleAddEvent),
    RoleRemove(RoleRemoveEvent),
    /// Full current profile of a member whose previous state was not observed.
    MemberRefresh(MemberProfile),
}

impl InboundEvent {
    /// Event kind name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::Interaction(_) => "interaction",
            InboundEvent::RoleAdd(_) => "role_add",
            InboundEvent::RoleRemove(_) => "role_remove",
            InboundEvent::MemberRefresh(_) => "member_refresh",
        }
    }

    /// Member whose stored record this event changes. `None` for interactions.
    pub fn member_id(&self) -> Option<u64> {
        match self {
            InboundEvent::Interaction(_) => None,
            InboundEvent::RoleAdd(ev) => Some(ev.member_id),
            InboundEvent::RoleRemove(ev) => Some(ev.member_id),
            InboundEvent::MemberRefresh(profile) => Some(profile.id),
        }
    }
}

// ──────────────────── Outbound Messages ────────────────────

/// A message the bot wants delivered through the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Post into a guild text channel.
    Channel { channel_id: u64, text: String },
    /// Open (or reuse) a private channel with a member and post there.
    Direct { member_id: u64, text: String },
    /// Answer a slash-command interaction.
    InteractionReply {
        interaction_id: u64,
        text: String,
        #[serde(default)]
        ephemeral: bool,
    },
}

impl OutboundMessage {
    pub fn channel(channel_id: u64, text: impl Into<String>) -> Self {
        Self::Channel {
            channel_id,
            text: text.into(),
        }
    }

    pub fn direct(member_id: u64, text: impl Into<String>) -> Self {
        Self::Direct {
            member_id,
            text: text.into(),
        }
    }

    /// Message body regardless of target.
    pub fn text(&self) -> &str {
        match self {
            OutboundMessage::Channel { text, .. }
            | OutboundMessage::Direct { text, .. }
            | OutboundMessage::InteractionReply { text, .. } => text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_roles_collapses_duplicates() {
        let mut member = Member::new(1, "Alice");
        member.add_roles(["mentee", "bots"]);
        member.add_roles(["mentee"]);
        assert_eq!(member.roles.len(), 2);
    }

    #[test]
    fn test_remove_roles_ignores_absent_labels() {
        let mut member = Member::new(1, "Alice");
        member.add_roles(["mentee", "mentor"]);
        let removed: BTreeSet<String> = ["mentor".to_string(), "ghost".to_string()].into();
        member.remove_roles(&removed);
        assert_eq!(member.roles, BTreeSet::from(["mentee".to_string()]));
    }

    #[test]
    fn test_has_role_case_insensitive() {
        let mut member = Member::new(1, "Alice");
        member.add_roles(["Mentee"]);
        assert!(member.has_role("mentee"));
        assert!(member.has_role("MENTEE"));
        assert!(!member.has_role("mentees"));
    }

    #[test]
    fn test_role_mention() {
        let role = RoleRef {
            id: 42,
            name: "mentee".into(),
        };
        assert_eq!(role.mention(), "<@&42>");
    }

    #[test]
    fn test_inbound_event_serde() {
        let event = InboundEvent::RoleRemove(RoleRemoveEvent {
            member_id: 7,
            removed_roles: ["mentee".to_string()].into(),
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"role_remove\""));
        let parsed: InboundEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.kind(), "role_remove");
        assert_eq!(parsed.member_id(), Some(7));
    }

    #[test]
    fn test_outbound_message_text() {
        let msg = OutboundMessage::direct(3, "Make sure to complete your daily algo!");
        assert_eq!(msg.text(), "Make sure to complete your daily algo!");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"direct\""));
    }

    #[test]
    fn test_interaction_event_options_default() {
        let json = r#"{"type":"interaction","interaction_id":1,"command_name":"hello-world","acting_member_id":2,"acting_member_name":"A","origin_channel_id":3}"#;
        let parsed: InboundEvent = serde_json::from_str(json).unwrap();
        match parsed {
            InboundEvent::Interaction(ref ev) => assert!(ev.options.is_empty()),
            _ => panic!("Expected Interaction variant"),
        }
        assert_eq!(parsed.member_id(), None);
    }
}
