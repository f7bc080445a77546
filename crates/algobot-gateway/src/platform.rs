//! Capability handle for the chat platform.
//!
//! The platform connection is an external collaborator: it delivers
//! [`InboundEvent`](algobot_types::InboundEvent)s on an mpsc channel and accepts
//! [`OutboundMessage`]s through this trait. Everything that talks to the platform
//! receives an `Arc<dyn Platform>` at construction time.
//!
//! ```text
//! Platform connection
//!     ↓ (InboundEvent via mpsc)
//! EventDispatcher → CommandRegistry / RoleSynchronizer
//!     ↓
//! Platform::send(OutboundMessage)
//! ```

use algobot_types::{MemberProfile, OutboundMessage, RoleRef};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("channel {0} not found")]
    ChannelNotFound(u64),
    #[error("member {0} not found")]
    MemberNotFound(u64),
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// Outbound side of the platform connection.
///
/// Use `&self` for all methods; implementations use interior mutability for
/// any connection state.
#[async_trait::async_trait]
pub trait Platform: Send + Sync {
    /// Deliver a message. Long texts may be split by the implementation.
    async fn send(&self, message: OutboundMessage) -> Result<(), GatewayError>;

    /// Find a guild role by name, case-insensitively. First match wins.
    async fn resolve_role_by_name(&self, name: &str) -> Result<Option<RoleRef>, GatewayError>;

    /// Fetch a member's current profile from the guild.
    async fn resolve_member(&self, member_id: u64) -> Result<Option<MemberProfile>, GatewayError>;

    /// Fetch every member of the guild.
    async fn list_members(&self) -> Result<Vec<MemberProfile>, GatewayError>;
}
