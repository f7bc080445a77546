//! algobot-gateway: event and command dispatch for the mentorship bot.
//!
//! Provides:
//! - `Platform` capability trait for outbound messages and lookups
//! - Command registry with option validation (`/hello-world`, `/post-algo`)
//! - Role state synchronizer with per-member serialization
//! - Inbound event dispatch loop
//! - The bot's error taxonomy

pub mod commands;
pub mod dispatcher;
pub mod error;
pub mod platform;
pub mod role_sync;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use commands::{CommandRegistry, CommandSpec};
pub use dispatcher::EventDispatcher;
pub use error::{BotError, ErrorKind};
pub use platform::{GatewayError, Platform};
pub use role_sync::RoleSynchronizer;
