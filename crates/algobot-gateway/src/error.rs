//! Error taxonomy shared by commands, role sync, and scheduled jobs.

use algobot_storage::StorageError;

use crate::platform::GatewayError;

/// Coarse classification used to decide how an error is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or missing command options; reported to the invoking user.
    Validation,
    /// Unknown command, unresolved role/channel/member.
    NotFound,
    /// Startup-time duplicate command or job; fatal.
    DuplicateRegistration,
    /// Platform send failure; logged, never retried here.
    Transport,
    /// Persistence failure.
    Storage,
}

#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("invalid option '{option}': {reason}")]
    InvalidOptions { option: String, reason: String },
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("no role found with the name '{0}'")]
    RoleNotFound(String),
    #[error("no channel found with ID: {0}")]
    ChannelNotFound(u64),
    #[error("member {0} not found")]
    MemberNotFound(u64),
    #[error("command '{0}' is already registered")]
    DuplicateCommand(String),
    #[error("job '{0}' is already registered")]
    DuplicateJob(String),
    #[error("transport error: {0}")]
    Transport(anyhow::Error),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl BotError {
    pub fn invalid_option(option: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOptions {
            option: option.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BotError::InvalidOptions { .. } => ErrorKind::Validation,
            BotError::UnknownCommand(_)
            | BotError::RoleNotFound(_)
            | BotError::ChannelNotFound(_)
            | BotError::MemberNotFound(_) => ErrorKind::NotFound,
            BotError::DuplicateCommand(_) | BotError::DuplicateJob(_) => {
                ErrorKind::DuplicateRegistration
            }
            BotError::Transport(_) => ErrorKind::Transport,
            BotError::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<GatewayError> for BotError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::ChannelNotFound(id) => BotError::ChannelNotFound(id),
            GatewayError::MemberNotFound(id) => BotError::MemberNotFound(id),
            GatewayError::Transport(e) => BotError::Transport(e),
        }
    }
}
