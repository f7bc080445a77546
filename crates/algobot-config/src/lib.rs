use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable that overrides `discord.bot_token`.
pub const BOT_TOKEN_ENV: &str = "DISCORD_BOT_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON5 parse error: {0}")]
    Json5(#[from] json5::Error),
    #[error("Config directory not found")]
    NoDirFound,
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Discord connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Bot token (overridden by `DISCORD_BOT_TOKEN`).
    #[serde(default)]
    pub bot_token: String,
    /// The guild the bot serves.
    #[serde(default)]
    pub guild_id: u64,
    /// Role granted to the bot's own member on startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_role_id: Option<u64>,
    /// Custom status text shown on the bot user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Role names used for audience targeting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolesConfig {
    /// Role pinged by the standup reminder and included in the weekly report.
    #[serde(default = "default_mentee_role")]
    pub mentee: String,
    /// Role pinged by the timecard reminder.
    #[serde(default = "default_timecard_role")]
    pub timecard: String,
}

fn default_mentee_role() -> String {
    "mentee".to_string()
}

fn default_timecard_role() -> String {
    "mentees".to_string()
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            mentee: default_mentee_role(),
            timecard: default_timecard_role(),
        }
    }
}

/// Guild text channels the bot posts to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsConfig {
    /// Where `post-algo` submissions are shown to mentors.
    #[serde(default)]
    pub algo_review: u64,
    /// Where the weekly report is posted.
    #[serde(default)]
    pub weekly_report: u64,
    /// Where standup and timecard reminders are posted.
    #[serde(default)]
    pub current_mentees: u64,
}

/// Scheduled job settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// IANA time zone name all triggers are evaluated in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_true")]
    pub standup_reminder: bool,
    #[serde(default = "default_true")]
    pub algo_reminder: bool,
    #[serde(default = "default_true")]
    pub timecard_reminder: bool,
    #[serde(default = "default_true")]
    pub weekly_report: bool,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            standup_reminder: true,
            algo_reminder: true,
            timecard_reminder: true,
            weekly_report: true,
        }
    }
}

impl ScheduleConfig {
    /// Parse the configured time zone.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::Invalid(format!("unknown timezone '{}'", self.timezone)))
    }
}

/// SQLite settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file; defaults to `~/.algobot/algobot.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Top-level algobot configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlgoBotConfig {
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub roles: RolesConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl AlgoBotConfig {
    /// Check that everything needed to run the bot is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discord.bot_token.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "discord.bot_token is empty (set it in the config file or {BOT_TOKEN_ENV})"
            )));
        }
        if self.discord.guild_id == 0 {
            return Err(ConfigError::Invalid("discord.guild_id is not set".into()));
        }
        for (name, id) in [
            ("channels.algo_review", self.channels.algo_review),
            ("channels.weekly_report", self.channels.weekly_report),
            ("channels.current_mentees", self.channels.current_mentees),
        ] {
            if id == 0 {
                return Err(ConfigError::Invalid(format!("{name} is not set")));
            }
        }
        self.schedule.tz()?;
        Ok(())
    }

    /// Resolve the database file path.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.database.path {
            Some(path) => Ok(path.clone()),
            None => Ok(ensure_config_dir()?.join("algobot.db")),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var(BOT_TOKEN_ENV) {
            if !token.trim().is_empty() {
                self.discord.bot_token = token;
            }
        }
    }
}

/// Resolve the algobot config directory (~/.algobot/).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".algobot"))
        .ok_or(ConfigError::NoDirFound)
}

/// Resolve the config file path (~/.algobot/config.json5).
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.json5"))
}

/// Load configuration from `path` (or the default path), then apply env overrides.
pub fn load_config(path: Option<&Path>) -> Result<AlgoBotConfig, ConfigError> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let mut config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config_from(&config_file_path()?)?,
    };
    config.apply_env_overrides();
    Ok(config)
}

/// Load configuration from a specific path, falling back to defaults if not found.
pub fn load_config_from(path: &Path) -> Result<AlgoBotConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!("Config file not found at {}, using defaults", path.display());
        return Ok(AlgoBotConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: AlgoBotConfig = json5::from_str(&content)?;
    Ok(config)
}

/// Ensure the config directory exists.
pub fn ensure_config_dir() -> Result<PathBuf, ConfigError> {
    let dir = config_dir()?;
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> AlgoBotConfig {
        json5::from_str(
            r#"{
                discord: { bot_token: "abc", guild_id: 1 },
                channels: { algo_review: 2, weekly_report: 3, current_mentees: 4 },
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = AlgoBotConfig::default();
        assert_eq!(config.roles.mentee, "mentee");
        assert_eq!(config.roles.timecard, "mentees");
        assert_eq!(config.schedule.timezone, "UTC");
        assert!(config.schedule.algo_reminder);
    }

    #[test]
    fn test_json5_parse() {
        let json5_str = r#"{
            discord: { bot_token: "Bot xyz", guild_id: 1234, bot_role_id: 99 },
            roles: { mentee: "apprentice" },
            channels: { algo_review: 10, weekly_report: 11, current_mentees: 12 },
            schedule: { timezone: "America/Chicago", weekly_report: false },
        }"#;
        let config: AlgoBotConfig = json5::from_str(json5_str).unwrap();
        assert_eq!(config.discord.guild_id, 1234);
        assert_eq!(config.discord.bot_role_id, Some(99));
        assert_eq!(config.roles.mentee, "apprentice");
        assert_eq!(config.roles.timecard, "mentees");
        assert!(!config.schedule.weekly_report);
        assert!(config.schedule.standup_reminder);
        assert_eq!(config.schedule.tz().unwrap(), chrono_tz::America::Chicago);
    }

    #[test]
    fn test_validate_complete() {
        assert!(complete().validate().is_ok());
    }

    #[test]
    fn test_validate_missing_token() {
        let mut config = complete();
        config.discord.bot_token = "  ".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bot_token"));
    }

    #[test]
    fn test_validate_missing_channel() {
        let mut config = complete();
        config.channels.weekly_report = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("channels.weekly_report"));
    }

    #[test]
    fn test_validate_bad_timezone() {
        let mut config = complete();
        config.schedule.timezone = "Mars/Olympus".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Mars/Olympus"));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("algobot-does-not-exist.json5");
        let config = load_config_from(&path).unwrap();
        assert_eq!(config.discord.guild_id, 0);
    }

    #[test]
    fn test_explicit_database_path() {
        let mut config = complete();
        config.database.path = Some(PathBuf::from("/tmp/algobot-test.db"));
        assert_eq!(
            config.database_path().unwrap(),
            PathBuf::from("/tmp/algobot-test.db")
        );
    }
}
