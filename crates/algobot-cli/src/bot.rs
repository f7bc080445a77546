//! Process wiring: storage, Discord platform, dispatcher and scheduler.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use algobot_channel_discord::DiscordPlatform;
use algobot_config::AlgoBotConfig;
use algobot_cron::jobs::configured_jobs;
use algobot_cron::{JobOutcome, Scheduler};
use algobot_gateway::commands::{HelloWorldCommand, PostAlgoCommand};
use algobot_gateway::{BotError, CommandRegistry, EventDispatcher, Platform, RoleSynchronizer};
use algobot_storage::AlgoBotStorage;
use algobot_types::{Clock, SystemClock};

/// Inbound events buffered between the gateway and the dispatcher.
const EVENT_BUFFER: usize = 256;

/// Register the bot's commands. A duplicate name is a startup error.
pub fn build_registry(
    config: &AlgoBotConfig,
    storage: Arc<AlgoBotStorage>,
    platform: Arc<dyn Platform>,
) -> Result<CommandRegistry, BotError> {
    let mut registry = CommandRegistry::new();
    registry.register(Arc::new(HelloWorldCommand::new()))?;
    registry.register(Arc::new(PostAlgoCommand::new(
        storage,
        platform,
        config.channels.algo_review,
    )))?;
    Ok(registry)
}

/// Build the scheduler holding every enabled job.
pub fn build_scheduler(
    config: &AlgoBotConfig,
    storage: Arc<AlgoBotStorage>,
    platform: Arc<dyn Platform>,
) -> anyhow::Result<Scheduler> {
    let mut scheduler = Scheduler::new(config.schedule.tz()?);
    for job in configured_jobs(config, storage, platform)? {
        scheduler.add_job(job)?;
    }
    Ok(scheduler)
}

pub fn open_storage(config: &AlgoBotConfig) -> anyhow::Result<AlgoBotStorage> {
    let path = config.database_path()?;
    let storage = AlgoBotStorage::open(&path)
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    info!(path = %path.display(), "Database opened");
    Ok(storage)
}

/// Run the bot until Ctrl-C.
pub async fn run(config: AlgoBotConfig) -> anyhow::Result<()> {
    config.validate()?;
    let tz = config.schedule.tz()?;

    let storage = Arc::new(open_storage(&config)?);
    let discord = Arc::new(DiscordPlatform::from_config(&config.discord)?);
    let platform: Arc<dyn Platform> = discord.clone();

    let registry = Arc::new(build_registry(&config, storage.clone(), platform.clone())?);
    let roles = Arc::new(RoleSynchronizer::new(storage.clone(), platform.clone()));
    let dispatcher = Arc::new(EventDispatcher::new(
        registry.clone(),
        roles.clone(),
        platform.clone(),
        Arc::new(SystemClock::new(tz)),
    ));
    let scheduler = Arc::new(build_scheduler(&config, storage, platform)?);

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let dispatch_handle = tokio::spawn(dispatcher.run(rx));
    discord.start(registry.specs(), tx).await?;

    let ready = discord.clone();
    tokio::spawn(async move {
        ready.wait_ready().await;
        if let Err(e) = roles.sync_roster().await {
            error!("Roster sync failed: {e}");
        }
    });

    let shutdown = CancellationToken::new();
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown.clone()));

    info!("algobot running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    shutdown.cancel();
    if let Err(e) = scheduler_handle.await {
        error!("Scheduler task failed: {e}");
    }
    discord.stop().await?;
    dispatch_handle.abort();

    Ok(())
}

/// Run one job immediately for today's date over the HTTP API.
pub async fn run_job(config: AlgoBotConfig, name: &str) -> anyhow::Result<Option<JobOutcome>> {
    config.validate()?;
    let tz = config.schedule.tz()?;

    let storage = Arc::new(open_storage(&config)?);
    let discord = Arc::new(DiscordPlatform::from_config(&config.discord)?);
    let platform: Arc<dyn Platform> = discord.clone();

    let scheduler = build_scheduler(&config, storage, platform)?;
    let job = scheduler
        .find(name)
        .with_context(|| format!("No enabled job named '{name}'"))?;

    discord.connect_http().await;
    let today = SystemClock::new(tz).today();
    Ok(algobot_cron::scheduler::run_job(job.as_ref(), today).await)
}

#[cfg(test)]
mod tests {
    use algobot_gateway::testing::MockPlatform;

    use super::*;

    #[test]
    fn test_registry_has_both_commands() {
        let storage = Arc::new(AlgoBotStorage::open_in_memory().unwrap());
        let registry =
            build_registry(&AlgoBotConfig::default(), storage, Arc::new(MockPlatform::new()))
                .unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("hello-world"));
        assert!(registry.contains("post-algo"));
    }

    #[test]
    fn test_scheduler_holds_enabled_jobs() {
        let storage = Arc::new(AlgoBotStorage::open_in_memory().unwrap());
        let mut config = AlgoBotConfig::default();
        config.schedule.standup_reminder = false;
        let scheduler = build_scheduler(&config, storage, Arc::new(MockPlatform::new())).unwrap();
        assert_eq!(scheduler.jobs().len(), 3);
        assert!(scheduler.find("standup-reminder").is_none());
        assert!(scheduler.find("weekly-report").is_some());
    }

    #[test]
    fn test_scheduler_rejects_bad_timezone() {
        let storage = Arc::new(AlgoBotStorage::open_in_memory().unwrap());
        let mut config = AlgoBotConfig::default();
        config.schedule.timezone = "Mars/Olympus".into();
        assert!(build_scheduler(&config, storage, Arc::new(MockPlatform::new())).is_err());
    }
}
