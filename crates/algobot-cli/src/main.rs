mod bot;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use algobot_config::AlgoBotConfig;
use algobot_cron::jobs::configured_jobs;

#[derive(Parser)]
#[command(name = "algobot", about = "Mentorship algo bot for Discord")]
struct Cli {
    /// Config file (defaults to ~/.algobot/config.json5)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to Discord and run the bot until Ctrl-C
    Run,
    /// List scheduled jobs and their next run
    Jobs,
    /// Run one scheduled job immediately
    RunJob {
        /// Job name, as printed by `jobs`
        name: String,
    },
    /// Check configuration and database
    Health,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,serenity=warn,tracing::span=warn"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let config = algobot_config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(bot::run(config))?;
        }
        Commands::Jobs => {
            print_jobs(&config)?;
        }
        Commands::RunJob { name } => {
            let rt = tokio::runtime::Runtime::new()?;
            match rt.block_on(bot::run_job(config, &name))? {
                Some(outcome) => println!(
                    "{name}: {} sent, {} failed",
                    outcome.sent, outcome.failed
                ),
                None => anyhow::bail!("job '{name}' failed, see the log for details"),
            }
        }
        Commands::Health => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(health(&config))?;
        }
    }

    Ok(())
}

/// Print every enabled job with its trigger and next firing instant.
fn print_jobs(config: &AlgoBotConfig) -> anyhow::Result<()> {
    let tz = config.schedule.tz()?;
    let storage = Arc::new(algobot_storage::AlgoBotStorage::open_in_memory()?);
    let platform = Arc::new(OfflinePlatform);
    let jobs = configured_jobs(config, storage, platform)?;

    let now = Utc::now().with_timezone(&tz);
    println!("Time zone: {tz}");
    for job in jobs {
        let next = job
            .trigger()
            .next_after(now)
            .map(|t| t.format("%Y-%m-%d %H:%M %Z").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!("  {:<20} {:<16} next: {next}", job.name(), job.trigger().to_string());
    }
    Ok(())
}

async fn health(config: &AlgoBotConfig) -> anyhow::Result<()> {
    match config.validate() {
        Ok(()) => println!("config: ok"),
        Err(e) => println!("config: {e}"),
    }
    println!("  guild: {}", config.discord.guild_id);
    println!("  time zone: {}", config.schedule.timezone);

    let storage = bot::open_storage(config)?;
    let members = storage.list_members().await?;
    println!("database: ok ({} members tracked)", members.len());
    Ok(())
}

/// Stand-in platform for listing jobs without connecting.
struct OfflinePlatform;

#[async_trait::async_trait]
impl algobot_gateway::Platform for OfflinePlatform {
    async fn send(
        &self,
        _message: algobot_types::OutboundMessage,
    ) -> Result<(), algobot_gateway::GatewayError> {
        Err(anyhow::anyhow!("not connected").into())
    }

    async fn resolve_role_by_name(
        &self,
        _name: &str,
    ) -> Result<Option<algobot_types::RoleRef>, algobot_gateway::GatewayError> {
        Ok(None)
    }

    async fn resolve_member(
        &self,
        _member_id: u64,
    ) -> Result<Option<algobot_types::MemberProfile>, algobot_gateway::GatewayError> {
        Ok(None)
    }

    async fn list_members(
        &self,
    ) -> Result<Vec<algobot_types::MemberProfile>, algobot_gateway::GatewayError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_job() {
        let cli = Cli::parse_from(["algobot", "--config", "/tmp/bot.json5", "run-job", "weekly-report"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/bot.json5")));
        assert!(matches!(cli.command, Commands::RunJob { ref name } if name == "weekly-report"));
    }

    #[test]
    fn test_print_jobs_with_defaults() {
        print_jobs(&AlgoBotConfig::default()).unwrap();
    }
}
