//! `evolution`: interactive streaming assistant with sessions and memory.

mod console;
mod repl;
mod worker;

use anyhow::Context;
use clap::{Parser, Subcommand};
use evolution_config::{ConfigError, EnvSettings, EvolutionConfig, LayeredConfigOptions};
use evolution_core::{
    BackgroundMemoryProcessor, Orchestrator, ProcessJobRunner, SessionStore, bootstrap,
};
use evolution_protocol::SessionId;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Command-line options for the interactive client.
#[derive(Debug, Parser)]
#[command(name = "evolution", version)]
struct Cli {
    /// Optional path to an evolution.json5 config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Resume (or create) the session with this id
    #[arg(long)]
    session: Option<String>,
    /// OpenAI model name for the top-level agent
    #[arg(long)]
    model: Option<String>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Process one memory job read as JSON from stdin
    MemoryWorker,
}

fn load_config(cli: &Cli) -> anyhow::Result<EvolutionConfig> {
    let cwd = std::env::current_dir().context("failed to resolve current working directory")?;
    let mut options = LayeredConfigOptions::new(&cwd);
    if let Some(path) = &cli.config {
        options = options.with_runtime_path(path);
    }
    let mut config = EvolutionConfig::load_layered_with_options(options)
        .context("failed to load config")?
        .config;
    if let Some(model) = &cli.model {
        config.agent.model = model.clone();
    }
    config.validate().context("invalid config")?;
    Ok(config)
}

/// Arguments that make a worker child load the same config as its parent.
fn worker_leading_args(cli: &Cli) -> Vec<String> {
    match &cli.config {
        Some(path) => vec!["--config".to_string(), path.to_string_lossy().to_string()],
        None => Vec::new(),
    }
}

fn load_env() -> anyhow::Result<EnvSettings> {
    match EnvSettings::from_env() {
        Ok(env) => Ok(env),
        Err(ConfigError::MissingEnv(missing)) => {
            eprint!("{}", console::missing_env_report(&missing));
            std::process::exit(1);
        }
        Err(err) => Err(err).context("invalid environment"),
    }
}

async fn run_interactive(
    cli: &Cli,
    config: EvolutionConfig,
    env: EnvSettings,
) -> anyhow::Result<()> {
    let state_store = bootstrap::state_store(&env).context("failed to open session store")?;
    let sessions = SessionStore::new(Some(state_store));
    let memory = bootstrap::memory_service(&config, &env).context("failed to build memory")?;
    let memory_enabled = memory.is_some();
    let tools = bootstrap::builtin_tools(&config, &env, memory).context("failed to build tools")?;
    let agent = bootstrap::agent(&config, &env, &tools).context("failed to build agent")?;
    let orchestrator = Orchestrator::new(agent, sessions)
        .with_max_tool_log_chars(config.tools.max_tool_log_chars);
    let _cleanup = repl::SessionCleanup::new(&orchestrator);

    let background = if config.background.enabled && memory_enabled {
        let runner = ProcessJobRunner::current_exe(
            worker_leading_args(cli),
            Duration::from_secs(config.background.timeout_secs),
        )
        .context("failed to locate current executable")?;
        Some(BackgroundMemoryProcessor::start(
            Arc::new(runner),
            config.background.queue_capacity,
        ))
    } else {
        info!("background memory processing disabled");
        None
    };

    let requested = cli.session.clone().or_else(|| config.sessions.id.clone());
    let session_id = requested
        .map(SessionId::parse)
        .transpose()
        .context("invalid session id")?;
    let result = match orchestrator.create_session(session_id) {
        Ok(session) => {
            info!(
                "session ready (session_id={}, turns={})",
                session.id,
                session.turns.len()
            );
            repl::run(&orchestrator, background.as_ref(), &session).await
        }
        Err(err) => Err(err).context("failed to open session"),
    };

    if let Some(background) = &background {
        background
            .shutdown(Duration::from_secs(config.background.shutdown_grace_secs))
            .await;
    }
    result
}

/// Entry point for the Evolution client.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let _ = env_logger::builder()
        .format_timestamp_millis()
        .parse_default_env()
        .try_init();

    let cli = Cli::parse();
    info!(
        "starting evolution (config_set={}, session_set={}, model_set={}, worker={})",
        cli.config.is_some(),
        cli.session.is_some(),
        cli.model.is_some(),
        cli.command.is_some()
    );
    let env = load_env()?;
    let config = load_config(&cli)?;

    match cli.command {
        Some(Command::MemoryWorker) => worker::run(&config, &env).await,
        None => run_interactive(&cli, config, env).await,
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command, worker_leading_args};
    use clap::Parser;
    use evolution_core::MEMORY_WORKER_COMMAND;
    use pretty_assertions::assert_eq;

    #[test]
    fn worker_subcommand_accepts_leading_config() {
        let cli = Cli::try_parse_from(["evolution", "--config", "x.json5", MEMORY_WORKER_COMMAND])
            .expect("parse");
        assert!(matches!(cli.command, Some(Command::MemoryWorker)));
        assert_eq!(worker_leading_args(&cli), vec!["--config", "x.json5"]);
    }

    #[test]
    fn interactive_flags_parse() {
        let cli = Cli::try_parse_from(["evolution", "--session", "abc", "--model", "gpt-5"])
            .expect("parse");
        assert!(cli.command.is_none());
        assert_eq!(cli.session.as_deref(), Some("abc"));
        assert_eq!(cli.model.as_deref(), Some("gpt-5"));
        assert!(worker_leading_args(&cli).is_empty());
    }
}
