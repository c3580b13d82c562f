//! sd - StorySync daemon
//!
//! CLI entry point: runs the sync daemon or edits its state offline.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use serde_json::Value;
use tracing::{debug, info};

use statestore::KvStore;
use storysync::cli::{Cli, Command, StateAction};
use storysync::config::{Config, load_log_level};
use storysync::daemon::{SHUTDOWN_GRACE, SyncDaemon};
use storysync::state::keys;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("storysync")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("storysync.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = load_log_level(cli.config.as_ref());

    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        None | Some(Command::Run) => {
            debug!("main: matched Run command");
            cmd_run(config).await
        }
        Some(Command::Freeze { channel }) => {
            debug!(%channel, "main: matched Freeze command");
            cmd_set_frozen(&config, &channel, true)
        }
        Some(Command::Unfreeze { channel }) => {
            debug!(%channel, "main: matched Unfreeze command");
            cmd_set_frozen(&config, &channel, false)
        }
        Some(Command::Cursor { channel, reset }) => {
            debug!(%channel, reset, "main: matched Cursor command");
            cmd_cursor(&config, &channel, reset)
        }
        Some(Command::State { command }) => {
            debug!(?command, "main: matched State command");
            cmd_state(&config, command)
        }
    }
}

/// Run the daemon until Ctrl-C
async fn cmd_run(config: Config) -> Result<()> {
    debug!("cmd_run: called");
    let channels = config.channels.len();
    let mut daemon = SyncDaemon::new(config)?;

    if let Err(e) = daemon.start().await {
        debug!("cmd_run: start failed, shutting down");
        daemon.shutdown(SHUTDOWN_GRACE).await?;
        return Err(e);
    }

    println!("{} syncing {} channel(s), Ctrl-C to stop", "StorySync".green().bold(), channels);
    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;

    println!("Shutting down...");
    info!("Received Ctrl-C, shutting down");
    daemon.shutdown(SHUTDOWN_GRACE).await
}

fn open_store(config: &Config) -> Result<KvStore> {
    let path = &config.storage.state_path;
    KvStore::open(path).context(format!(
        "Failed to open state store at {} (is the daemon running?)",
        path.display()
    ))
}

fn cmd_set_frozen(config: &Config, channel: &str, frozen: bool) -> Result<()> {
    debug!(%channel, frozen, "cmd_set_frozen: called");
    if config.channel(channel).is_none() {
        println!("{} channel {} is not configured", "warning:".yellow(), channel.cyan());
    }

    let mut store = open_store(config)?;
    store.set(&keys::frozen(&keys::channel_stream(channel)), &Value::Bool(frozen))?;
    store.close()?;

    let word = if frozen { "frozen" } else { "unfrozen" };
    println!("{} channel {} {}", "✓".green(), channel.cyan(), word);
    Ok(())
}

fn cmd_cursor(config: &Config, channel: &str, reset: bool) -> Result<()> {
    debug!(%channel, reset, "cmd_cursor: called");
    let key = keys::last_update(&keys::channel_stream(channel));
    let mut store = open_store(config)?;

    if reset {
        debug!("cmd_cursor: resetting");
        let removed = store.remove(&key)?;
        store.close()?;
        if removed {
            println!("{} cursor of {} reset", "✓".green(), channel.cyan());
        } else {
            println!("{} {} has no cursor", "absent:".yellow(), channel.cyan());
        }
        return Ok(());
    }

    match store.get(&key)? {
        Some(Value::String(cursor)) => println!("{} {}", channel.cyan(), cursor),
        Some(other) => println!("{} {}", channel.cyan(), other),
        None => println!("{} {} has no cursor", "absent:".yellow(), channel.cyan()),
    }
    store.close()
}

fn cmd_state(config: &Config, action: StateAction) -> Result<()> {
    debug!(?action, "cmd_state: called");
    let mut store = open_store(config)?;

    match action {
        StateAction::Get { key } => match store.get(&key)? {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => println!("{} {}", "absent:".yellow(), key),
        },
        StateAction::Set { key, value } => {
            let value: Value = serde_json::from_str(&value).context(format!("Value for {} is not valid JSON", key))?;
            store.set(&key, &value)?;
            println!("{} {} = {}", "✓".green(), key.cyan(), value);
        }
    }

    store.close()
}
