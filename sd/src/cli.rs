//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// StorySync - incremental story sync daemon
#[derive(Parser)]
#[command(
    name = "sd",
    about = "Pulls changed stories from a graph store and republishes them to a publishing platform",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute (defaults to `run`)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
///
/// Everything but `run` opens the state store directly, so the daemon must
/// not be running.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the sync daemon until Ctrl-C
    Run,

    /// Pause pulling on a channel
    Freeze {
        /// Channel id
        channel: String,
    },

    /// Resume pulling on a channel
    Unfreeze {
        /// Channel id
        channel: String,
    },

    /// Show a channel's cursor
    Cursor {
        /// Channel id
        channel: String,

        /// Forget the cursor so the next pull starts from the beginning
        #[arg(long)]
        reset: bool,
    },

    /// Read or write raw state entries
    State {
        #[command(subcommand)]
        command: StateAction,
    },
}

/// Raw state store access
#[derive(Debug, Subcommand)]
pub enum StateAction {
    /// Print the value stored under a key
    Get { key: String },

    /// Store a JSON value under a key
    Set {
        key: String,
        /// JSON value, e.g. `true` or `"2024-03-01T00:00:00Z"`
        value: String,
    },
}
