//! ss - inspect and edit a statestore file
//!
//! Intended for offline use: the store is locked while a daemon has it open.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::*;
use eyre::{Context, Result};

use statestore::KvStore;

#[derive(Parser, Debug)]
#[command(name = "ss")]
#[command(author, version, about = "Inspect a durable state store", long_about = None)]
struct Cli {
    /// Path to the state store database
    store: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the value stored under a key
    Get {
        /// Key to read
        key: String,
    },

    /// Store a JSON value under a key
    Set {
        /// Key to write
        key: String,

        /// JSON value (e.g. 42, true, "\"text\"")
        value: String,
    },

    /// Remove a key
    Rm {
        /// Key to remove
        key: String,
    },

    /// List keys
    List {
        /// Only list keys starting with this prefix
        #[arg(short, long)]
        prefix: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut store = KvStore::open(&cli.store)?;

    match cli.command {
        Command::Get { key } => match store.get(&key)? {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => println!("{} {}", "absent:".yellow(), key),
        },
        Command::Set { key, value } => {
            let value: serde_json::Value =
                serde_json::from_str(&value).context(format!("Value for {} is not valid JSON", key))?;
            store.set(&key, &value)?;
            println!("{} {} = {}", "✓".green(), key.cyan(), value);
        }
        Command::Rm { key } => {
            if store.remove(&key)? {
                println!("{} removed {}", "✓".green(), key.cyan());
            } else {
                println!("{} {}", "absent:".yellow(), key);
            }
        }
        Command::List { prefix } => {
            for key in store.keys(prefix.as_deref())? {
                println!("{}", key);
            }
        }
    }

    store.close()
}
