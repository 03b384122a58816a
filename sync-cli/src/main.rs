//! # roomsync
//!
//! Command line chat client built on roomsync.
//!
//! ## Commands
//!
//! - `login`: Log in with a password and save the access token
//! - `listen`: Sync and print incoming messages and membership changes
//! - `send`: Send a text message to a room
//!
//! ## Example
//!
//! ```bash
//! # Log in (prompts for the password)
//! roomsync login --homeserver https://matrix.example.org --user @bot:example.org
//!
//! # Print messages as they arrive, replying to each one
//! roomsync listen --echo
//!
//! # Send a message
//! roomsync send '!room:example.org' "Hello, world!"
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod config;
mod store;

use commands::{listen, login, send};

/// Command line chat client built on roomsync.
#[derive(Parser, Debug)]
#[command(name = "roomsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for the config file and sync state
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file (default: <data-dir>/roomsync.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Log in with a password and save the access token
    Login {
        /// Homeserver base URL
        #[arg(long)]
        homeserver: String,

        /// User ID or localpart
        #[arg(long, short)]
        user: String,

        /// Password (will prompt if not provided)
        #[arg(long, short)]
        password: Option<String>,
    },

    /// Sync and print incoming messages and membership changes
    Listen {
        /// Reply to every message with a notice echoing it
        #[arg(long)]
        echo: bool,
    },

    /// Send a text message to a room
    Send {
        /// Room ID
        room_id: String,

        /// Message text
        message: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let data_dir = cli.data_dir.map_or_else(default_data_dir, Ok)?;
    tokio::fs::create_dir_all(&data_dir)
        .await
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;
    config::restrict_permissions(&data_dir, config::PRIVATE_DIR_MODE).await?;

    let config_path = cli
        .config
        .unwrap_or_else(|| config::default_config_path(&data_dir));

    match cli.command {
        Commands::Login {
            homeserver,
            user,
            password,
        } => {
            login::run(&config_path, &homeserver, &user, password).await?;
        }
        Commands::Listen { echo } => {
            listen::run(&data_dir, &config_path, echo).await?;
        }
        Commands::Send { room_id, message } => {
            send::run(&config_path, &room_id, &message).await?;
        }
    }

    Ok(())
}

/// Log to stderr, filtered by `RUST_LOG` (default: `info`).
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Get the default data directory for roomsync.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("org", "roomsync", "roomsync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
