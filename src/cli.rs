//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::Config;

/// Default configuration file, read if present.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Parser, Debug)]
#[command(
    name = "ipbes-notifier",
    version,
    about = "Notify Telegram chats about new IPBES documents"
)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Create the database and apply migrations
    Init {
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
    },
    /// Add a topic to watch
    AddTopic {
        /// Unique topic name
        name: String,
        /// URL of the topic's document listing
        url: String,
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
    },
    /// List topics with subscriber and seen-document counts
    ListTopics {
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
    },
    /// Poll topics and serve the bot until interrupted
    Run {
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
        /// Seconds between poll ticks, fractions allowed (e.g. 0.5)
        #[arg(long, env = "POLL_INTERVAL")]
        poll_interval: Option<f64>,
        /// Telegram bot token
        #[arg(env = "TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
}

impl Commands {
    /// Apply command-line overrides on top of file and environment settings.
    pub fn apply_overrides(&self, config: &mut Config) {
        let database_url = match self {
            Commands::Init { database_url }
            | Commands::AddTopic { database_url, .. }
            | Commands::ListTopics { database_url }
            | Commands::Run { database_url, .. } => database_url,
        };
        if let Some(url) = database_url {
            config.database.url = url.clone();
        }

        if let Commands::Run {
            poll_interval,
            token,
            ..
        } = self
        {
            if let Some(secs) = poll_interval {
                config.poll.interval_secs = *secs;
            }
            if let Some(token) = token {
                config.telegram.token = token.clone();
            }
        }
    }
}
