//! Bot configuration structs
//!
//! Loads configuration from environment variables (with optional `.env`).

use serde::Deserialize;
use std::env;

/// Configuration for the gateway client process
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Application client ID (used in the add-to-guild URL)
    pub client_id: String,

    /// Bot authentication token (sent as `Authorization: Bot <token>`)
    pub bot_token: String,

    /// Base URL of the platform REST API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Client version string reported in identify properties
    #[serde(default = "default_version")]
    pub version: String,

    /// Number of concurrent dispatch workers
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,

    /// Command prefix used when a guild has no configured prefix
    #[serde(default = "default_command_prefix")]
    pub default_command_prefix: String,

    /// Shard assignment for this process
    #[serde(default)]
    pub shard: ShardConfig,

    /// Presence reported on identify
    #[serde(default)]
    pub presence: PresenceConfig,
}

/// Shard assignment (single-shard deployments leave this at default)
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ShardConfig {
    #[serde(default)]
    pub id: u32,
    #[serde(default = "default_shard_count")]
    pub count: u32,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            id: 0,
            count: default_shard_count(),
        }
    }
}

/// Presence reported on identify
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceConfig {
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub activity: Option<String>,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            status: default_status(),
            activity: None,
        }
    }
}

// Default value functions
fn default_api_url() -> String {
    "https://discordapp.com/api".to_string()
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_num_workers() -> usize {
    20
}

fn default_command_prefix() -> String {
    "!".to_string()
}

fn default_shard_count() -> u32 {
    1
}

fn default_status() -> String {
    "online".to_string()
}

impl BotConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Ok(Self {
            client_id: env::var("BOT_CLIENT_ID").map_err(|_| ConfigError::MissingVar("BOT_CLIENT_ID"))?,
            bot_token: env::var("BOT_TOKEN").map_err(|_| ConfigError::MissingVar("BOT_TOKEN"))?,
            api_url: env::var("BOT_API_URL").unwrap_or_else(|_| default_api_url()),
            version: env::var("BOT_VERSION").unwrap_or_else(|_| default_version()),
            num_workers: env::var("BOT_NUM_WORKERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_num_workers),
            default_command_prefix: env::var("BOT_COMMAND_PREFIX")
                .unwrap_or_else(|_| default_command_prefix()),
            shard: ShardConfig {
                id: env::var("BOT_SHARD_ID")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0),
                count: env::var("BOT_SHARD_COUNT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_shard_count),
            },
            presence: PresenceConfig {
                status: env::var("BOT_STATUS").unwrap_or_else(|_| default_status()),
                activity: env::var("BOT_ACTIVITY").ok(),
            },
        })
    }

    /// Load configuration from a file (TOML/YAML/JSON by extension),
    /// layered under environment variable overrides
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("BOT"))
            .build()
            .map_err(ConfigError::Load)?;

        settings.try_deserialize().map_err(ConfigError::Load)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}
