//! Configuration loading

mod bot_config;

pub use bot_config::{BotConfig, ConfigError, PresenceConfig, ShardConfig};
