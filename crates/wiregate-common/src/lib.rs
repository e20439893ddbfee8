//! # wiregate-common
//!
//! Shared utilities for the gateway client: configuration, telemetry,
//! and the Snowflake identifier used by all gateway entities.

pub mod config;
pub mod snowflake;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use config::{BotConfig, ConfigError, PresenceConfig, ShardConfig};
pub use snowflake::{Snowflake, SnowflakeParseError};
pub use telemetry::{
    init_tracing, init_tracing_with_config, try_init_tracing, try_init_tracing_with_config,
    TracingConfig, TracingError,
};
