//! Collaborator interfaces
//!
//! The gateway client does not own the REST surface, command parsing, or
//! per-guild settings storage; it talks to them through these traits.
//! Implementations live with the embedding application.

use std::sync::Arc;

use async_trait::async_trait;
use wiregate_common::Snowflake;

/// Boxed error from a collaborator implementation
pub type CollabError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Gateway connection info resolved through the REST API
#[derive(Debug, Clone)]
pub struct GatewayInfo {
    /// Websocket url to dial (before query parameters)
    pub url: String,
    /// Recommended shard count
    pub shards: u32,
}

/// Minimal REST surface the gateway client needs
#[async_trait]
pub trait RestClient: Send + Sync {
    /// Resolve the websocket url for this bot
    async fn get_gateway_url(&self) -> Result<GatewayInfo, CollabError>;

    /// Post a message to a channel
    async fn send_channel_message(
        &self,
        channel_id: Snowflake,
        content: &str,
    ) -> Result<(), CollabError>;
}

/// Command execution behind the prefix match
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle one command line, returning the reply text
    async fn handle(
        &self,
        author_id: Snowflake,
        guild_id: Option<Snowflake>,
        text: &str,
    ) -> Result<String, CollabError>;
}

/// Per-guild configuration
#[derive(Debug, Clone, Default)]
pub struct GuildSettings {
    /// Command prefix override; `None` falls back to the configured default
    pub command_prefix: Option<String>,
}

/// Lookup for per-guild configuration
pub trait SettingsStore: Send + Sync {
    fn guild_settings(&self, guild_id: Snowflake) -> GuildSettings;
}

/// The full collaborator set wired into the dispatcher
#[derive(Clone)]
pub struct Collaborators {
    pub rest: Arc<dyn RestClient>,
    pub commands: Arc<dyn CommandHandler>,
    pub settings: Arc<dyn SettingsStore>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish()
    }
}
