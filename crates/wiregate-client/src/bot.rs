//! Bot orchestrator
//!
//! Wires configuration, collaborators, transport, dispatcher, and the
//! heartbeat controller into one connectable unit. Reconnecting is the
//! owner's policy: when `run` returns, the connection is fully torn down
//! and a fresh `Bot` can be built to try again.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use wiregate_common::BotConfig;

use crate::collab::{CollabError, Collaborators};
use crate::dispatch::{Identity, MessageDispatcher};
use crate::heartbeat::{HeartbeatState, Heartbeater, SequenceTracker};
use crate::protocol::{Activity, StatusUpdate, PROTOCOL_VERSION};
use crate::ratelimit::{Limiter, RateLimitError};
use crate::session::Session;
use crate::transport::{TransportError, WsClient, WsConfig};

/// Top-level bot failures
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    #[error("gateway lookup failed: {0}")]
    GatewayLookup(CollabError),

    #[error("bot is already running")]
    AlreadyRunning,
}

/// A configured gateway bot, ready to connect and run
pub struct Bot {
    config: BotConfig,
    collaborators: Collaborators,
    session: Arc<Session>,
    sequence: Arc<SequenceTracker>,
    transport: WsClient,
    connect_limiter: Limiter,
    heartbeater: parking_lot::Mutex<Option<Heartbeater>>,
    heartbeat_state: watch::Receiver<HeartbeatState>,
    shutdown: CancellationToken,
}

impl Bot {
    #[must_use]
    pub fn new(config: BotConfig, collaborators: Collaborators) -> Self {
        let shutdown = CancellationToken::new();
        let transport = WsClient::new(
            WsConfig {
                num_workers: config.num_workers,
                ..WsConfig::default()
            },
            shutdown.clone(),
        );

        let session = Arc::new(Session::new());
        let sequence = Arc::new(SequenceTracker::new());
        let message_limiter = Arc::new(Limiter::message());

        let (heartbeat_tx, heartbeat_rx) = mpsc::channel(8);
        let (heartbeater, heartbeat_state) = Heartbeater::new(
            heartbeat_rx,
            Arc::clone(&sequence),
            Arc::clone(&message_limiter),
            transport.outbound(),
        );

        let presence = StatusUpdate {
            status: config.presence.status.clone(),
            activity: config.presence.activity.clone().map(|name| Activity {
                name,
                kind: 0,
            }),
            ..StatusUpdate::default()
        };
        let dispatcher = MessageDispatcher::new(
            Arc::clone(&session),
            Arc::clone(&sequence),
            heartbeat_tx,
            message_limiter,
            shutdown.clone(),
            Identity {
                token: config.bot_token.clone(),
                shard: (config.shard.id, config.shard.count),
                presence,
                default_prefix: config.default_command_prefix.clone(),
            },
            collaborators.clone(),
        );
        transport.set_handler(Arc::new(dispatcher));

        Self {
            config,
            collaborators,
            session,
            sequence,
            transport,
            connect_limiter: Limiter::connect(),
            heartbeater: parking_lot::Mutex::new(Some(heartbeater)),
            heartbeat_state,
            shutdown,
        }
    }

    /// Resolve the gateway url and dial it
    ///
    /// Rate limited to one attempt per window; a failed dial surfaces the
    /// error and leaves retry timing to the owner.
    pub async fn connect(&self) -> Result<(), BotError> {
        self.connect_limiter.wait(&self.shutdown).await?;

        let info = self
            .collaborators
            .rest
            .get_gateway_url()
            .await
            .map_err(BotError::GatewayLookup)?;
        debug!(url = %info.url, shards = info.shards, "acquired gateway url");

        let url = format!(
            "{}?v={PROTOCOL_VERSION}&encoding=etf",
            info.url.trim_end_matches('/')
        );
        info!(%url, "connecting to gateway");

        self.transport.set_gateway(url);
        self.transport.connect(&self.config.bot_token).await?;
        Ok(())
    }

    /// Drive the connection until shutdown
    ///
    /// Runs the heartbeat controller alongside the transport and returns
    /// only when both have fully unwound.
    pub async fn run(&self) -> Result<(), BotError> {
        let heartbeater = self
            .heartbeater
            .lock()
            .take()
            .ok_or(BotError::AlreadyRunning)?;
        let heartbeat = tokio::spawn(heartbeater.run(self.shutdown.clone()));

        let result = self.transport.run().await;

        // Transport exit implies cancellation; the controller follows.
        self.shutdown.cancel();
        let _ = heartbeat.await;

        result.map_err(BotError::from)
    }

    /// Begin graceful shutdown; safe to call repeatedly
    pub fn disconnect(&self) {
        info!("disconnect requested");
        self.shutdown.cancel();
    }

    /// The lock-guarded session state
    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Last sequence seen on any Dispatch envelope
    #[must_use]
    pub fn sequence(&self) -> &Arc<SequenceTracker> {
        &self.sequence
    }

    /// Observe the heartbeat controller lifecycle
    #[must_use]
    pub fn heartbeat_state(&self) -> watch::Receiver<HeartbeatState> {
        self.heartbeat_state.clone()
    }

    /// Token other tasks can watch to follow this bot's shutdown
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("client_id", &self.config.client_id)
            .field("num_workers", &self.config.num_workers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use wiregate_common::Snowflake;

    use crate::collab::{
        CommandHandler, GatewayInfo, GuildSettings, RestClient, SettingsStore,
    };

    use super::*;

    struct NullRest;

    #[async_trait]
    impl RestClient for NullRest {
        async fn get_gateway_url(&self) -> Result<GatewayInfo, CollabError> {
            Ok(GatewayInfo {
                url: "wss://gateway.test/".to_string(),
                shards: 1,
            })
        }

        async fn send_channel_message(
            &self,
            _channel_id: Snowflake,
            _content: &str,
        ) -> Result<(), CollabError> {
            Ok(())
        }
    }

    struct NullCommands;

    #[async_trait]
    impl CommandHandler for NullCommands {
        async fn handle(
            &self,
            _author_id: Snowflake,
            _guild_id: Option<Snowflake>,
            _text: &str,
        ) -> Result<String, CollabError> {
            Ok(String::new())
        }
    }

    struct NullSettings;

    impl SettingsStore for NullSettings {
        fn guild_settings(&self, _guild_id: Snowflake) -> GuildSettings {
            GuildSettings::default()
        }
    }

    fn test_bot() -> Bot {
        let config = BotConfig {
            client_id: "cid".to_string(),
            bot_token: "tok".to_string(),
            api_url: "https://discordapp.com/api".to_string(),
            version: "test".to_string(),
            num_workers: 4,
            default_command_prefix: "!".to_string(),
            shard: wiregate_common::ShardConfig::default(),
            presence: wiregate_common::PresenceConfig::default(),
        };
        Bot::new(
            config,
            Collaborators {
                rest: Arc::new(NullRest),
                commands: Arc::new(NullCommands),
                settings: Arc::new(NullSettings),
            },
        )
    }

    #[test]
    fn test_new_bot_starts_with_empty_session() {
        let bot = test_bot();
        assert_eq!(bot.session().id(), "");
        assert_eq!(bot.sequence().last(), None);
        assert_eq!(*bot.heartbeat_state().borrow(), HeartbeatState::Uninitialized);
    }

    #[tokio::test]
    async fn test_run_without_connect_is_not_connected() {
        let bot = test_bot();
        assert!(matches!(
            bot.run().await,
            Err(BotError::Transport(TransportError::NotConnected))
        ));
    }

    #[tokio::test]
    async fn test_run_twice_reports_already_running() {
        let bot = test_bot();
        let _ = bot.run().await;
        assert!(matches!(bot.run().await, Err(BotError::AlreadyRunning)));
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let bot = test_bot();
        bot.disconnect();
        bot.disconnect();
        assert!(bot.shutdown_token().is_cancelled());
    }
}
