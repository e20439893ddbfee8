//! Message dispatch
//!
//! Frames arrive on pool workers, get decoded, and are routed first by
//! opcode and then, for Dispatch envelopes, by event name. Handler
//! failures are logged and dropped; nothing in here may take the
//! connection down.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use wiregate_common::Snowflake;

use crate::collab::{CollabError, Collaborators};
use crate::etf::{EtfError, Term};
use crate::heartbeat::{HeartbeatCommand, SequenceTracker};
use crate::protocol::{
    IdentifyPayload, IdentifyProperties, OpCode, Payload, ProtocolError, ResumePayload,
    StatusUpdate,
};
use crate::ratelimit::{Limiter, RateLimitError};
use crate::session::{Session, SessionError};
use crate::transport::{FrameHandler, Outbound, TransportError};

/// Everything the handshake needs to introduce this client
#[derive(Debug, Clone)]
pub struct Identity {
    /// Bot authentication token
    pub token: String,
    /// Shard assignment: (id, count)
    pub shard: (u32, u32),
    /// Presence reported at identify time
    pub presence: StatusUpdate,
    /// Command prefix used when a guild has no override
    pub default_prefix: String,
}

/// Errors from one handler step
///
/// These abort the step for the offending frame only; the dispatch loop
/// itself keeps running.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Etf(#[from] EtfError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    #[error("envelope field missing: {field}")]
    MissingField { field: &'static str },

    #[error("collaborator error: {0}")]
    Collab(CollabError),
}

/// Opcode/event router sitting behind the transport worker pool
pub struct MessageDispatcher {
    session: Arc<Session>,
    sequence: Arc<SequenceTracker>,
    heartbeats: mpsc::Sender<HeartbeatCommand>,
    limiter: Arc<Limiter>,
    shutdown: CancellationToken,
    identity: Identity,
    collaborators: Collaborators,
}

impl MessageDispatcher {
    pub fn new(
        session: Arc<Session>,
        sequence: Arc<SequenceTracker>,
        heartbeats: mpsc::Sender<HeartbeatCommand>,
        limiter: Arc<Limiter>,
        shutdown: CancellationToken,
        identity: Identity,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            session,
            sequence,
            heartbeats,
            limiter,
            shutdown,
            identity,
            collaborators,
        }
    }

    async fn dispatch(&self, payload: Payload, outbound: &Outbound) -> Result<(), DispatchError> {
        match payload.opcode {
            OpCode::Hello => self.handle_hello(&payload, outbound).await,
            OpCode::Heartbeat => {
                // Server asked for one outside the normal cadence.
                if self.heartbeats.send(HeartbeatCommand::SendNow).await.is_err() {
                    warn!("heartbeat controller gone, request dropped");
                }
                Ok(())
            }
            OpCode::HeartbeatAck => {
                trace!("heartbeat acknowledged");
                Ok(())
            }
            OpCode::InvalidSession => {
                warn!("server invalidated the session; reconnect policy is the owner's");
                Ok(())
            }
            OpCode::Reconnect => {
                warn!("server requested a reconnect; reconnect policy is the owner's");
                Ok(())
            }
            OpCode::Dispatch => self.handle_dispatch(&payload, outbound).await,
            other => {
                debug!(opcode = %other, "unhandled opcode, dropping");
                Ok(())
            }
        }
    }

    /// Hello: learn the heartbeat cadence, then resume or identify
    async fn handle_hello(
        &self,
        payload: &Payload,
        outbound: &Outbound,
    ) -> Result<(), DispatchError> {
        let interval = payload
            .field("heartbeat_interval")
            .ok_or(DispatchError::MissingField {
                field: "heartbeat_interval",
            })?
            .as_int()?;
        let interval = u64::try_from(interval).map_err(|_| EtfError::OutOfBounds)?;

        debug!(interval_ms = interval, "hello received");
        if self
            .heartbeats
            .send(HeartbeatCommand::Reconfigure(Duration::from_millis(interval)))
            .await
            .is_err()
        {
            warn!("heartbeat controller gone, interval dropped");
        }

        let session_id = self.session.id();
        let handshake = if session_id.is_empty() {
            debug!("identifying as a new session");
            IdentifyPayload {
                token: self.identity.token.clone(),
                properties: IdentifyProperties::default(),
                compress: false,
                large_threshold: 250,
                shard: self.identity.shard,
                presence: self.identity.presence.clone(),
            }
            .to_payload()?
        } else {
            debug!(%session_id, "resuming existing session");
            ResumePayload {
                token: self.identity.token.clone(),
                session_id,
                seq: self.sequence.last_or_zero() as i32,
            }
            .to_payload()
        };

        self.limiter.wait(&self.shutdown).await?;
        outbound.send_binary(handshake.to_bytes()?).await?;
        Ok(())
    }

    /// Dispatch: record the sequence, then route by event name
    async fn handle_dispatch(
        &self,
        payload: &Payload,
        outbound: &Outbound,
    ) -> Result<(), DispatchError> {
        // Every Dispatch envelope advances the sequence before any
        // event-specific work can fail.
        if let Some(seq) = payload.seq {
            self.sequence.update(i64::from(seq));
        }

        let fields = payload
            .data
            .as_map()
            .ok_or(DispatchError::MissingField { field: "d" })?;

        match payload.event_name.as_deref() {
            Some("READY") => {
                self.session.update_from_ready(fields)?;
                debug!(session_id = %self.session.id(), "session ready");
                Ok(())
            }
            Some("GUILD_CREATE" | "GUILD_UPDATE") => {
                self.session.upsert_guild_fields(fields)?;
                Ok(())
            }
            Some("CHANNEL_CREATE") => {
                self.session.upsert_channel_fields(fields)?;
                Ok(())
            }
            Some("MESSAGE_CREATE") => self.handle_message(fields, outbound).await,
            Some(event) => {
                debug!(event, "ignoring unhandled event");
                Ok(())
            }
            None => Err(DispatchError::MissingField { field: "t" }),
        }
    }

    /// MESSAGE_CREATE: run prefixed commands through the collaborators
    async fn handle_message(
        &self,
        fields: &std::collections::HashMap<String, Term>,
        _outbound: &Outbound,
    ) -> Result<(), DispatchError> {
        // Only default-type messages carry user chatter.
        if let Some(kind) = fields.get("type") {
            if kind.as_int()? != 0 {
                trace!("skipping non-default message type");
                return Ok(());
            }
        }

        let content = match fields.get("content") {
            Some(content) => content.as_str()?.trim().to_string(),
            None => return Ok(()),
        };
        if content.is_empty() {
            return Ok(());
        }

        let channel_id = fields
            .get("channel_id")
            .ok_or(DispatchError::MissingField {
                field: "channel_id",
            })?
            .as_snowflake()?;
        let guild_id = match fields.get("guild_id").filter(|term| !term.is_nil()) {
            Some(term) => Some(term.as_snowflake()?),
            None => None,
        };
        let author_id = fields
            .get("author")
            .ok_or(DispatchError::MissingField { field: "author" })?
            .to_map()?
            .get("id")
            .ok_or(DispatchError::MissingField { field: "author.id" })?
            .as_snowflake()?;

        let prefix = self.command_prefix(guild_id);
        let Some(line) = content.strip_prefix(&prefix) else {
            return Ok(());
        };

        let reply = match self
            .collaborators
            .commands
            .handle(author_id, guild_id, line)
            .await
        {
            Ok(reply) => reply,
            Err(error) => {
                // The author still gets told something went wrong.
                debug!(%error, "command handler failed");
                format!("could not handle command: {error}")
            }
        };
        if reply.is_empty() {
            return Ok(());
        }

        self.limiter.wait(&self.shutdown).await?;
        self.collaborators
            .rest
            .send_channel_message(channel_id, &reply)
            .await
            .map_err(DispatchError::Collab)?;
        Ok(())
    }

    fn command_prefix(&self, guild_id: Option<Snowflake>) -> String {
        guild_id
            .and_then(|id| self.collaborators.settings.guild_settings(id).command_prefix)
            .unwrap_or_else(|| self.identity.default_prefix.clone())
    }
}

#[async_trait]
impl FrameHandler for MessageDispatcher {
    async fn handle_frame(&self, frame: Vec<u8>, outbound: &Outbound) {
        let payload = match Payload::from_bytes(&frame) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(%error, frame_len = frame.len(), "dropping undecodable frame");
                return;
            }
        };

        trace!(opcode = %payload.opcode, event = ?payload.event_name, "frame decoded");
        if let Err(error) = self.dispatch(payload, outbound).await {
            warn!(%error, "handler step failed, frame dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::collab::{CommandHandler, GatewayInfo, GuildSettings, RestClient, SettingsStore};
    use crate::protocol::PayloadData;

    use super::*;

    struct StubRest {
        sent: Mutex<Vec<(Snowflake, String)>>,
    }

    #[async_trait]
    impl RestClient for StubRest {
        async fn get_gateway_url(&self) -> Result<GatewayInfo, CollabError> {
            Ok(GatewayInfo {
                url: "wss://gateway.test".to_string(),
                shards: 1,
            })
        }

        async fn send_channel_message(
            &self,
            channel_id: Snowflake,
            content: &str,
        ) -> Result<(), CollabError> {
            self.sent
                .lock()
                .unwrap()
                .push((channel_id, content.to_string()));
            Ok(())
        }
    }

    struct EchoCommands;

    #[async_trait]
    impl CommandHandler for EchoCommands {
        async fn handle(
            &self,
            _author_id: Snowflake,
            _guild_id: Option<Snowflake>,
            text: &str,
        ) -> Result<String, CollabError> {
            if text == "boom" {
                return Err("kaboom".into());
            }
            Ok(format!("echo: {text}"))
        }
    }

    struct PrefixSettings {
        prefix: Option<String>,
    }

    impl SettingsStore for PrefixSettings {
        fn guild_settings(&self, _guild_id: Snowflake) -> GuildSettings {
            GuildSettings {
                command_prefix: self.prefix.clone(),
            }
        }
    }

    struct Fixture {
        dispatcher: MessageDispatcher,
        session: Arc<Session>,
        sequence: Arc<SequenceTracker>,
        heartbeats: mpsc::Receiver<HeartbeatCommand>,
        rest: Arc<StubRest>,
        outbound: Outbound,
        outbound_rx: mpsc::Receiver<tokio_tungstenite::tungstenite::protocol::Message>,
    }

    fn fixture(guild_prefix: Option<&str>) -> Fixture {
        let session = Arc::new(Session::new());
        let sequence = Arc::new(SequenceTracker::new());
        let (hb_tx, hb_rx) = mpsc::channel(8);
        let (out_tx, out_rx) = mpsc::channel(8);
        let rest = Arc::new(StubRest {
            sent: Mutex::new(Vec::new()),
        });

        let dispatcher = MessageDispatcher::new(
            Arc::clone(&session),
            Arc::clone(&sequence),
            hb_tx,
            Arc::new(Limiter::message()),
            CancellationToken::new(),
            Identity {
                token: "tok-123".to_string(),
                shard: (0, 1),
                presence: StatusUpdate::default(),
                default_prefix: "!".to_string(),
            },
            Collaborators {
                rest: Arc::clone(&rest) as Arc<dyn RestClient>,
                commands: Arc::new(EchoCommands),
                settings: Arc::new(PrefixSettings {
                    prefix: guild_prefix.map(str::to_string),
                }),
            },
        );

        Fixture {
            dispatcher,
            session,
            sequence,
            heartbeats: hb_rx,
            rest,
            outbound: Outbound::new(out_tx),
            outbound_rx: out_rx,
        }
    }

    fn hello_frame(interval_ms: i32) -> Vec<u8> {
        let mut data = HashMap::new();
        data.insert("heartbeat_interval".to_string(), Term::Int32(interval_ms));
        let payload = Payload {
            opcode: OpCode::Hello,
            seq: None,
            event_name: None,
            data: PayloadData::Map(data),
        };
        payload.to_bytes().unwrap()
    }

    fn dispatch_frame(event: &str, seq: i32, data: HashMap<String, Term>) -> Vec<u8> {
        let payload = Payload {
            opcode: OpCode::Dispatch,
            seq: Some(seq),
            event_name: Some(event.to_string()),
            data: PayloadData::Map(data),
        };
        payload.to_bytes().unwrap()
    }

    fn message_create(content: &str) -> HashMap<String, Term> {
        let mut data = HashMap::new();
        data.insert("type".to_string(), Term::SmallInt(0));
        data.insert("content".to_string(), Term::string(content));
        data.insert("channel_id".to_string(), Term::string("777"));
        data.insert("guild_id".to_string(), Term::string("1234"));
        data.insert(
            "author".to_string(),
            Term::map_from(vec![("id", Term::string("99"))]),
        );
        data
    }

    #[tokio::test]
    async fn test_hello_reconfigures_heartbeat_and_identifies() {
        let mut fx = fixture(None);

        fx.dispatcher
            .handle_frame(hello_frame(41_250), &fx.outbound)
            .await;

        assert_eq!(
            fx.heartbeats.recv().await,
            Some(HeartbeatCommand::Reconfigure(Duration::from_millis(41_250)))
        );

        let message = fx.outbound_rx.recv().await.unwrap();
        let frame = match message {
            tokio_tungstenite::tungstenite::protocol::Message::Binary(frame) => frame,
            other => panic!("expected binary frame, got {other:?}"),
        };
        let sent = Payload::from_bytes(&frame).unwrap();
        assert_eq!(sent.opcode, OpCode::Identify);
        assert_eq!(
            sent.field("token").unwrap().as_str().unwrap(),
            "tok-123"
        );
    }

    #[tokio::test]
    async fn test_hello_resumes_when_session_exists() {
        let mut fx = fixture(None);
        let ready = Term::map_from(vec![
            ("session_id", Term::string("s-9")),
            ("user", Term::map_from(vec![("id", Term::string("99"))])),
            ("private_channels", Term::List(vec![])),
            ("guilds", Term::List(vec![])),
        ])
        .to_map()
        .unwrap();
        fx.session.update_from_ready(&ready).unwrap();
        fx.sequence.update(31);

        fx.dispatcher
            .handle_frame(hello_frame(10_000), &fx.outbound)
            .await;

        let _ = fx.heartbeats.recv().await;
        let message = fx.outbound_rx.recv().await.unwrap();
        let frame = match message {
            tokio_tungstenite::tungstenite::protocol::Message::Binary(frame) => frame,
            other => panic!("expected binary frame, got {other:?}"),
        };
        let sent = Payload::from_bytes(&frame).unwrap();
        assert_eq!(sent.opcode, OpCode::Resume);
        assert_eq!(sent.field("session_id").unwrap().as_str().unwrap(), "s-9");
        assert_eq!(sent.field("seq").unwrap().as_i32().unwrap(), 31);
    }

    #[tokio::test]
    async fn test_server_heartbeat_request_forwards_send_now() {
        let mut fx = fixture(None);
        let frame = Payload::new(OpCode::Heartbeat).to_bytes().unwrap();

        fx.dispatcher.handle_frame(frame, &fx.outbound).await;

        assert_eq!(fx.heartbeats.recv().await, Some(HeartbeatCommand::SendNow));
    }

    #[tokio::test]
    async fn test_ready_updates_session_and_sequence() {
        let fx = fixture(None);
        let mut data = HashMap::new();
        data.insert("session_id".to_string(), Term::string("s-1"));
        data.insert(
            "user".to_string(),
            Term::map_from(vec![("id", Term::string("99"))]),
        );
        data.insert("private_channels".to_string(), Term::List(vec![]));
        data.insert("guilds".to_string(), Term::List(vec![]));

        fx.dispatcher
            .handle_frame(dispatch_frame("READY", 1, data), &fx.outbound)
            .await;

        assert_eq!(fx.session.id(), "s-1");
        assert_eq!(fx.sequence.last(), Some(1));
    }

    #[tokio::test]
    async fn test_guild_update_merges_into_created_guild() {
        let fx = fixture(None);

        let mut create = HashMap::new();
        create.insert("id".to_string(), Term::string("1234"));
        create.insert("name".to_string(), Term::string("Test Guild"));
        create.insert("unavailable".to_string(), Term::boolean(true));
        fx.dispatcher
            .handle_frame(dispatch_frame("GUILD_CREATE", 2, create), &fx.outbound)
            .await;

        let mut update = HashMap::new();
        update.insert("id".to_string(), Term::string("1234"));
        update.insert("unavailable".to_string(), Term::boolean(false));
        fx.dispatcher
            .handle_frame(dispatch_frame("GUILD_UPDATE", 3, update), &fx.outbound)
            .await;

        let guild = fx.session.guild(Snowflake::new(1234)).unwrap();
        assert!(guild.is_available());
        assert_eq!(guild.name(), "Test Guild");
        assert_eq!(fx.sequence.last(), Some(3));
    }

    #[tokio::test]
    async fn test_message_with_default_prefix_replies() {
        let fx = fixture(None);

        fx.dispatcher
            .handle_frame(
                dispatch_frame("MESSAGE_CREATE", 4, message_create("!status")),
                &fx.outbound,
            )
            .await;

        let sent = fx.rest.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], (Snowflake::new(777), "echo: status".to_string()));
    }

    #[tokio::test]
    async fn test_message_respects_guild_prefix_override() {
        let fx = fixture(Some("?"));

        fx.dispatcher
            .handle_frame(
                dispatch_frame("MESSAGE_CREATE", 5, message_create("!status")),
                &fx.outbound,
            )
            .await;
        fx.dispatcher
            .handle_frame(
                dispatch_frame("MESSAGE_CREATE", 6, message_create("?status")),
                &fx.outbound,
            )
            .await;

        let sent = fx.rest.sent.lock().unwrap();
        // Only the override-prefixed message matched.
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "echo: status");
    }

    #[tokio::test]
    async fn test_message_handler_error_sends_inline_reply() {
        let fx = fixture(None);

        fx.dispatcher
            .handle_frame(
                dispatch_frame("MESSAGE_CREATE", 7, message_create("!boom")),
                &fx.outbound,
            )
            .await;

        let sent = fx.rest.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("kaboom"));
    }

    #[tokio::test]
    async fn test_non_default_message_type_is_filtered() {
        let fx = fixture(None);

        let mut data = message_create("!status");
        data.insert("type".to_string(), Term::SmallInt(6));
        fx.dispatcher
            .handle_frame(dispatch_frame("MESSAGE_CREATE", 8, data), &fx.outbound)
            .await;

        assert!(fx.rest.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_event_and_bad_frame_are_dropped() {
        let fx = fixture(None);

        fx.dispatcher
            .handle_frame(
                dispatch_frame("PRESENCE_UPDATE", 9, HashMap::new()),
                &fx.outbound,
            )
            .await;
        fx.dispatcher
            .handle_frame(vec![1, 2, 3], &fx.outbound)
            .await;

        // Sequence still advanced for the well-formed envelope.
        assert_eq!(fx.sequence.last(), Some(9));
        assert!(fx.rest.sent.lock().unwrap().is_empty());
    }
}
