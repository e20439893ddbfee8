//! # wiregate-client
//!
//! Persistent gateway client for a chat platform's real-time socket API.
//! The gateway speaks a compact Erlang-term binary encoding over a
//! websocket; this crate owns the codec, the envelope protocol, the
//! connection lifecycle, heartbeating, and the in-memory session state.
//!
//! The embedding application supplies the REST surface, command
//! execution, and settings storage through the traits in [`collab`],
//! then drives a [`Bot`]:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use wiregate_client::{Bot, Collaborators};
//! # async fn example(collaborators: Collaborators) -> Result<(), Box<dyn std::error::Error>> {
//! let config = wiregate_common::BotConfig::from_env()?;
//! let bot = Bot::new(config, collaborators);
//!
//! bot.connect().await?;
//! bot.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod bot;
pub mod collab;
pub mod dispatch;
pub mod etf;
pub mod heartbeat;
pub mod protocol;
pub mod ratelimit;
pub mod session;
pub mod transport;

// Re-export the main entry points at crate root
pub use bot::{Bot, BotError};
pub use collab::{
    CollabError, Collaborators, CommandHandler, GatewayInfo, GuildSettings, RestClient,
    SettingsStore,
};
pub use dispatch::{DispatchError, Identity, MessageDispatcher};
pub use etf::{EtfError, Term};
pub use heartbeat::{HeartbeatCommand, HeartbeatState, SequenceTracker};
pub use protocol::{OpCode, Payload, PayloadData, ProtocolError};
pub use ratelimit::{Limiter, RateLimitError};
pub use session::{Channel, Guild, GuildMember, Session, SessionError, User};
pub use transport::{FrameHandler, Outbound, TransportError, WsClient, WsConfig};
