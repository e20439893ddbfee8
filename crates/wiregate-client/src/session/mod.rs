//! Session state
//!
//! Entities here are inflated from decoded term maps and kept behind one
//! lock. Workers race on Dispatch envelopes, so every read-modify-write
//! holds the write guard for its full extent.

mod channel;
mod guild;
mod state;
mod user;

pub use channel::Channel;
pub use guild::{Guild, GuildMember};
pub use user::User;

use std::collections::HashMap;

use parking_lot::RwLock;
use wiregate_common::Snowflake;

use crate::etf::{EtfError, Term};
use state::SessionState;

/// Session update failures
///
/// A failed update is surfaced to the caller and never leaves the state
/// half-applied.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("malformed session data: {0}")]
    BadData(#[from] EtfError),
}

/// Lock-guarded connection state
#[derive(Debug, Default)]
pub struct Session {
    state: RwLock<SessionState>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session id, empty before READY
    #[must_use]
    pub fn id(&self) -> String {
        self.state.read().session_id.clone()
    }

    /// Own user, `None` before READY
    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.state.read().user.clone()
    }

    /// Snapshot of one guild
    #[must_use]
    pub fn guild(&self, id: Snowflake) -> Option<Guild> {
        self.state.read().guilds.get(&id).cloned()
    }

    /// Snapshot of one private channel
    #[must_use]
    pub fn private_channel(&self, id: Snowflake) -> Option<Channel> {
        self.state.read().private_channels.get(&id).cloned()
    }

    /// Replace the whole state from a READY data map
    pub fn update_from_ready(
        &self,
        fields: &HashMap<String, Term>,
    ) -> Result<(), SessionError> {
        self.state.write().update_from_ready(fields)
    }

    /// Merge a guild term in, inserting when the id is new
    pub fn upsert_guild(&self, term: &Term) -> Result<(), SessionError> {
        self.state.write().upsert_guild(term)
    }

    /// Merge an already-unwrapped guild field map in
    pub fn upsert_guild_fields(
        &self,
        fields: &HashMap<String, Term>,
    ) -> Result<(), SessionError> {
        self.state.write().upsert_guild_fields(fields)
    }

    /// Merge a private channel term in, inserting when the id is new
    pub fn upsert_channel(&self, term: &Term) -> Result<(), SessionError> {
        self.state.write().upsert_channel(term)
    }

    /// Merge an already-unwrapped channel field map in
    pub fn upsert_channel_fields(
        &self,
        fields: &HashMap<String, Term>,
    ) -> Result<(), SessionError> {
        self.state.write().upsert_channel_fields(fields)
    }
}

// Shared inflation helpers for the entity modules.

fn required<'a>(
    fields: &'a HashMap<String, Term>,
    field: &'static str,
) -> Result<&'a Term, SessionError> {
    fields.get(field).ok_or(SessionError::MissingField { field })
}

fn non_nil<'a>(fields: &'a HashMap<String, Term>, key: &str) -> Option<&'a Term> {
    fields.get(key).filter(|term| !term.is_nil())
}

fn id_of(fields: &HashMap<String, Term>) -> Result<Snowflake, SessionError> {
    Ok(required(fields, "id")?.as_snowflake()?)
}
