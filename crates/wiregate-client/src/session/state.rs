//! Session state
//!
//! The mutable picture of the connection: session id, own user, known
//! guilds and private channels. Every mutation either commits completely
//! or leaves the state untouched.

use std::collections::HashMap;

use wiregate_common::Snowflake;

use super::{id_of, required, Channel, Guild, SessionError, User};
use crate::etf::Term;

#[derive(Debug, Default)]
pub(super) struct SessionState {
    pub(super) session_id: String,
    pub(super) user: Option<User>,
    pub(super) guilds: HashMap<Snowflake, Guild>,
    pub(super) private_channels: HashMap<Snowflake, Channel>,
}

impl SessionState {
    /// Replace the whole state from a READY data map
    ///
    /// All four fields are required. Everything is inflated into locals
    /// first and committed only once nothing can fail, so a malformed
    /// READY leaves the previous state intact.
    pub(super) fn update_from_ready(
        &mut self,
        fields: &HashMap<String, Term>,
    ) -> Result<(), SessionError> {
        let session_id = required(fields, "session_id")?.as_str()?.to_string();
        let user = User::from_term(required(fields, "user")?)?;

        let mut private_channels = HashMap::new();
        for term in required(fields, "private_channels")?.as_list()? {
            let channel = Channel::from_term(term)?;
            private_channels.insert(channel.id(), channel);
        }

        let mut guilds = HashMap::new();
        for term in required(fields, "guilds")?.as_list()? {
            let guild = Guild::from_term(term)?;
            guilds.insert(guild.id(), guild);
        }

        self.session_id = session_id;
        self.user = Some(user);
        self.private_channels = private_channels;
        self.guilds = guilds;
        Ok(())
    }

    /// Merge a guild map in, inserting when the id is new
    pub(super) fn upsert_guild(&mut self, term: &Term) -> Result<(), SessionError> {
        self.upsert_guild_fields(&term.to_map()?)
    }

    /// Merge an already-unwrapped guild field map in
    pub(super) fn upsert_guild_fields(
        &mut self,
        fields: &HashMap<String, Term>,
    ) -> Result<(), SessionError> {
        let id = id_of(fields)?;

        match self.guilds.get_mut(&id) {
            Some(existing) => {
                // Merge into a copy so a malformed update cannot leave a
                // half-applied guild behind.
                let mut updated = existing.clone();
                updated.merge(fields)?;
                *existing = updated;
            }
            None => {
                self.guilds.insert(id, Guild::from_fields(fields)?);
            }
        }
        Ok(())
    }

    /// Merge a private channel map in, inserting when the id is new
    pub(super) fn upsert_channel(&mut self, term: &Term) -> Result<(), SessionError> {
        self.upsert_channel_fields(&term.to_map()?)
    }

    /// Merge an already-unwrapped channel field map in
    pub(super) fn upsert_channel_fields(
        &mut self,
        fields: &HashMap<String, Term>,
    ) -> Result<(), SessionError> {
        let id = id_of(fields)?;

        match self.private_channels.get_mut(&id) {
            Some(existing) => {
                let mut updated = existing.clone();
                updated.merge(fields)?;
                *existing = updated;
            }
            None => {
                self.private_channels.insert(id, Channel::from_fields(fields)?);
            }
        }
        Ok(())
    }
}
