//! User entity

use std::collections::HashMap;

use wiregate_common::Snowflake;

use super::{id_of, non_nil, SessionError};
use crate::etf::Term;

/// Partially populated user record
///
/// Only the fields the gateway has actually sent are meaningful; merges
/// never blank a field the wire omitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    id: Snowflake,
    username: String,
    discriminator: String,
    bot: bool,
}

impl User {
    /// Inflate from a user term map; `id` is required
    pub fn from_term(term: &Term) -> Result<Self, SessionError> {
        let fields = term.to_map()?;
        let mut user = Self {
            id: id_of(&fields)?,
            username: String::new(),
            discriminator: String::new(),
            bot: false,
        };
        user.merge(&fields)?;
        Ok(user)
    }

    /// Fold newer fields in; absent or nil fields keep their value
    pub fn merge(&mut self, fields: &HashMap<String, Term>) -> Result<(), SessionError> {
        if let Some(username) = non_nil(fields, "username") {
            self.username = username.as_str()?.to_string();
        }
        if let Some(discriminator) = non_nil(fields, "discriminator") {
            self.discriminator = discriminator.as_str()?.to_string();
        }
        if let Some(bot) = non_nil(fields, "bot") {
            self.bot = bot.as_bool()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn id(&self) -> Snowflake {
        self.id
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }

    #[must_use]
    pub fn is_bot(&self) -> bool {
        self.bot
    }
}
