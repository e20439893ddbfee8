//! Guild entity

use std::collections::HashMap;

use wiregate_common::Snowflake;

use super::{id_of, non_nil, required, Channel, SessionError, User};
use crate::etf::Term;

/// Partially populated guild record
///
/// The gateway sends guilds incrementally: GUILD_CREATE carries the full
/// picture, later GUILD_UPDATE envelopes only the changed fields. Merges
/// therefore only touch fields the incoming map actually carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guild {
    id: Snowflake,
    name: String,
    owner_id: Option<Snowflake>,
    application_id: Option<Snowflake>,
    available: bool,
    members: Vec<GuildMember>,
    channels: Vec<Channel>,
}

impl Guild {
    /// Inflate from a guild term map; `id` is required
    pub fn from_term(term: &Term) -> Result<Self, SessionError> {
        Self::from_fields(&term.to_map()?)
    }

    /// Inflate from an already-unwrapped field map
    pub fn from_fields(fields: &HashMap<String, Term>) -> Result<Self, SessionError> {
        let mut guild = Self {
            id: id_of(fields)?,
            name: String::new(),
            owner_id: None,
            application_id: None,
            available: false,
            members: Vec::new(),
            channels: Vec::new(),
        };
        guild.merge(fields)?;
        Ok(guild)
    }

    /// Fold newer fields in; absent or nil fields keep their value
    pub fn merge(&mut self, fields: &HashMap<String, Term>) -> Result<(), SessionError> {
        if let Some(owner_id) = non_nil(fields, "owner_id") {
            self.owner_id = Some(owner_id.as_snowflake()?);
        }
        if let Some(application_id) = non_nil(fields, "application_id") {
            self.application_id = Some(application_id.as_snowflake()?);
        }
        if let Some(name) = non_nil(fields, "name") {
            self.name = name.as_str()?.to_string();
        }
        if let Some(unavailable) = non_nil(fields, "unavailable") {
            self.available = !unavailable.as_bool()?;
        }
        if let Some(members) = non_nil(fields, "members") {
            self.members = members
                .as_list()?
                .iter()
                .map(GuildMember::from_term)
                .collect::<Result<_, _>>()?;
        }
        if let Some(channels) = non_nil(fields, "channels") {
            self.channels = channels
                .as_list()?
                .iter()
                .map(Channel::from_term)
                .collect::<Result<_, _>>()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn id(&self) -> Snowflake {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn owner_id(&self) -> Option<Snowflake> {
        self.owner_id
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.available
    }

    #[must_use]
    pub fn members(&self) -> &[GuildMember] {
        &self.members
    }

    #[must_use]
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }
}

/// Membership record tying a user to a guild
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildMember {
    id: Snowflake,
    user: User,
}

impl GuildMember {
    /// Inflate from a member term map; the nested `user` is required
    pub fn from_term(term: &Term) -> Result<Self, SessionError> {
        let fields = term.to_map()?;
        let user = User::from_term(required(&fields, "user")?)?;
        Ok(Self {
            id: user.id(),
            user,
        })
    }

    #[must_use]
    pub fn id(&self) -> Snowflake {
        self.id
    }

    #[must_use]
    pub fn user(&self) -> &User {
        &self.user
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_guild() -> Term {
        Term::map_from(vec![
            ("id", Term::string("1234")),
            ("name", Term::string("Test Guild")),
            ("owner_id", Term::string("5678")),
            ("unavailable", Term::boolean(false)),
            (
                "channels",
                Term::List(vec![Term::map_from(vec![
                    ("id", Term::string("42")),
                    ("name", Term::string("general")),
                    ("type", Term::SmallInt(0)),
                ])]),
            ),
            (
                "members",
                Term::List(vec![Term::map_from(vec![(
                    "user",
                    Term::map_from(vec![
                        ("id", Term::string("5678")),
                        ("username", Term::string("owner")),
                    ]),
                )])]),
            ),
        ])
    }

    #[test]
    fn test_from_term_inflates_full_guild() {
        let guild = Guild::from_term(&full_guild()).unwrap();
        assert_eq!(guild.id(), Snowflake::new(1234));
        assert_eq!(guild.name(), "Test Guild");
        assert_eq!(guild.owner_id(), Some(Snowflake::new(5678)));
        assert!(guild.is_available());
        assert_eq!(guild.channels().len(), 1);
        assert_eq!(guild.members().len(), 1);
        assert_eq!(guild.members()[0].user().username(), "owner");
    }

    #[test]
    fn test_partial_merge_preserves_existing_fields() {
        let mut guild = Guild::from_term(&full_guild()).unwrap();

        let partial = Term::map_from(vec![
            ("id", Term::string("1234")),
            ("unavailable", Term::boolean(true)),
        ]);
        guild.merge(&partial.to_map().unwrap()).unwrap();

        assert!(!guild.is_available());
        // Fields the update omitted stay as-is.
        assert_eq!(guild.name(), "Test Guild");
        assert_eq!(guild.owner_id(), Some(Snowflake::new(5678)));
        assert_eq!(guild.channels().len(), 1);
    }

    #[test]
    fn test_bad_availability_atom_is_an_error() {
        let term = Term::map_from(vec![
            ("id", Term::string("1234")),
            ("unavailable", Term::atom("maybe")),
        ]);
        assert!(Guild::from_term(&term).is_err());
    }

    #[test]
    fn test_member_requires_nested_user() {
        let term = Term::map_from(vec![("nick", Term::string("x"))]);
        assert!(matches!(
            GuildMember::from_term(&term),
            Err(SessionError::MissingField { field: "user" })
        ));
    }
}
