//! Channel entity

use std::collections::HashMap;

use wiregate_common::Snowflake;

use super::{id_of, non_nil, SessionError};
use crate::etf::{EtfError, Term};

/// Partially populated channel record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    id: Snowflake,
    name: String,
    kind: u8,
}

impl Channel {
    /// Inflate from a channel term map; `id` is required
    pub fn from_term(term: &Term) -> Result<Self, SessionError> {
        Self::from_fields(&term.to_map()?)
    }

    /// Inflate from an already-unwrapped field map
    pub fn from_fields(fields: &HashMap<String, Term>) -> Result<Self, SessionError> {
        let mut channel = Self {
            id: id_of(fields)?,
            name: String::new(),
            kind: 0,
        };
        channel.merge(fields)?;
        Ok(channel)
    }

    /// Fold newer fields in; absent or nil fields keep their value
    pub fn merge(&mut self, fields: &HashMap<String, Term>) -> Result<(), SessionError> {
        if let Some(name) = non_nil(fields, "name") {
            self.name = name.as_str()?.to_string();
        }
        if let Some(kind) = non_nil(fields, "type") {
            self.kind = u8::try_from(kind.as_int()?).map_err(|_| EtfError::OutOfBounds)?;
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

    /// Wire channel type (0 = guild text, 1 = dm, ...)
    #[must_use]
    pub fn kind(&self) -> u8 {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_term_inflates_fields() {
        let term = Term::map_from(vec![
            ("id", Term::string("2345")),
            ("name", Term::string("general")),
            ("type", Term::SmallInt(0)),
        ]);
        let channel = Channel::from_term(&term).unwrap();
        assert_eq!(channel.id(), Snowflake::new(2345));
        assert_eq!(channel.name(), "general");
        assert_eq!(channel.kind(), 0);
    }

    #[test]
    fn test_merge_rejects_out_of_range_type() {
        let term = Term::map_from(vec![
            ("id", Term::string("2345")),
            ("type", Term::Int32(4096)),
        ]);
        assert!(matches!(
            Channel::from_term(&term),
            Err(SessionError::BadData(EtfError::OutOfBounds))
        ));
    }
}
