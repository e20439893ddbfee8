//! Gateway envelope format
//!
//! Every frame exchanged with the gateway carries exactly one envelope:
//! op code, optional sequence number, optional event name, and a data
//! field that is either a key/value map or an opaque scalar term.

use super::OpCode;
use crate::etf::{decode_document, encode_document, EtfError, Term};
use std::collections::HashMap;

/// Data field of an envelope
///
/// Event envelopes carry a map; a few control envelopes (heartbeat acks)
/// carry a bare scalar instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadData {
    /// Decoded key/value map
    Map(HashMap<String, Term>),
    /// Opaque non-map term
    Scalar(Term),
}

impl PayloadData {
    /// Create an empty map
    #[must_use]
    pub fn empty() -> Self {
        Self::Map(HashMap::new())
    }

    /// View the map contents, if this is a map
    #[must_use]
    pub fn as_map(&self) -> Option<&HashMap<String, Term>> {
        match self {
            Self::Map(map) => Some(map),
            Self::Scalar(_) => None,
        }
    }
}

/// One gateway message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// Operation code
    pub opcode: OpCode,

    /// Sequence number (meaningful only for Dispatch envelopes)
    pub seq: Option<i32>,

    /// Event name (meaningful only for Dispatch envelopes)
    pub event_name: Option<String>,

    /// Event data
    pub data: PayloadData,
}

impl Payload {
    /// Create an envelope with an empty data map and no sequence
    #[must_use]
    pub fn new(opcode: OpCode) -> Self {
        Self {
            opcode,
            seq: None,
            event_name: None,
            data: PayloadData::empty(),
        }
    }

    /// Look up a data field by key (None for scalar data)
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Term> {
        self.data.as_map().and_then(|map| map.get(key))
    }

    // === Wire codec ===

    /// Encode into document bytes
    ///
    /// The outer map carries `d` and `op`, plus `s` and `t` only when
    /// present. Pure and deterministic.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        let data = match &self.data {
            PayloadData::Map(map) => {
                // Sorted for a deterministic encoding of the data map
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                Term::Map(
                    keys.into_iter()
                        .map(|k| (Term::atom(k.clone()), map[k].clone()))
                        .collect(),
                )
            }
            PayloadData::Scalar(term) => term.clone(),
        };

        let mut outer = vec![
            (Term::atom("d"), data),
            (Term::atom("op"), Term::SmallInt(self.opcode.as_u8())),
        ];
        if let Some(seq) = self.seq {
            outer.push((Term::atom("s"), Term::Int32(seq)));
        }
        if let Some(event_name) = &self.event_name {
            outer.push((Term::atom("t"), Term::atom(event_name.clone())));
        }

        Ok(encode_document(&Term::Map(outer))?)
    }

    /// Decode from document bytes
    ///
    /// Validates the version byte, requires the outer term to be a map,
    /// and rejects unexpected, duplicated, or mistyped top-level keys.
    /// Partial state is never exposed.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, ProtocolError> {
        let pairs = match decode_document(raw)? {
            Term::Map(pairs) => pairs,
            _ => return Err(ProtocolError::NotAMap),
        };

        let mut opcode = None;
        let mut seq = None;
        let mut event_name = None;
        let mut data = PayloadData::empty();

        let mut seen = std::collections::HashSet::new();
        for (key, value) in pairs {
            let Term::Atom(key) = key else {
                return Err(ProtocolError::Etf(EtfError::NonAtomKey));
            };
            if !seen.insert(key.clone()) {
                return Err(ProtocolError::DuplicateField(key));
            }
            match key.as_str() {
                "op" => {
                    let raw_op = value
                        .as_u8()
                        .map_err(|_| ProtocolError::BadField { field: "op" })?;
                    opcode =
                        Some(OpCode::from_u8(raw_op).ok_or(ProtocolError::UnknownOpcode(raw_op))?);
                }
                "s" => {
                    if value.is_nil() {
                        continue;
                    }
                    seq = Some(
                        value
                            .as_i32()
                            .map_err(|_| ProtocolError::BadField { field: "s" })?,
                    );
                }
                "t" => {
                    if value.is_nil() {
                        continue;
                    }
                    let name = value
                        .as_atom()
                        .map_err(|_| ProtocolError::BadField { field: "t" })?;
                    event_name = Some(name.to_string());
                }
                "d" => {
                    data = match value {
                        Term::Map(_) => PayloadData::Map(value.into_map()?),
                        Term::List(_) => return Err(ProtocolError::BadField { field: "d" }),
                        scalar => PayloadData::Scalar(scalar),
                    };
                }
                other => return Err(ProtocolError::UnexpectedField(other.to_string())),
            }
        }

        Ok(Self {
            opcode: opcode.ok_or(ProtocolError::MissingField { field: "op" })?,
            seq,
            event_name,
            data,
        })
    }
}

impl std::fmt::Display for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Payload(op={}", self.opcode)?;
        if let Some(t) = &self.event_name {
            write!(f, ", t={t}")?;
        }
        if let Some(s) = self.seq {
            write!(f, ", s={s}")?;
        }
        write!(f, ")")
    }
}

/// Errors from the envelope codec
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error(transparent)]
    Etf(#[from] EtfError),

    #[error("envelope is not a map")]
    NotAMap,

    #[error("unexpected envelope field: {0}")]
    UnexpectedField(String),

    #[error("duplicate envelope field: {0}")]
    DuplicateField(String),

    #[error("envelope field '{field}' has the wrong type")]
    BadField { field: &'static str },

    #[error("envelope field '{field}' is missing")]
    MissingField { field: &'static str },

    #[error("unknown opcode: {0}")]
    UnknownOpcode(u8),
}
