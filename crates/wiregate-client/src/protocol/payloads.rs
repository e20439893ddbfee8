//! Outbound payload builders
//!
//! Constructors for the envelopes the client sends: heartbeat, identify,
//! resume, and status update.

use super::{OpCode, Payload, PayloadData, ProtocolError};
use crate::etf::Term;
use std::collections::HashMap;

/// Gateway protocol version requested on connect
pub const PROTOCOL_VERSION: u32 = 6;

impl Payload {
    /// Build a heartbeat envelope carrying the last-known sequence
    #[must_use]
    pub fn heartbeat(seq: i32) -> Self {
        Self {
            opcode: OpCode::Heartbeat,
            seq: Some(seq),
            event_name: None,
            data: PayloadData::empty(),
        }
    }
}

/// Identify handshake payload (op 2)
#[derive(Debug, Clone)]
pub struct IdentifyPayload {
    /// Bot authentication token
    pub token: String,
    /// Platform/client metadata
    pub properties: IdentifyProperties,
    /// Whether payload compression is requested (always false here)
    pub compress: bool,
    /// Member count at which the gateway stops sending offline members
    pub large_threshold: u8,
    /// Shard assignment: (id, count)
    pub shard: (u32, u32),
    /// Presence to report immediately
    pub presence: StatusUpdate,
}

/// Client metadata reported in the identify payload
#[derive(Debug, Clone)]
pub struct IdentifyProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
    pub referrer: String,
    pub referring_domain: String,
}

impl Default for IdentifyProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: "wiregate".to_string(),
            device: "wiregate".to_string(),
            referrer: String::new(),
            referring_domain: String::new(),
        }
    }
}

impl IdentifyProperties {
    fn to_term(&self) -> Term {
        Term::map_from(vec![
            ("$os", Term::string(self.os.clone())),
            ("$browser", Term::string(self.browser.clone())),
            ("$device", Term::string(self.device.clone())),
            ("$referrer", Term::string(self.referrer.clone())),
            (
                "$referring_domain",
                Term::string(self.referring_domain.clone()),
            ),
        ])
    }
}

/// Presence carried by identify and status-update envelopes
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    /// Status string: online, idle, dnd, invisible, offline
    pub status: String,
    /// Activity name shown under the client, if any
    pub activity: Option<Activity>,
    /// Milliseconds since the client went idle
    pub since: Option<i64>,
    /// Whether the client is AFK
    pub afk: bool,
}

impl Default for StatusUpdate {
    fn default() -> Self {
        Self {
            status: "online".to_string(),
            activity: None,
            since: None,
            afk: false,
        }
    }
}

/// An activity entry in a presence
#[derive(Debug, Clone)]
pub struct Activity {
    pub name: String,
    /// Activity type: 0 = playing, 1 = streaming, 2 = listening
    pub kind: u8,
}

impl StatusUpdate {
    fn to_term(&self) -> Result<Term, ProtocolError> {
        let game = match &self.activity {
            Some(activity) => Term::map_from(vec![
                ("name", Term::string(activity.name.clone())),
                ("type", Term::SmallInt(activity.kind)),
            ]),
            None => Term::nil(),
        };

        let since = match self.since {
            Some(ms) => Term::int(ms).map_err(ProtocolError::Etf)?,
            None => Term::nil(),
        };

        Ok(Term::map_from(vec![
            ("game", game),
            ("status", Term::string(self.status.clone())),
            ("since", since),
            ("afk", Term::boolean(self.afk)),
        ]))
    }

    /// Build a status-update envelope (op 3)
    pub fn to_payload(&self) -> Result<Payload, ProtocolError> {
        let term = self.to_term()?;
        let data = term.into_map().map_err(ProtocolError::Etf)?;
        Ok(Payload {
            opcode: OpCode::StatusUpdate,
            seq: None,
            event_name: None,
            data: PayloadData::Map(data),
        })
    }
}

impl IdentifyPayload {
    /// Build the identify envelope
    pub fn to_payload(&self) -> Result<Payload, ProtocolError> {
        let mut data = HashMap::new();
        data.insert("token".to_string(), Term::string(self.token.clone()));
        data.insert("properties".to_string(), self.properties.to_term());
        data.insert("compress".to_string(), Term::boolean(self.compress));
        data.insert(
            "large_threshold".to_string(),
            Term::SmallInt(self.large_threshold),
        );
        data.insert(
            "shard".to_string(),
            Term::List(vec![
                Term::int(i64::from(self.shard.0)).map_err(ProtocolError::Etf)?,
                Term::int(i64::from(self.shard.1)).map_err(ProtocolError::Etf)?,
            ]),
        );
        data.insert("presence".to_string(), self.presence.to_term()?);

        Ok(Payload {
            opcode: OpCode::Identify,
            seq: None,
            event_name: None,
            data: PayloadData::Map(data),
        })
    }
}

/// Resume handshake payload (op 6)
#[derive(Debug, Clone)]
pub struct ResumePayload {
    /// Bot authentication token
    pub token: String,
    /// Session ID saved from the prior Ready event
    pub session_id: String,
    /// Last received sequence number
    pub seq: i32,
}

impl ResumePayload {
    /// Build the resume envelope
    #[must_use]
    pub fn to_payload(&self) -> Payload {
        let mut data = HashMap::new();
        data.insert("token".to_string(), Term::string(self.token.clone()));
        data.insert(
            "session_id".to_string(),
            Term::string(self.session_id.clone()),
        );
        data.insert("seq".to_string(), Term::Int32(self.seq));

        Payload {
            opcode: OpCode::Resume,
            seq: None,
            event_name: None,
            data: PayloadData::Map(data),
        }
    }
}
