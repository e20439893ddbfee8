//! Gateway envelope protocol
//!
//! Op codes, the envelope format, and outbound payload builders.

mod opcodes;
mod payload;
mod payloads;

pub use opcodes::OpCode;
pub use payload::{Payload, PayloadData, ProtocolError};
pub use payloads::{
    Activity, IdentifyPayload, IdentifyProperties, ResumePayload, StatusUpdate, PROTOCOL_VERSION,
};
