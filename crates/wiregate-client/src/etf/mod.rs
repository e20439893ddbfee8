//! External Term Format codec
//!
//! The gateway speaks a compact recursive binary serialization. Only the
//! subset of tags the gateway actually emits is supported: atoms, small
//! integers, 32-bit integers, binaries, lists (nil-tail form) and maps.

mod decode;
mod encode;
mod term;

pub use decode::decode_document;
pub use encode::encode_document;
pub use term::Term;

use wiregate_common::SnowflakeParseError;

/// Wire tags for the supported term types
pub(crate) mod tag {
    /// Format version byte prefixing every document
    pub const VERSION: u8 = 131;
    /// 1-byte unsigned integer
    pub const SMALL_INT: u8 = 97;
    /// 4-byte big-endian signed integer
    pub const INT32: u8 = 98;
    /// Atom: 2-byte big-endian length + bytes
    pub const ATOM: u8 = 100;
    /// Empty list marker, also the list tail
    pub const NIL: u8 = 106;
    /// List: 4-byte big-endian count + children + nil tail
    pub const LIST: u8 = 108;
    /// Binary: 4-byte big-endian length + bytes
    pub const BINARY: u8 = 109;
    /// Map: 4-byte big-endian arity + alternating key/value children
    pub const MAP: u8 = 116;
}

/// Errors produced by the term codec
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EtfError {
    #[error("truncated buffer")]
    Truncated,

    #[error("bad version byte: {0}")]
    BadVersion(u8),

    #[error("unknown term tag: {0}")]
    UnknownTag(u8),

    #[error("trailing bytes after document")]
    TrailingBytes,

    #[error("integer value out of bounds")]
    OutOfBounds,

    #[error("list tail was not nil")]
    BadTail,

    #[error("map key was not an atom")]
    NonAtomKey,

    #[error("atom longer than 65535 bytes")]
    AtomTooLong,

    #[error("collection larger than u32 count")]
    CollectionTooLarge,

    #[error("expected {expected}, found {found}")]
    WrongType {
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid utf-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("invalid snowflake: {0}")]
    BadSnowflake(#[from] SnowflakeParseError),
}
