//! Term tree encoder
//!
//! Builds a document bottom-up: version byte, then the recursive term.
//! All length fields are bounds-checked; an out-of-range value is a hard
//! error, never a truncation.

use super::{tag, EtfError, Term};
use bytes::{BufMut, BytesMut};

/// Encode a complete document (version byte + term)
pub fn encode_document(term: &Term) -> Result<Vec<u8>, EtfError> {
    let mut buf = BytesMut::with_capacity(64);
    buf.put_u8(tag::VERSION);
    encode_term(&mut buf, term)?;
    Ok(buf.to_vec())
}

fn encode_term(buf: &mut BytesMut, term: &Term) -> Result<(), EtfError> {
    match term {
        Term::Atom(name) => {
            let len = u16::try_from(name.len()).map_err(|_| EtfError::AtomTooLong)?;
            buf.put_u8(tag::ATOM);
            buf.put_u16(len);
            buf.put_slice(name.as_bytes());
        }
        Term::SmallInt(value) => {
            buf.put_u8(tag::SMALL_INT);
            buf.put_u8(*value);
        }
        Term::Int32(value) => {
            buf.put_u8(tag::INT32);
            buf.put_i32(*value);
        }
        Term::Binary(bytes) => {
            let len = u32::try_from(bytes.len()).map_err(|_| EtfError::CollectionTooLarge)?;
            buf.put_u8(tag::BINARY);
            buf.put_u32(len);
            buf.put_slice(bytes);
        }
        Term::List(items) => {
            let count = u32::try_from(items.len()).map_err(|_| EtfError::CollectionTooLarge)?;
            buf.put_u8(tag::LIST);
            buf.put_u32(count);
            for item in items {
                encode_term(buf, item)?;
            }
            buf.put_u8(tag::NIL);
        }
        Term::Map(pairs) => {
            let arity = u32::try_from(pairs.len()).map_err(|_| EtfError::CollectionTooLarge)?;
            buf.put_u8(tag::MAP);
            buf.put_u32(arity);
            for (key, value) in pairs {
                if !matches!(key, Term::Atom(_)) {
                    return Err(EtfError::NonAtomKey);
                }
                encode_term(buf, key)?;
                encode_term(buf, value)?;
            }
        }
    }
    Ok(())
}
