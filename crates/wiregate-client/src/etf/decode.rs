//! Term tree decoder
//!
//! Parses a complete document: version byte, then one recursive term.
//! Partial state is never exposed; any truncation or unknown tag fails
//! the whole decode.

use super::{tag, EtfError, Term};

/// Decode a complete document (version byte + term)
///
/// The document must be consumed exactly; trailing bytes are an error.
pub fn decode_document(raw: &[u8]) -> Result<Term, EtfError> {
    let mut cursor = Cursor { buf: raw, pos: 0 };
    let version = cursor.take_u8()?;
    if version != tag::VERSION {
        return Err(EtfError::BadVersion(version));
    }

    let term = decode_term(&mut cursor)?;
    if cursor.pos != raw.len() {
        return Err(EtfError::TrailingBytes);
    }
    Ok(term)
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], EtfError> {
        let end = self.pos.checked_add(n).ok_or(EtfError::Truncated)?;
        if end > self.buf.len() {
            return Err(EtfError::Truncated);
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_u8(&mut self) -> Result<u8, EtfError> {
        Ok(self.take(1)?[0])
    }

    fn take_u16(&mut self) -> Result<u16, EtfError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn take_u32(&mut self) -> Result<u32, EtfError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn take_i32(&mut self) -> Result<i32, EtfError> {
        let bytes = self.take(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

fn decode_term(cursor: &mut Cursor<'_>) -> Result<Term, EtfError> {
    let code = cursor.take_u8()?;
    match code {
        tag::SMALL_INT => Ok(Term::SmallInt(cursor.take_u8()?)),
        tag::INT32 => Ok(Term::Int32(cursor.take_i32()?)),
        tag::ATOM => {
            let len = cursor.take_u16()? as usize;
            let bytes = cursor.take(len)?;
            let name = std::str::from_utf8(bytes).map_err(|_| EtfError::InvalidUtf8("atom"))?;
            Ok(Term::Atom(name.to_string()))
        }
        tag::BINARY => {
            let len = cursor.take_u32()? as usize;
            Ok(Term::Binary(cursor.take(len)?.to_vec()))
        }
        tag::NIL => Ok(Term::List(Vec::new())),
        tag::LIST => {
            let count = cursor.take_u32()? as usize;
            let mut items = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                items.push(decode_term(cursor)?);
            }
            // Only the simple nil-tail form is supported
            if cursor.take_u8()? != tag::NIL {
                return Err(EtfError::BadTail);
            }
            Ok(Term::List(items))
        }
        tag::MAP => {
            let arity = cursor.take_u32()? as usize;
            let mut pairs = Vec::with_capacity(arity.min(1024));
            for _ in 0..arity {
                let key = decode_term(cursor)?;
                if !matches!(key, Term::Atom(_)) {
                    return Err(EtfError::NonAtomKey);
                }
                let value = decode_term(cursor)?;
                pairs.push((key, value));
            }
            Ok(Term::Map(pairs))
        }
        other => Err(EtfError::UnknownTag(other)),
    }
}
