//! Recursive term tree
//!
//! A `Term` is one node of the decoded document. The representation is a
//! tagged union: scalar variants carry their value, collection variants
//! carry children, and nothing else can be expressed.

use super::EtfError;
use std::collections::HashMap;
use wiregate_common::Snowflake;

/// One node of the recursive term tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    /// Symbolic constant (also used for `nil`, `true`, `false`)
    Atom(String),
    /// 1-byte unsigned integer
    SmallInt(u8),
    /// 32-bit signed integer
    Int32(i32),
    /// Raw bytes; the gateway uses binaries for strings
    Binary(Vec<u8>),
    /// Ordered sequence of terms
    List(Vec<Term>),
    /// Ordered key/value pairs; keys must be atoms
    Map(Vec<(Term, Term)>),
}

impl Term {
    // === Constructors ===

    /// Create an atom term
    pub fn atom(name: impl Into<String>) -> Self {
        Self::Atom(name.into())
    }

    /// Create the `nil` atom
    #[must_use]
    pub fn nil() -> Self {
        Self::Atom("nil".to_string())
    }

    /// Create a boolean as the `true`/`false` atom
    #[must_use]
    pub fn boolean(value: bool) -> Self {
        Self::Atom(if value { "true" } else { "false" }.to_string())
    }

    /// Create a string as a binary term
    pub fn string(value: impl Into<String>) -> Self {
        Self::Binary(value.into().into_bytes())
    }

    /// Create an integer term, choosing the narrowest encoding
    ///
    /// Values in `0..=255` become a small int, values fitting `i32` a
    /// 32-bit int; anything else is an encode-time bounds error.
    pub fn int(value: i64) -> Result<Self, EtfError> {
        if (0..=255).contains(&value) {
            Ok(Self::SmallInt(value as u8))
        } else {
            i32::try_from(value)
                .map(Self::Int32)
                .map_err(|_| EtfError::OutOfBounds)
        }
    }

    /// Create a map from string keys, preserving insertion order
    pub fn map_from(pairs: Vec<(&str, Term)>) -> Self {
        Self::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (Self::atom(k), v))
                .collect(),
        )
    }

    // === Inspection ===

    /// Name of the variant, for error messages
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Atom(_) => "atom",
            Self::SmallInt(_) => "small int",
            Self::Int32(_) => "int32",
            Self::Binary(_) => "binary",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    /// Check for the `nil` atom
    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Atom(a) if a == "nil")
    }

    fn wrong_type(&self, expected: &'static str) -> EtfError {
        EtfError::WrongType {
            expected,
            found: self.kind(),
        }
    }

    // === Accessors ===

    /// View as an atom name
    pub fn as_atom(&self) -> Result<&str, EtfError> {
        match self {
            Self::Atom(a) => Ok(a),
            other => Err(other.wrong_type("atom")),
        }
    }

    /// View as a UTF-8 string (binary or atom contents)
    pub fn as_str(&self) -> Result<&str, EtfError> {
        match self {
            Self::Atom(a) => Ok(a),
            Self::Binary(b) => {
                std::str::from_utf8(b).map_err(|_| EtfError::InvalidUtf8("binary"))
            }
            other => Err(other.wrong_type("binary")),
        }
    }

    /// View as a 1-byte integer
    pub fn as_u8(&self) -> Result<u8, EtfError> {
        match self {
            Self::SmallInt(v) => Ok(*v),
            other => Err(other.wrong_type("small int")),
        }
    }

    /// View as a 32-bit integer
    pub fn as_i32(&self) -> Result<i32, EtfError> {
        match self {
            Self::Int32(v) => Ok(*v),
            other => Err(other.wrong_type("int32")),
        }
    }

    /// View as an integer of either width
    pub fn as_int(&self) -> Result<i64, EtfError> {
        match self {
            Self::SmallInt(v) => Ok(i64::from(*v)),
            Self::Int32(v) => Ok(i64::from(*v)),
            other => Err(other.wrong_type("integer")),
        }
    }

    /// View as a boolean (`true`/`false` atom)
    pub fn as_bool(&self) -> Result<bool, EtfError> {
        match self.as_atom()? {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(self.wrong_type("boolean atom")),
        }
    }

    /// View as the list children
    pub fn as_list(&self) -> Result<&[Term], EtfError> {
        match self {
            Self::List(items) => Ok(items),
            other => Err(other.wrong_type("list")),
        }
    }

    /// Parse as a Snowflake from the decimal string the wire carries
    pub fn as_snowflake(&self) -> Result<Snowflake, EtfError> {
        Ok(Snowflake::parse(self.as_str()?)?)
    }

    /// Clone into a string-keyed map, enforcing atom keys
    pub fn to_map(&self) -> Result<HashMap<String, Term>, EtfError> {
        match self {
            Self::Map(pairs) => pairs
                .iter()
                .map(|(k, v)| Ok((k.as_atom()?.to_string(), v.clone())))
                .collect::<Result<HashMap<_, _>, _>>()
                .map_err(|_: EtfError| EtfError::NonAtomKey),
            other => Err(other.wrong_type("map")),
        }
    }

    /// Consume into a string-keyed map, enforcing atom keys
    pub fn into_map(self) -> Result<HashMap<String, Term>, EtfError> {
        match self {
            Self::Map(pairs) => pairs
                .into_iter()
                .map(|(k, v)| match k {
                    Self::Atom(name) => Ok((name, v)),
                    _ => Err(EtfError::NonAtomKey),
                })
                .collect(),
            other => Err(other.wrong_type("map")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_picks_narrowest_width() {
        assert_eq!(Term::int(0).unwrap(), Term::SmallInt(0));
        assert_eq!(Term::int(255).unwrap(), Term::SmallInt(255));
        assert_eq!(Term::int(256).unwrap(), Term::Int32(256));
        assert_eq!(Term::int(-1).unwrap(), Term::Int32(-1));
        assert_eq!(Term::int(i64::from(i32::MAX)).unwrap(), Term::Int32(i32::MAX));
    }

    #[test]
    fn test_int_out_of_bounds() {
        assert_eq!(Term::int(i64::from(i32::MAX) + 1), Err(EtfError::OutOfBounds));
        assert_eq!(Term::int(i64::MIN), Err(EtfError::OutOfBounds));
    }

    #[test]
    fn test_nil_and_bool_atoms() {
        assert!(Term::nil().is_nil());
        assert!(!Term::boolean(true).is_nil());
        assert!(Term::boolean(true).as_bool().unwrap());
        assert!(!Term::boolean(false).as_bool().unwrap());
        assert!(Term::atom("maybe").as_bool().is_err());
    }

    #[test]
    fn test_as_str_accepts_binary_and_atom() {
        assert_eq!(Term::string("hello").as_str().unwrap(), "hello");
        assert_eq!(Term::atom("world").as_str().unwrap(), "world");
        assert!(Term::SmallInt(3).as_str().is_err());
    }

    #[test]
    fn test_as_str_rejects_invalid_utf8() {
        let term = Term::Binary(vec![0xff, 0xfe]);
        assert_eq!(term.as_str(), Err(EtfError::InvalidUtf8("binary")));
    }

    #[test]
    fn test_as_snowflake() {
        let term = Term::string("175928847299117063");
        assert_eq!(
            term.as_snowflake().unwrap(),
            Snowflake::new(175_928_847_299_117_063)
        );
        assert!(Term::string("not-a-number").as_snowflake().is_err());
    }

    #[test]
    fn test_into_map_enforces_atom_keys() {
        let good = Term::map_from(vec![("a", Term::SmallInt(1))]);
        let map = good.into_map().unwrap();
        assert_eq!(map["a"], Term::SmallInt(1));

        let bad = Term::Map(vec![(Term::string("a"), Term::SmallInt(1))]);
        assert_eq!(bad.into_map(), Err(EtfError::NonAtomKey));
    }

    #[test]
    fn test_wrong_type_reports_kinds() {
        let err = Term::List(vec![]).as_atom().unwrap_err();
        assert_eq!(
            err,
            EtfError::WrongType {
                expected: "atom",
                found: "list"
            }
        );
    }
}
