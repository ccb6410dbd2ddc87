use std::fmt;

/// A tagged value exchanged between sessions and containers.
///
/// Mirrors the `TioData` variant used throughout the wire layer: every field
/// (key, value, metadata) carried by an event or a record is one of these.
#[derive(Clone, Debug, PartialEq)]
pub enum TioData {
    Null,
    Int(i64),
    String(Vec<u8>),
    Double(f64),
}

impl TioData {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, TioData::Null)
    }

    /// Short wire type tag: `int`, `string` or `double`. Absent values have no
    /// tag and are never framed.
    pub fn type_tag(&self) -> Option<&'static str> {
        match self {
            TioData::Null => None,
            TioData::Int(_) => Some("int"),
            TioData::String(_) => Some("string"),
            TioData::Double(_) => Some("double"),
        }
    }

    /// `key.as_int()` — used by the slice rewrite rule to recover the index a
    /// `set`/`insert`/`delete` event refers to. Returns `None` for anything
    /// that isn't an integer key.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            TioData::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Byte length of the printable form, as emitted on the wire.
    pub fn printable_len(&self) -> usize {
        self.printable().len()
    }

    /// The printable (text-wire) representation of this value.
    pub fn printable(&self) -> Vec<u8> {
        match self {
            TioData::Null => Vec::new(),
            TioData::Int(n) => n.to_string().into_bytes(),
            TioData::String(bytes) => bytes.clone(),
            TioData::Double(d) => format!("{d}").into_bytes(),
        }
    }
}

impl fmt::Display for TioData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TioData::Null => Ok(()),
            TioData::Int(n) => write!(f, "{n}"),
            TioData::String(bytes) => write!(f, "{}", String::from_utf8_lossy(bytes)),
            TioData::Double(d) => write!(f, "{d}"),
        }
    }
}

impl From<i64> for TioData {
    fn from(v: i64) -> Self {
        TioData::Int(v)
    }
}

impl From<&str> for TioData {
    fn from(v: &str) -> Self {
        TioData::String(v.as_bytes().to_vec())
    }
}

impl From<String> for TioData {
    fn from(v: String) -> Self {
        TioData::String(v.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_round_trips_through_printable() {
        let d = TioData::Int(-42);
        assert_eq!(d.printable(), b"-42");
        assert_eq!(d.type_tag(), Some("int"));
        assert_eq!(d.as_int(), Some(-42));
    }

    #[test]
    fn null_has_no_tag_and_empty_printable() {
        let d = TioData::Null;
        assert!(d.is_null());
        assert_eq!(d.type_tag(), None);
        assert_eq!(d.printable_len(), 0);
    }

    #[test]
    fn string_as_int_is_none() {
        assert_eq!(TioData::from("abc").as_int(), None);
    }
}
