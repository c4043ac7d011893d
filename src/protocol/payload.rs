//! Argument and reply values carried through the serving pipeline.
//!
//! A [`Payload`] doubles as the target slot for body decoding: the variant
//! passed to [`CodecReader::read_body`](crate::codec::CodecReader::read_body)
//! selects the value domain and the codec overwrites it in place.

use std::fmt;

use bytes::Bytes;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Sentinel body sent with every error response.
pub const INVALID_BODY: Payload = Payload::Invalid;

/// A request argument or reply body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Payload {
    /// No value (nil/null on the wire).
    #[default]
    Unit,
    /// UTF-8 string.
    Text(String),
    /// Raw bytes.
    Binary(Bytes),
    /// Placeholder used when a real reply could not be produced.
    /// Encoded as an empty map.
    Invalid,
}

impl Payload {
    /// Empty text slot.
    pub fn text_slot() -> Self {
        Payload::Text(String::new())
    }

    /// Empty binary slot.
    pub fn binary_slot() -> Self {
        Payload::Binary(Bytes::new())
    }

    /// Borrow the text value, if this is a text payload.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Check if this is the sentinel invalid body.
    #[inline]
    pub fn is_invalid(&self) -> bool {
        matches!(self, Payload::Invalid)
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_string())
    }
}

impl From<Bytes> for Payload {
    fn from(value: Bytes) -> Self {
        Payload::Binary(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Payload::Binary(Bytes::from(value))
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Payload::Unit => serializer.serialize_unit(),
            Payload::Text(s) => serializer.serialize_str(s),
            Payload::Binary(b) => serde_bytes::Bytes::new(b).serialize(serializer),
            Payload::Invalid => serializer.serialize_map(Some(0))?.end(),
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Unit => f.write_str("()"),
            Payload::Text(s) => write!(f, "{:?}", s),
            Payload::Binary(b) => write!(f, "<{} bytes>", b.len()),
            Payload::Invalid => f.write_str("<invalid>"),
        }
    }
}
