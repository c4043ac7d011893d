//! MsgPack format using `rmp-serde`.
//!
//! Structs are written with `to_vec_named`, so headers travel as maps keyed by
//! field name rather than positional arrays.

use super::Format;
use crate::error::Result;

/// MessagePack format for headers and bodies.
pub struct MsgPack;

impl MsgPack {
    /// Encode a value to MsgPack bytes.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

impl Format for MsgPack {
    fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        MsgPack::encode(value)
    }

    fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        MsgPack::decode(bytes)
    }
}
