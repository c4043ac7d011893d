//! JSON format using `serde_json`.

use super::Format;
use crate::error::Result;

/// JSON format for headers and bodies.
pub struct Json;

impl Format for Json {
    fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
