//! Codec module - pluggable wire formats bound to one connection.
//!
//! A [`Codec`] wraps a single stream and is split into two halves:
//!
//! - [`CodecReader`] - `read_header` / `read_body`, driven by the one serve loop
//! - [`CodecWriter`] - `write` / `close`, shared by request tasks behind a mutex
//!
//! Constructors are registered by identifier in a [`CodecRegistry`] which the
//! server receives at construction time.
//!
//! # Example
//!
//! ```
//! use tinyrpc::codec::{CodecRegistry, JSON_TYPE, MSGPACK_TYPE};
//!
//! let registry = CodecRegistry::default();
//! assert!(registry.contains(MSGPACK_TYPE));
//! assert!(registry.contains(JSON_TYPE));
//! assert!(!registry.contains("application/gob"));
//! ```

mod framed;
mod json;
mod msgpack;

use std::collections::HashMap;
use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};

pub use framed::{new_framed_codec, FramedReader, FramedWriter, DEFAULT_MAX_FRAME_SIZE};
pub use json::Json;
pub use msgpack::MsgPack;

use crate::error::Result;
use crate::protocol::{FrameHeader, Payload};
use crate::BoxFuture;

/// Identifier of the MessagePack codec (the default).
pub const MSGPACK_TYPE: &str = "application/msgpack";

/// Identifier of the JSON codec.
pub const JSON_TYPE: &str = "application/json";

/// Any duplex byte stream a codec can wrap.
pub trait IoStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> IoStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Type-erased connection stream.
pub type BoxedStream = Box<dyn IoStream>;

/// Serializer used by a codec for headers and bodies.
pub trait Format: Send + Sync + 'static {
    /// Encode a value to bytes.
    fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>>;

    /// Decode bytes to a value.
    fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T>;
}

/// Read half of a codec.
///
/// Only ever driven by a single task; calls never overlap.
pub trait CodecReader: Send {
    /// Read the next frame header.
    ///
    /// Returns `StreamEnded` (or an `UnexpectedEof` I/O error) once the peer
    /// has closed the stream.
    fn read_header(&mut self) -> BoxFuture<'_, Result<FrameHeader>>;

    /// Read the body following the last header into `slot`.
    ///
    /// The variant of `slot` selects the expected value domain. A decode
    /// failure is reported as `ArgumentDecode` and leaves the stream aligned
    /// on the next frame.
    fn read_body<'a>(&'a mut self, slot: &'a mut Payload) -> BoxFuture<'a, Result<()>>;
}

/// Write half of a codec.
///
/// Not synchronized on its own: callers must serialize access.
pub trait CodecWriter: Send {
    /// Write one complete frame.
    fn write<'a>(
        &'a mut self,
        header: &'a FrameHeader,
        body: &'a Payload,
    ) -> BoxFuture<'a, Result<()>>;

    /// Flush and shut down the write side of the connection.
    fn close(&mut self) -> BoxFuture<'_, Result<()>>;
}

/// Per-codec settings supplied by the server.
#[derive(Debug, Clone, Copy)]
pub struct CodecOptions {
    /// Largest header or body blob accepted or produced.
    pub max_frame_size: u32,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// A live codec over one connection.
pub struct Codec {
    reader: Box<dyn CodecReader>,
    writer: Box<dyn CodecWriter>,
}

impl Codec {
    /// Assemble a codec from its halves.
    pub fn new(reader: Box<dyn CodecReader>, writer: Box<dyn CodecWriter>) -> Self {
        Self { reader, writer }
    }

    /// Split into read and write halves.
    pub fn into_split(self) -> (Box<dyn CodecReader>, Box<dyn CodecWriter>) {
        (self.reader, self.writer)
    }
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec").finish_non_exhaustive()
    }
}

/// Constructor stored in the registry.
pub type NewCodecFn = fn(BoxedStream, CodecOptions) -> Codec;

/// Codec constructors by type identifier.
#[derive(Clone)]
pub struct CodecRegistry {
    constructors: HashMap<String, NewCodecFn>,
}

impl CodecRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register (or replace) a constructor.
    pub fn register(&mut self, codec_type: &str, constructor: NewCodecFn) -> &mut Self {
        self.constructors.insert(codec_type.to_string(), constructor);
        self
    }

    /// Look up a constructor.
    pub fn get(&self, codec_type: &str) -> Option<NewCodecFn> {
        self.constructors.get(codec_type).copied()
    }

    /// Check if an identifier is registered.
    pub fn contains(&self, codec_type: &str) -> bool {
        self.constructors.contains_key(codec_type)
    }

    /// Registered identifiers, sorted.
    pub fn codec_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl Default for CodecRegistry {
    /// Registry with the MessagePack and JSON codecs.
    fn default() -> Self {
        let mut registry = Self::new();
        registry
            .register(MSGPACK_TYPE, new_framed_codec::<MsgPack>)
            .register(JSON_TYPE, new_framed_codec::<Json>);
        registry
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("codec_types", &self.codec_types())
            .finish()
    }
}
