//! Connection handshake: codec negotiation before any RPC traffic.
//!
//! The client opens every connection with a single JSON line:
//!
//! ```text
//! {"magicNumber":3927900,"codecType":"application/msgpack"}\n
//! ```
//!
//! The record is read straight from the raw stream one byte at a time, so
//! nothing after the terminating newline is consumed. The selected codec then
//! takes over the same stream.
//!
//! # Example
//!
//! ```
//! use tinyrpc::protocol::{HandshakeOptions, MAGIC_NUMBER};
//!
//! let options = HandshakeOptions::default();
//! assert_eq!(options.magic_number, MAGIC_NUMBER);
//!
//! let line = options.encode_line().unwrap();
//! assert_eq!(line.last(), Some(&b'\n'));
//! ```

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::codec::{BoxedStream, Codec, CodecOptions, CodecRegistry, MSGPACK_TYPE};
use crate::error::{RpcError, Result};

/// Magic number every handshake must carry.
pub const MAGIC_NUMBER: u32 = 0x3bef5c;

/// Default upper bound for the handshake line, newline included.
pub const DEFAULT_MAX_HANDSHAKE_LEN: usize = 1024;

/// One-shot connection options sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeOptions {
    /// Must equal [`MAGIC_NUMBER`].
    pub magic_number: u32,
    /// Identifier of the codec used for every following frame.
    pub codec_type: String,
}

impl HandshakeOptions {
    /// Options with the correct magic number and the given codec.
    pub fn new(codec_type: impl Into<String>) -> Self {
        Self {
            magic_number: MAGIC_NUMBER,
            codec_type: codec_type.into(),
        }
    }

    /// Serialize to a single JSON line terminated by `\n`.
    pub fn encode_line(&self) -> Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

impl Default for HandshakeOptions {
    fn default() -> Self {
        Self::new(MSGPACK_TYPE)
    }
}

/// Send the handshake line (client side).
pub async fn write_handshake<W>(writer: &mut W, options: &HandshakeOptions) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let line = options.encode_line()?;
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one handshake line without consuming anything past the newline.
///
/// # Errors
///
/// - `ProtocolViolation` if the line exceeds `max_len` or is not valid JSON.
/// - `Io` if the stream ends before the newline.
pub async fn read_handshake<R>(reader: &mut R, max_len: usize) -> Result<HandshakeOptions>
where
    R: AsyncRead + Unpin,
{
    let mut line = Vec::with_capacity(128);
    loop {
        let byte = reader.read_u8().await?;
        if byte == b'\n' {
            break;
        }
        if line.len() + 1 >= max_len {
            return Err(RpcError::ProtocolViolation(format!(
                "handshake longer than {} bytes",
                max_len
            )));
        }
        line.push(byte);
    }

    serde_json::from_slice(&line)
        .map_err(|e| RpcError::ProtocolViolation(format!("invalid handshake: {}", e)))
}

/// Run the server side of the handshake and build the negotiated codec.
///
/// On error the stream is dropped without a single byte written: no wire
/// format exists yet to report the failure in.
pub async fn negotiate(
    mut stream: BoxedStream,
    registry: &CodecRegistry,
    max_handshake_len: usize,
    options: CodecOptions,
) -> Result<Codec> {
    let handshake = read_handshake(&mut stream, max_handshake_len).await?;

    if handshake.magic_number != MAGIC_NUMBER {
        return Err(RpcError::ProtocolViolation(format!(
            "invalid magic number {:#x}",
            handshake.magic_number
        )));
    }

    let new_codec = registry
        .get(&handshake.codec_type)
        .ok_or_else(|| RpcError::UnsupportedCodec(handshake.codec_type.clone()))?;

    Ok(new_codec(stream, options))
}
