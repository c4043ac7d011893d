//! Length-prefixed framing shared by the built-in codecs.
//!
//! Every frame is two blobs, each encoded with the codec's [`Format`]:
//!
//! ```text
//! ┌────────────┬──────────────┬────────────┬──────────────┐
//! │ Header len │ Header bytes │ Body len   │ Body bytes   │
//! │ uint32 BE  │ N bytes      │ uint32 BE  │ M bytes      │
//! └────────────┴──────────────┴────────────┴──────────────┘
//! ```
//!
//! The body blob is read in full before it is deserialized, so a body that
//! fails to decode still leaves the reader positioned on the next header.

use std::marker::PhantomData;

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::IgnoredAny;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};

use super::{BoxedStream, Codec, CodecOptions, CodecReader, CodecWriter, Format};
use crate::error::{RpcError, Result};
use crate::protocol::{FrameHeader, Payload};
use crate::BoxFuture;

/// Default maximum size of a single header or body blob (16 MB).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Length prefix size in bytes.
const LEN_PREFIX_SIZE: usize = 4;

/// Read buffer capacity.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Build a framed codec over `stream` using format `F`.
///
/// Registered in [`CodecRegistry`](super::CodecRegistry) as
/// `new_framed_codec::<MsgPack>` and `new_framed_codec::<Json>`.
pub fn new_framed_codec<F: Format>(stream: BoxedStream, options: CodecOptions) -> Codec {
    let (read_half, write_half) = tokio::io::split(stream);
    Codec::new(
        Box::new(FramedReader::<F>::new(read_half, options.max_frame_size)),
        Box::new(FramedWriter::<F>::new(write_half, options.max_frame_size)),
    )
}

/// Read half of a framed codec.
pub struct FramedReader<F> {
    inner: BufReader<ReadHalf<BoxedStream>>,
    max_frame_size: u32,
    _format: PhantomData<fn() -> F>,
}

impl<F: Format> FramedReader<F> {
    /// Create a new reader.
    pub fn new(read_half: ReadHalf<BoxedStream>, max_frame_size: u32) -> Self {
        Self {
            inner: BufReader::with_capacity(READ_BUFFER_SIZE, read_half),
            max_frame_size,
            _format: PhantomData,
        }
    }

    /// Read one length-prefixed blob.
    async fn read_blob(&mut self) -> Result<Vec<u8>> {
        let len = self.inner.read_u32().await?;
        if len > self.max_frame_size {
            return Err(RpcError::Framing(format!(
                "blob of {} bytes exceeds limit of {}",
                len, self.max_frame_size
            )));
        }

        // Grow with the bytes that actually arrive rather than the declared length.
        let mut blob = Vec::new();
        (&mut self.inner).take(u64::from(len)).read_to_end(&mut blob).await?;
        if blob.len() < len as usize {
            return Err(RpcError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("blob ended after {} of {} bytes", blob.len(), len),
            )));
        }
        Ok(blob)
    }

    async fn next_header(&mut self) -> Result<FrameHeader> {
        // Nothing buffered and nothing left to read: the peer closed between frames.
        if self.inner.fill_buf().await?.is_empty() {
            return Err(RpcError::StreamEnded);
        }

        let blob = self.read_blob().await?;
        F::decode(&blob).map_err(|e| RpcError::Framing(format!("invalid header: {}", e)))
    }

    async fn next_body(&mut self, slot: &mut Payload) -> Result<()> {
        let blob = self.read_blob().await?;
        decode_into::<F>(&blob, slot).map_err(|e| RpcError::ArgumentDecode(e.to_string()))
    }
}

impl<F: Format> CodecReader for FramedReader<F> {
    fn read_header(&mut self) -> BoxFuture<'_, Result<FrameHeader>> {
        Box::pin(self.next_header())
    }

    fn read_body<'a>(&'a mut self, slot: &'a mut Payload) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.next_body(slot))
    }
}

/// Decode `bytes` into the value domain selected by `slot`.
fn decode_into<F: Format>(bytes: &[u8], slot: &mut Payload) -> Result<()> {
    match slot {
        Payload::Unit => F::decode::<()>(bytes)?,
        Payload::Text(text) => *text = F::decode(bytes)?,
        Payload::Binary(data) => {
            let buf: serde_bytes::ByteBuf = F::decode(bytes)?;
            *data = Bytes::from(buf.into_vec());
        }
        Payload::Invalid => {
            F::decode::<IgnoredAny>(bytes)?;
        }
    }
    Ok(())
}

/// Write half of a framed codec.
pub struct FramedWriter<F> {
    inner: WriteHalf<BoxedStream>,
    max_frame_size: u32,
    _format: PhantomData<fn() -> F>,
}

impl<F: Format> FramedWriter<F> {
    /// Create a new writer.
    pub fn new(write_half: WriteHalf<BoxedStream>, max_frame_size: u32) -> Self {
        Self {
            inner: write_half,
            max_frame_size,
            _format: PhantomData,
        }
    }

    /// Encode the whole frame up front, then emit it with a single write.
    async fn write_frame(&mut self, header: &FrameHeader, body: &Payload) -> Result<()> {
        let header_blob = F::encode(header)?;
        let body_blob = F::encode(body)?;

        for blob in [&header_blob, &body_blob] {
            if blob.len() > self.max_frame_size as usize {
                return Err(RpcError::ResponseWrite(format!(
                    "blob of {} bytes exceeds limit of {}",
                    blob.len(),
                    self.max_frame_size
                )));
            }
        }

        let mut frame =
            BytesMut::with_capacity(2 * LEN_PREFIX_SIZE + header_blob.len() + body_blob.len());
        frame.put_u32(header_blob.len() as u32);
        frame.put_slice(&header_blob);
        frame.put_u32(body_blob.len() as u32);
        frame.put_slice(&body_blob);

        self.inner.write_all(&frame).await?;
        self.inner.flush().await?;
        Ok(())
    }
}

impl<F: Format> CodecWriter for FramedWriter<F> {
    fn write<'a>(
        &'a mut self,
        header: &'a FrameHeader,
        body: &'a Payload,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.write_frame(header, body))
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.inner.shutdown().await?;
            Ok(())
        })
    }
}
