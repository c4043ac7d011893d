//! Shared response writer for one connection.
//!
//! Request tasks finish in any order and all write to the same stream. The
//! codec's write half sits behind an async mutex that is held for the whole
//! frame, so bytes of two responses never interleave.
//!
//! ```text
//! Task 1 ─┐
//! Task 2 ─┼─► ResponseWriter (Arc<Mutex<..>>) ─► CodecWriter ─► Stream
//! Task N ─┘
//! ```

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::error;

use crate::codec::CodecWriter;
use crate::error::{RpcError, Result};
use crate::protocol::{FrameHeader, Payload};

struct WriterState {
    codec: Box<dyn CodecWriter>,
    closed: bool,
}

/// Handle for writing response frames.
///
/// Cheaply cloneable; every clone shares the same lock.
#[derive(Clone)]
pub struct ResponseWriter {
    state: Arc<Mutex<WriterState>>,
}

impl ResponseWriter {
    /// Wrap the write half of a codec.
    pub fn new(codec: Box<dyn CodecWriter>) -> Self {
        Self {
            state: Arc::new(Mutex::new(WriterState {
                codec,
                closed: false,
            })),
        }
    }

    /// Write one response frame, logging any failure.
    ///
    /// A failed write affects only this response; the connection stays up.
    pub async fn send(&self, header: &FrameHeader, body: &Payload) {
        if let Err(e) = self.try_send(header, body).await {
            error!(
                service_method = %header.service_method,
                seq = header.seq,
                error = %e,
                "rpc server: write response error"
            );
        }
    }

    /// Write one response frame.
    ///
    /// # Errors
    ///
    /// Returns `ResponseWrite` if the writer is closed or the codec fails.
    pub async fn try_send(&self, header: &FrameHeader, body: &Payload) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(RpcError::ResponseWrite("connection closed".into()));
        }

        state.codec.write(header, body).await.map_err(|e| match e {
            RpcError::ResponseWrite(msg) => RpcError::ResponseWrite(msg),
            other => RpcError::ResponseWrite(other.to_string()),
        })
    }

    /// Close the underlying codec. Later sends fail.
    ///
    /// Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        state.codec.close().await
    }

    /// Check if the writer has been closed.
    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }
}
