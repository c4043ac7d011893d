use tracing::info;

use super::Handler;
use crate::error::Result;
use crate::protocol::{FrameHeader, Payload};
use crate::BoxFuture;

/// Placeholder dispatcher used until real methods are registered.
///
/// Logs every call and replies with `"tinyrpc resp <seq>"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceReplyHandler;

impl SequenceReplyHandler {
    /// Reply body produced for a given sequence number.
    pub fn reply_for(seq: u64) -> Payload {
        Payload::Text(format!("tinyrpc resp {}", seq))
    }
}

impl Handler for SequenceReplyHandler {
    fn call(&self, header: &FrameHeader, argument: Payload) -> BoxFuture<'static, Result<Payload>> {
        info!(
            service_method = %header.service_method,
            seq = header.seq,
            argument = %argument,
            "rpc call"
        );
        let reply = Self::reply_for(header.seq);
        Box::pin(async move { Ok(reply) })
    }
}
