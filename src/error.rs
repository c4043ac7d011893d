//! Error types for tinyrpc.

use thiserror::Error;

/// Main error type for all tinyrpc operations.
///
/// Only handshake-level and framing-level variants terminate a connection.
/// The per-request variants end up as the `error` string of a response header.
#[derive(Debug, Error)]
pub enum RpcError {
    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Handshake record is malformed or carries the wrong magic number.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Handshake asked for a codec identifier nobody registered.
    #[error("unsupported codec type: {0}")]
    UnsupportedCodec(String),

    /// Frame header could not be read; the stream is desynchronized.
    #[error("framing error: {0}")]
    Framing(String),

    /// The peer closed the stream.
    #[error("stream ended")]
    StreamEnded,

    /// Request body did not decode into the expected argument slot.
    #[error("argument decode error: {0}")]
    ArgumentDecode(String),

    /// The method handler failed.
    #[error("{0}")]
    Handler(String),

    /// A response frame could not be written.
    #[error("write response error: {0}")]
    ResponseWrite(String),
}

impl RpcError {
    /// Whether this error means the peer is gone (clean or abrupt EOF).
    pub fn is_stream_end(&self) -> bool {
        match self {
            RpcError::StreamEnded => true,
            RpcError::Io(e) => e.kind() == std::io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }

    /// Whether the connection must be torn down after this error.
    pub fn is_connection_fatal(&self) -> bool {
        !matches!(
            self,
            RpcError::ArgumentDecode(_) | RpcError::Handler(_) | RpcError::ResponseWrite(_)
        )
    }
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_end_classification() {
        assert!(RpcError::StreamEnded.is_stream_end());

        let eof = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "early eof");
        assert!(RpcError::Io(eof).is_stream_end());

        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(!RpcError::Io(reset).is_stream_end());
        assert!(!RpcError::Framing("bad length".into()).is_stream_end());
    }

    #[test]
    fn test_per_request_errors_are_not_fatal() {
        assert!(!RpcError::ArgumentDecode("x".into()).is_connection_fatal());
        assert!(!RpcError::Handler("x".into()).is_connection_fatal());
        assert!(!RpcError::ResponseWrite("x".into()).is_connection_fatal());

        assert!(RpcError::Framing("x".into()).is_connection_fatal());
        assert!(RpcError::ProtocolViolation("x".into()).is_connection_fatal());
        assert!(RpcError::UnsupportedCodec("x".into()).is_connection_fatal());
        assert!(RpcError::StreamEnded.is_connection_fatal());
    }

    #[test]
    fn test_handler_error_displays_message_verbatim() {
        let err = RpcError::Handler("rpc server: can't find method Foo.Bar".into());
        assert_eq!(err.to_string(), "rpc server: can't find method Foo.Bar");
    }
}
