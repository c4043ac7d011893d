//! Server builder, per-connection serve loop and acceptor.
//!
//! Lifecycle of one connection:
//! 1. Read the handshake line and pick the codec
//! 2. Read frames one at a time; spawn a task per request
//! 3. Each task dispatches to the [`Handler`] and writes its response
//! 4. When the peer stops sending, wait for every task, then close
//!
//! A failed handshake closes the stream without writing anything.
//!
//! # Example
//!
//! ```ignore
//! use tinyrpc::transport::bind_tcp;
//! use tinyrpc::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let listener = bind_tcp("127.0.0.1:9999").await?;
//!     Server::new().accept(listener).await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::codec::{
    BoxedStream, Codec, CodecOptions, CodecReader, CodecRegistry, IoStream, DEFAULT_MAX_FRAME_SIZE,
};
use crate::error::{RpcError, Result};
use crate::handler::{Handler, SequenceReplyHandler};
use crate::protocol::{negotiate, FrameHeader, Payload, DEFAULT_MAX_HANDSHAKE_LEN, INVALID_BODY};
use crate::transport::Listener;
use crate::writer::ResponseWriter;

/// Server limits.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Largest header or body blob, in bytes.
    pub max_frame_size: u32,
    /// Largest handshake line, in bytes.
    pub max_handshake_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_handshake_len: DEFAULT_MAX_HANDSHAKE_LEN,
        }
    }
}

/// Builder for configuring and creating a [`Server`].
pub struct ServerBuilder {
    registry: CodecRegistry,
    handler: Arc<dyn Handler>,
    config: ServerConfig,
}

impl ServerBuilder {
    /// Builder with the default codecs and the sequence-reply handler.
    pub fn new() -> Self {
        Self {
            registry: CodecRegistry::default(),
            handler: Arc::new(SequenceReplyHandler),
            config: ServerConfig::default(),
        }
    }

    /// Replace the codec registry.
    pub fn codec_registry(mut self, registry: CodecRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Set the request handler.
    pub fn handler<H: Handler>(mut self, handler: H) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    /// Set the maximum header/body blob size.
    ///
    /// Default: 16 MB
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Set the maximum handshake line length.
    ///
    /// Default: 1024
    pub fn max_handshake_len(mut self, len: usize) -> Self {
        self.config.max_handshake_len = len;
        self
    }

    /// Build the server.
    pub fn build(self) -> Server {
        Server {
            inner: Arc::new(Inner {
                registry: self.registry,
                handler: self.handler,
                config: self.config,
            }),
        }
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct Inner {
    registry: CodecRegistry,
    handler: Arc<dyn Handler>,
    config: ServerConfig,
}

/// An RPC server. Clones share configuration and handler.
#[derive(Clone)]
pub struct Server {
    inner: Arc<Inner>,
}

/// One decoded request, owned by the task handling it.
struct Request {
    header: FrameHeader,
    argument: Payload,
}

/// What the request reader produced.
enum Incoming {
    /// A request ready for dispatch.
    Call(Request),
    /// The header was fine but the body did not decode.
    Rejected { header: FrameHeader, error: RpcError },
}

impl Server {
    /// Server with default codecs, limits and the sequence-reply handler.
    pub fn new() -> Self {
        ServerBuilder::new().build()
    }

    /// Create a new server builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Current configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Serve a single connection until the peer closes it.
    ///
    /// # Errors
    ///
    /// Returns the handshake error if negotiation fails; the stream has been
    /// dropped without any bytes written. Once serving starts, errors are
    /// handled per request and this returns `Ok(())`.
    pub async fn serve_conn<S: IoStream>(&self, stream: S) -> Result<()> {
        let stream: BoxedStream = Box::new(stream);
        let options = CodecOptions {
            max_frame_size: self.inner.config.max_frame_size,
        };

        let codec = match negotiate(
            stream,
            &self.inner.registry,
            self.inner.config.max_handshake_len,
            options,
        )
        .await
        {
            Ok(codec) => codec,
            Err(e) => {
                warn!(error = %e, "rpc server: handshake error");
                return Err(e);
            }
        };

        self.serve_codec(codec).await;
        Ok(())
    }

    /// Run the serve loop on an already negotiated codec, then drain and close it.
    pub async fn serve_codec(&self, codec: Codec) {
        let (mut reader, writer) = codec.into_split();
        let writer = ResponseWriter::new(writer);
        let mut in_flight = JoinSet::new();

        loop {
            match read_request(reader.as_mut(), self.inner.handler.as_ref()).await {
                Ok(Incoming::Call(request)) => {
                    in_flight.spawn(handle_request(
                        self.inner.handler.clone(),
                        writer.clone(),
                        request,
                    ));
                }
                Ok(Incoming::Rejected { header, error }) => {
                    writer.send(&header.with_error(error), &INVALID_BODY).await;
                }
                Err(_) => break,
            }

            // Reap finished tasks so the set does not grow with connection lifetime.
            while let Some(result) = in_flight.try_join_next() {
                log_join_result(result);
            }
        }

        while let Some(result) = in_flight.join_next().await {
            log_join_result(result);
        }

        if let Err(e) = writer.close().await {
            debug!(error = %e, "rpc server: close error");
        }
    }

    /// Accept connections until the listener fails, serving each on its own task.
    ///
    /// # Errors
    ///
    /// Returns the first accept error. Connections already being served keep running.
    pub async fn accept<L: Listener>(&self, listener: L) -> Result<()> {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!(error = %e, "rpc server: accept error");
                    return Err(e);
                }
            };
            debug!(peer = %peer, "accepted connection");

            let server = self.clone();
            tokio::spawn(async move {
                // Handshake failures are already logged.
                let _ = server.serve_conn(stream).await;
                debug!(peer = %peer, "connection closed");
            });
        }
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

/// Accept connections on `listener` with a default [`Server`].
///
/// # Errors
///
/// Returns the first accept error, like [`Server::accept`].
pub async fn accept<L: Listener>(listener: L) -> Result<()> {
    Server::default().accept(listener).await
}

/// Read the next request.
///
/// `Err` ends the serve loop: either the peer closed the stream or the
/// framing is broken. Only the latter is logged as an error.
async fn read_request(reader: &mut dyn CodecReader, handler: &dyn Handler) -> Result<Incoming> {
    let header = match reader.read_header().await {
        Ok(header) => header,
        Err(e) => {
            if !e.is_stream_end() {
                error!(error = %e, "rpc server: read header error");
            }
            return Err(e);
        }
    };

    let mut argument = handler.argument_slot(&header);
    match reader.read_body(&mut argument).await {
        Ok(()) => Ok(Incoming::Call(Request { header, argument })),
        Err(e) if e.is_connection_fatal() => {
            if e.is_stream_end() {
                debug!(seq = header.seq, "rpc server: stream ended inside body");
            } else {
                error!(seq = header.seq, error = %e, "rpc server: read body error");
            }
            Err(e)
        }
        Err(e) => {
            warn!(
                service_method = %header.service_method,
                seq = header.seq,
                error = %e,
                "rpc server: read argv error"
            );
            // An unknown method is the better explanation for an undecodable body.
            let error = handler.check_method(&header).err().unwrap_or(e);
            Ok(Incoming::Rejected { header, error })
        }
    }
}

/// Dispatch one request and write its response.
///
/// The handler runs on its own task so a panic is caught as a `JoinError`
/// and reported to the client like any other handler failure.
async fn handle_request(handler: Arc<dyn Handler>, writer: ResponseWriter, request: Request) {
    let Request { header, argument } = request;

    let call_header = header.clone();
    let outcome = tokio::spawn(async move { handler.call(&call_header, argument).await }).await;

    let (header, body) = match outcome {
        Ok(Ok(reply)) => (header, reply),
        Ok(Err(e)) => (header.with_error(e), INVALID_BODY),
        Err(join_error) => {
            error!(
                service_method = %header.service_method,
                seq = header.seq,
                error = %join_error,
                "rpc server: handler panicked"
            );
            let e = RpcError::Handler(format!(
                "rpc server: method {} panicked",
                header.service_method
            ));
            (header.with_error(e), INVALID_BODY)
        }
    };

    writer.send(&header, &body).await;
}

fn log_join_result(result: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "rpc server: request task failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{new_framed_codec, MsgPack};
    use crate::handler::MethodRegistry;
    use crate::protocol::HandshakeOptions;
    use crate::BoxFuture;
    use std::time::Duration;
    use tokio::io::duplex;

    struct Panicky;

    impl Handler for Panicky {
        fn call(
            &self,
            header: &FrameHeader,
            _argument: Payload,
        ) -> BoxFuture<'static, Result<Payload>> {
            let seq = header.seq;
            Box::pin(async move {
                if seq == 1 {
                    panic!("boom");
                }
                Ok(Payload::Unit)
            })
        }
    }

    fn codec_pair(buffer: usize) -> (Codec, Codec) {
        let (a, b) = duplex(buffer);
        (
            new_framed_codec::<MsgPack>(Box::new(a), CodecOptions::default()),
            new_framed_codec::<MsgPack>(Box::new(b), CodecOptions::default()),
        )
    }

    async fn read_response(reader: &mut dyn CodecReader) -> (FrameHeader, Payload) {
        let header = reader.read_header().await.unwrap();
        let mut slot = if header.is_error() {
            Payload::Invalid
        } else {
            Payload::text_slot()
        };
        reader.read_body(&mut slot).await.unwrap();
        (header, slot)
    }

    #[test]
    fn test_builder_configuration() {
        let server = Server::builder()
            .max_frame_size(1024)
            .max_handshake_len(64)
            .build();
        assert_eq!(server.config().max_frame_size, 1024);
        assert_eq!(server.config().max_handshake_len, 64);

        let server = Server::default();
        assert_eq!(server.config().max_frame_size, DEFAULT_MAX_FRAME_SIZE);
        assert_eq!(server.config().max_handshake_len, DEFAULT_MAX_HANDSHAKE_LEN);
    }

    #[tokio::test]
    async fn test_serve_codec_answers_and_closes() {
        let (client, server_codec) = codec_pair(64 * 1024);
        let (mut reader, mut writer) = client.into_split();

        let server = Server::new();
        let serving = tokio::spawn(async move { server.serve_codec(server_codec).await });

        writer
            .write(&FrameHeader::new("Foo.Bar", 5), &Payload::from("x"))
            .await
            .unwrap();
        writer.close().await.unwrap();

        let (header, body) = read_response(reader.as_mut()).await;
        assert_eq!(header.seq, 5);
        assert!(!header.is_error());
        assert_eq!(body, SequenceReplyHandler::reply_for(5));

        serving.await.unwrap();
        assert!(matches!(
            reader.read_header().await,
            Err(RpcError::StreamEnded)
        ));
    }

    #[tokio::test]
    async fn test_handler_error_becomes_header_error() {
        let (client, server_codec) = codec_pair(64 * 1024);
        let (mut reader, mut writer) = client.into_split();

        let server = Server::builder().handler(MethodRegistry::new()).build();
        let serving = tokio::spawn(async move { server.serve_codec(server_codec).await });

        writer
            .write(&FrameHeader::new("Missing.Method", 1), &Payload::from("x"))
            .await
            .unwrap();
        writer.close().await.unwrap();

        let (header, body) = read_response(reader.as_mut()).await;
        assert_eq!(header.seq, 1);
        assert_eq!(header.error, "rpc server: can't find method Missing.Method");
        assert!(body.is_invalid());
        serving.await.unwrap();
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_header_error() {
        let (client, server_codec) = codec_pair(64 * 1024);
        let (mut reader, mut writer) = client.into_split();

        let server = Server::builder().handler(Panicky).build();
        let serving = tokio::spawn(async move { server.serve_codec(server_codec).await });

        for seq in [1u64, 2] {
            writer
                .write(&FrameHeader::new("Any.Thing", seq), &Payload::from("x"))
                .await
                .unwrap();
        }
        writer.close().await.unwrap();

        let mut errors = Vec::new();
        for _ in 0..2 {
            let header = reader.read_header().await.unwrap();
            let mut slot = Payload::Invalid;
            reader.read_body(&mut slot).await.unwrap();
            errors.push((header.seq, header.error));
        }
        errors.sort();

        assert_eq!(errors[0].0, 1);
        assert!(errors[0].1.contains("panicked"));
        assert_eq!(errors[1], (2, String::new()));
        serving.await.unwrap();
    }

    #[tokio::test]
    async fn test_drain_waits_for_slow_handler() {
        let mut registry = MethodRegistry::new();
        registry.register_text("Slow.Echo", |text| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(Payload::Text(text))
        });

        let (client, server_codec) = codec_pair(64 * 1024);
        let (mut reader, mut writer) = client.into_split();

        let server = Server::builder().handler(registry).build();
        let serving = tokio::spawn(async move { server.serve_codec(server_codec).await });

        writer
            .write(&FrameHeader::new("Slow.Echo", 9), &Payload::from("late"))
            .await
            .unwrap();
        writer.close().await.unwrap();

        let (header, body) = read_response(reader.as_mut()).await;
        assert_eq!(header.seq, 9);
        assert_eq!(body, Payload::from("late"));
        serving.await.unwrap();
    }

    #[tokio::test]
    async fn test_undecodable_body_for_unknown_method_names_method() {
        use tokio::io::AsyncWriteExt;

        let (mut raw, server_side) = duplex(1024);
        let codec = new_framed_codec::<MsgPack>(Box::new(server_side), CodecOptions::default());

        let server = Server::builder().handler(MethodRegistry::new()).build();
        let serving = tokio::spawn(async move { server.serve_codec(codec).await });

        // Valid header followed by an empty body blob, which no slot can decode.
        let header = MsgPack::encode(&FrameHeader::new("Missing.Method", 1)).unwrap();
        raw.write_all(&(header.len() as u32).to_be_bytes()).await.unwrap();
        raw.write_all(&header).await.unwrap();
        raw.write_all(&0u32.to_be_bytes()).await.unwrap();

        let client = new_framed_codec::<MsgPack>(Box::new(raw), CodecOptions::default());
        let (mut reader, mut writer) = client.into_split();
        writer.close().await.unwrap();

        let (header, body) = read_response(reader.as_mut()).await;
        assert_eq!(header.seq, 1);
        assert_eq!(header.error, "rpc server: can't find method Missing.Method");
        assert!(body.is_invalid());
        serving.await.unwrap();
    }

    #[tokio::test]
    async fn test_accept_with_default_server() {
        let listener = crate::transport::bind_tcp("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let acceptor = tokio::spawn(accept(listener));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        crate::protocol::write_handshake(&mut stream, &HandshakeOptions::default())
            .await
            .unwrap();
        let codec = new_framed_codec::<MsgPack>(Box::new(stream), CodecOptions::default());
        let (mut reader, mut writer) = codec.into_split();

        writer
            .write(&FrameHeader::new("Foo.Bar", 3), &Payload::from("x"))
            .await
            .unwrap();
        let (header, body) = read_response(reader.as_mut()).await;
        assert_eq!(header.seq, 3);
        assert_eq!(body, SequenceReplyHandler::reply_for(3));

        acceptor.abort();
    }

    #[tokio::test]
    async fn test_framing_error_ends_connection() {
        use tokio::io::AsyncWriteExt;

        let (mut raw, server_side) = duplex(1024);
        let codec = new_framed_codec::<MsgPack>(Box::new(server_side), CodecOptions::default());

        let server = Server::new();
        let serving = tokio::spawn(async move { server.serve_codec(codec).await });

        // Header blob that is not a valid header.
        raw.write_all(&[0, 0, 0, 1, 0xc1]).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), serving)
            .await
            .expect("serve loop should stop on a framing error")
            .unwrap();
    }
}
