//! # tinyrpc
//!
//! Connection-serving core of a small RPC transport.
//!
//! Each connection starts with a JSON handshake line that picks a wire codec.
//! After that the server reads request frames one at a time, dispatches each
//! to a [`Handler`](handler::Handler) on its own task, and writes responses
//! back through a shared, mutex-guarded writer. When the peer stops sending,
//! the server waits for every in-flight request before closing.
//!
//! ## Architecture
//!
//! - **Handshake** (raw stream): `{"magicNumber":..,"codecType":..}\n`
//! - **Frames** (negotiated codec): header + body, MessagePack or JSON
//!
//! ## Example
//!
//! ```ignore
//! use tinyrpc::handler::MethodRegistry;
//! use tinyrpc::protocol::Payload;
//! use tinyrpc::transport::bind_tcp;
//! use tinyrpc::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut methods = MethodRegistry::new();
//!     methods.register_text("Echo.Say", |text| async move { Ok(Payload::Text(text)) });
//!
//!     let server = Server::builder().handler(methods).build();
//!     server.accept(bind_tcp("127.0.0.1:9999").await?).await?;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::pin::Pin;

pub mod codec;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod server;
pub mod transport;
pub mod writer;

pub use error::{Result, RpcError};
pub use server::{accept, Server, ServerBuilder, ServerConfig};

/// Boxed future used at the trait-object seams (codecs, handlers, listeners).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
