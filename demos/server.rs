//! Demo server - accepts TCP connections and answers RPC calls.
//!
//! Registers two methods:
//! - `Echo.Say` - returns its string argument
//! - `Blob.Len` - returns the length of its binary argument as a string
//!
//! Any other method gets a "can't find method" error response.
//!
//! # Running
//!
//! ```text
//! RUST_LOG=debug cargo run --example server -- 127.0.0.1:9999
//! ```

use tinyrpc::handler::MethodRegistry;
use tinyrpc::protocol::Payload;
use tinyrpc::transport::bind_tcp;
use tinyrpc::Server;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:9999".to_string());

    let mut methods = MethodRegistry::new();
    methods.register_text("Echo.Say", |text| async move { Ok(Payload::Text(text)) });
    methods.register("Blob.Len", Payload::binary_slot(), |arg| async move {
        match arg {
            Payload::Binary(data) => Ok(Payload::Text(data.len().to_string())),
            _ => Ok(Payload::Unit),
        }
    });

    let listener = bind_tcp(addr.as_str()).await?;
    tracing::info!(address = %addr, "rpc server listening");

    Server::builder().handler(methods).build().accept(listener).await?;
    Ok(())
}
