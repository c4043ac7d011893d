//! Listening endpoints the acceptor can pull connections from.
//!
//! - TCP: [`tokio::net::TcpListener`]
//! - Unix: [`UnixSocketListener`], a Unix Domain Socket that removes its
//!   socket file on drop
//!
//! # Example
//!
//! ```ignore
//! use tinyrpc::transport::bind_tcp;
//!
//! let listener = bind_tcp("127.0.0.1:0").await?;
//! let (stream, peer) = listener.accept().await?;
//! ```

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

use crate::codec::IoStream;
use crate::error::Result;
use crate::BoxFuture;

/// A source of incoming connections.
pub trait Listener: Send + Sync + 'static {
    /// Connection stream type.
    type Stream: IoStream;

    /// Wait for the next connection. Returns the stream and a printable peer address.
    fn accept(&self) -> BoxFuture<'_, Result<(Self::Stream, String)>>;

    /// Printable local address.
    fn local_addr(&self) -> Result<String>;
}

impl Listener for TcpListener {
    type Stream = TcpStream;

    fn accept(&self) -> BoxFuture<'_, Result<(TcpStream, String)>> {
        Box::pin(async move {
            let (stream, addr) = TcpListener::accept(self).await?;
            Ok((stream, addr.to_string()))
        })
    }

    fn local_addr(&self) -> Result<String> {
        Ok(TcpListener::local_addr(self)?.to_string())
    }
}

/// Bind a TCP listener.
pub async fn bind_tcp<A: ToSocketAddrs>(addr: A) -> Result<TcpListener> {
    Ok(TcpListener::bind(addr).await?)
}

/// Generate a unique socket path for this process.
///
/// Format: `<tmp>/tinyrpc-{pid}-{random}.sock`
#[cfg(unix)]
pub fn generate_socket_path() -> String {
    let pid = std::process::id();
    let dir = std::env::temp_dir();
    dir.join(format!("tinyrpc-{}-{:x}.sock", pid, rand_u64()))
        .to_string_lossy()
        .into_owned()
}

/// Simple random u64 using system time, process ID and a counter.
#[cfg(unix)]
fn rand_u64() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    let pid = std::process::id() as u64;
    (nanos ^ count.rotate_left(32)).wrapping_mul(0x517cc1b727220a95) ^ pid
}

#[cfg(unix)]
mod unix_impl {
    use std::path::Path;

    use tokio::net::{UnixListener, UnixStream};

    use super::Listener;
    use crate::error::Result;
    use crate::BoxFuture;

    /// Unix Domain Socket listener.
    pub struct UnixSocketListener {
        listener: UnixListener,
        path: String,
    }

    impl UnixSocketListener {
        /// Bind to a Unix socket path.
        ///
        /// Removes any existing socket file at the path before binding.
        pub fn bind(path: &str) -> Result<Self> {
            if Path::new(path).exists() {
                std::fs::remove_file(path)?;
            }

            let listener = UnixListener::bind(path)?;

            Ok(Self {
                listener,
                path: path.to_string(),
            })
        }

        /// Get the socket path.
        pub fn path(&self) -> &str {
            &self.path
        }
    }

    impl Drop for UnixSocketListener {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    impl Listener for UnixSocketListener {
        type Stream = UnixStream;

        fn accept(&self) -> BoxFuture<'_, Result<(UnixStream, String)>> {
            Box::pin(async move {
                let (stream, _addr) = self.listener.accept().await?;
                Ok((stream, format!("unix:{}", self.path)))
            })
        }

        fn local_addr(&self) -> Result<String> {
            Ok(self.path.clone())
        }
    }
}

#[cfg(unix)]
pub use unix_impl::UnixSocketListener;
