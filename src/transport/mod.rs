//! Transport module - listening endpoints for the acceptor.
//!
//! Provides abstraction over:
//! - TCP sockets
//! - Unix Domain Sockets (Linux/macOS)

mod listener;

pub use listener::{bind_tcp, Listener};

#[cfg(unix)]
pub use listener::{generate_socket_path, UnixSocketListener};
