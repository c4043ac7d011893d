//! Protocol module - frame header, payload values and the connection handshake.
//!
//! - [`FrameHeader`] travels in front of every request and response body
//! - [`Payload`] is the argument/reply value, including the [`INVALID_BODY`] sentinel
//! - [`HandshakeOptions`] is the one-shot JSON line selecting the codec

mod handshake;
mod header;
mod payload;

pub use handshake::{
    negotiate, read_handshake, write_handshake, HandshakeOptions, DEFAULT_MAX_HANDSHAKE_LEN,
    MAGIC_NUMBER,
};
pub use header::FrameHeader;
pub use payload::{Payload, INVALID_BODY};
