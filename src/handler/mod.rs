//! Handler module - the boundary between the serving core and method dispatch.
//!
//! Provides:
//! - [`Handler`] - turns `(header, argument)` into a reply or an error
//! - [`SequenceReplyHandler`] - placeholder that answers every call with a
//!   reply derived from its sequence number
//! - [`MethodRegistry`] - maps `"Service.Method"` names to async closures
//!
//! # Example
//!
//! ```
//! use tinyrpc::handler::MethodRegistry;
//! use tinyrpc::protocol::Payload;
//!
//! let mut registry = MethodRegistry::new();
//! registry.register_text("Echo.Say", |text| async move { Ok(Payload::Text(text)) });
//! assert!(registry.contains("Echo.Say"));
//! ```

mod registry;
mod stub;

pub use registry::MethodRegistry;
pub use stub::SequenceReplyHandler;

use crate::error::Result;
use crate::protocol::{FrameHeader, Payload};
use crate::BoxFuture;

/// Dispatches one decoded request.
///
/// Implementations must be shareable across request tasks. An `Err` or a
/// panic from [`call`](Handler::call) is reported to the client in the
/// response header; it never reaches the serve loop.
pub trait Handler: Send + Sync + 'static {
    /// Empty slot the request body is decoded into.
    ///
    /// Defaults to a text slot.
    fn argument_slot(&self, _header: &FrameHeader) -> Payload {
        Payload::text_slot()
    }

    /// Check that the request names something this handler can serve.
    ///
    /// Consulted when a request body fails to decode, so the client hears
    /// about an unknown method rather than a bad argument.
    fn check_method(&self, _header: &FrameHeader) -> Result<()> {
        Ok(())
    }

    /// Handle a request and produce the reply body.
    fn call(&self, header: &FrameHeader, argument: Payload) -> BoxFuture<'static, Result<Payload>>;
}
