//! Frame header carried in front of every request and response body.

use serde::{Deserialize, Serialize};

/// Metadata envelope identifying a call.
///
/// The server echoes the request header back in the response, so
/// `service_method` and `seq` let the client correlate replies. A
/// non-empty `error` marks a failed call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameHeader {
    /// Target in `"Service.Method"` form. Opaque to the serving core.
    pub service_method: String,
    /// Client-assigned sequence number.
    pub seq: u64,
    /// Error message; empty means success.
    #[serde(default)]
    pub error: String,
}

impl FrameHeader {
    /// Create a request header with no error.
    pub fn new(service_method: impl Into<String>, seq: u64) -> Self {
        Self {
            service_method: service_method.into(),
            seq,
            error: String::new(),
        }
    }

    /// Check if this header reports a failed call.
    #[inline]
    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }

    /// Turn this header into an error response header, keeping method and sequence.
    pub fn with_error(mut self, error: impl ToString) -> Self {
        self.error = error.to_string();
        self
    }
}
