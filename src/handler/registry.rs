//! Method registry for dispatching requests by `"Service.Method"` name.
//!
//! Each method declares the slot its argument is decoded into, so a binary
//! method and a text method can live side by side on one connection.
//!
//! # Example
//!
//! ```
//! use tinyrpc::handler::MethodRegistry;
//! use tinyrpc::protocol::Payload;
//!
//! let mut registry = MethodRegistry::new();
//!
//! registry.register("Blob.Len", Payload::binary_slot(), |arg| async move {
//!     match arg {
//!         Payload::Binary(data) => Ok(Payload::Text(data.len().to_string())),
//!         _ => Ok(Payload::Unit),
//!     }
//! });
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use super::Handler;
use crate::error::{RpcError, Result};
use crate::protocol::{FrameHeader, Payload};
use crate::BoxFuture;

/// Type-erased method function.
type MethodFn = Arc<dyn Fn(Payload) -> BoxFuture<'static, Result<Payload>> + Send + Sync>;

/// Entry for a registered method.
struct MethodEntry {
    /// The method function.
    method: MethodFn,
    /// Slot the argument is decoded into.
    slot: Payload,
}

/// Registry mapping method names to async functions.
#[derive(Default)]
pub struct MethodRegistry {
    methods: HashMap<String, MethodEntry>,
}

impl MethodRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method.
    ///
    /// # Arguments
    ///
    /// * `name` - Full method name, e.g. `"Arith.Add"`
    /// * `slot` - Empty payload selecting the argument's value domain
    /// * `method` - Async function from argument to reply
    pub fn register<F, Fut>(&mut self, name: &str, slot: Payload, method: F)
    where
        F: Fn(Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Payload>> + Send + 'static,
    {
        let method: MethodFn =
            Arc::new(move |arg: Payload| -> BoxFuture<'static, Result<Payload>> {
                Box::pin(method(arg))
            });
        self.methods.insert(name.to_string(), MethodEntry { method, slot });
    }

    /// Register a method taking a string argument.
    pub fn register_text<F, Fut>(&mut self, name: &str, method: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Payload>> + Send + 'static,
    {
        let method = Arc::new(method);
        self.register(name, Payload::text_slot(), move |arg| {
            let method = method.clone();
            async move {
                match arg {
                    Payload::Text(text) => method(text).await,
                    other => Err(RpcError::ArgumentDecode(format!(
                        "expected text argument, got {}",
                        other
                    ))),
                }
            }
        });
    }

    /// Check if a method is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Number of registered methods.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Check if no methods are registered.
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl Handler for MethodRegistry {
    /// Unknown methods get an [`Payload::Invalid`] slot so their body is skipped.
    fn argument_slot(&self, header: &FrameHeader) -> Payload {
        self.methods
            .get(&header.service_method)
            .map(|entry| entry.slot.clone())
            .unwrap_or(Payload::Invalid)
    }

    fn check_method(&self, header: &FrameHeader) -> Result<()> {
        if self.contains(&header.service_method) {
            Ok(())
        } else {
            Err(method_not_found(header))
        }
    }

    fn call(&self, header: &FrameHeader, argument: Payload) -> BoxFuture<'static, Result<Payload>> {
        match self.methods.get(&header.service_method) {
            Some(entry) => (entry.method)(argument),
            None => {
                let err = method_not_found(header);
                Box::pin(async move { Err(err) })
            }
        }
    }
}

fn method_not_found(header: &FrameHeader) -> RpcError {
    RpcError::Handler(format!("rpc server: can't find method {}", header.service_method))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> MethodRegistry {
        let mut registry = MethodRegistry::new();
        registry.register_text("Echo.Say", |text| async move { Ok(Payload::Text(text)) });
        registry.register("Blob.Len", Payload::binary_slot(), |arg| async move {
            match arg {
                Payload::Binary(data) => Ok(Payload::Text(data.len().to_string())),
                _ => Err(RpcError::Handler("expected bytes".into())),
            }
        });
        registry
    }

    #[test]
    fn test_register_methods() {
        let registry = registry();
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("Echo.Say"));
        assert!(registry.contains("Blob.Len"));
        assert!(!registry.contains("Echo.Shout"));
        assert!(MethodRegistry::new().is_empty());
    }

    #[test]
    fn test_argument_slots() {
        let registry = registry();
        assert_eq!(
            registry.argument_slot(&FrameHeader::new("Echo.Say", 1)),
            Payload::text_slot()
        );
        assert_eq!(
            registry.argument_slot(&FrameHeader::new("Blob.Len", 1)),
            Payload::binary_slot()
        );
        assert!(registry
            .argument_slot(&FrameHeader::new("Nope.Nope", 1))
            .is_invalid());
    }

    #[tokio::test]
    async fn test_dispatch_registered_method() {
        let registry = registry();

        let reply = registry
            .call(&FrameHeader::new("Echo.Say", 1), Payload::from("hi"))
            .await
            .unwrap();
        assert_eq!(reply, Payload::from("hi"));

        let reply = registry
            .call(&FrameHeader::new("Blob.Len", 2), Payload::from(vec![0u8; 5]))
            .await
            .unwrap();
        assert_eq!(reply, Payload::from("5"));
    }

    #[tokio::test]
    async fn test_method_not_found() {
        let registry = registry();

        let err = registry
            .call(&FrameHeader::new("Nope.Nope", 1), Payload::Invalid)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "rpc server: can't find method Nope.Nope");
    }

    #[test]
    fn test_check_method() {
        let registry = registry();
        assert!(registry.check_method(&FrameHeader::new("Echo.Say", 1)).is_ok());

        let err = registry
            .check_method(&FrameHeader::new("Nope.Nope", 1))
            .unwrap_err();
        assert_eq!(err.to_string(), "rpc server: can't find method Nope.Nope");
    }

    #[tokio::test]
    async fn test_text_method_rejects_other_payloads() {
        let registry = registry();

        let err = registry
            .call(&FrameHeader::new("Echo.Say", 1), Payload::Unit)
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::ArgumentDecode(_)));
    }
}
