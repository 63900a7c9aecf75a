//! Operation handler registry.
//!
//! Maps operation names to async handler functions. Handlers take the
//! request's optional payload and return `Ok(Some(payload))` to reply,
//! `Ok(None)` to stay silent, or `Err` to report a failure (the requester
//! then sees a timeout, never the error itself).
//!
//! Registration may happen from any task while the dispatch loop reads the
//! map, so it sits behind a mutex; handlers themselves are `Arc`ed and run
//! outside the lock.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use crate::envelope::Payload;
use crate::error::BoxError;

/// What a handler produces: an optional reply payload, or a failure.
pub type HandlerResult = Result<Option<Payload>, BoxError>;

/// Boxed future returned by stored handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// A registered handler, type-erased for storage.
pub type Handler = Arc<dyn Fn(Option<Payload>) -> HandlerFuture + Send + Sync>;

/// Dynamic registry of operation handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Mutex<HashMap<String, Handler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `op`, overwriting any existing binding.
    pub fn add<F, Fut>(&self, op: impl Into<String>, handler: F)
    where
        F: Fn(Option<Payload>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let erased: Handler = Arc::new(move |payload| Box::pin(handler(payload)) as HandlerFuture);
        self.handlers
            .lock()
            .expect("handler registry lock poisoned")
            .insert(op.into(), erased);
    }

    /// Remove the binding for `op`. Removing an absent binding is fine.
    pub fn remove(&self, op: &str) {
        self.handlers
            .lock()
            .expect("handler registry lock poisoned")
            .remove(op);
    }

    /// Look up the handler bound to `op`, if any.
    pub fn get(&self, op: &str) -> Option<Handler> {
        self.handlers
            .lock()
            .expect("handler registry lock poisoned")
            .get(op)
            .cloned()
    }

    /// Number of registered bindings.
    pub fn len(&self) -> usize {
        self.handlers
            .lock()
            .expect("handler registry lock poisoned")
            .len()
    }

    /// Whether no bindings are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_add_and_invoke() {
        let registry = HandlerRegistry::new();
        registry.add("echo", |payload| async move { Ok(payload) });

        let handler = registry.get("echo").unwrap();
        let mut input = Payload::new();
        input.insert("msg".to_string(), json!("x"));

        let result = handler(Some(input.clone())).await.unwrap();
        assert_eq!(result, Some(input));
    }

    #[tokio::test]
    async fn test_handler_without_payload() {
        let registry = HandlerRegistry::new();
        registry.add("hello", |_payload| async move {
            let mut reply = Payload::new();
            reply.insert("hello".to_string(), json!("world"));
            Ok(Some(reply))
        });

        let handler = registry.get("hello").unwrap();
        let result = handler(None).await.unwrap().unwrap();
        assert_eq!(result["hello"], json!("world"));
    }

    #[test]
    fn test_add_overwrites_existing_binding() {
        let registry = HandlerRegistry::new();
        registry.add("op", |_| async move { Ok(None) });
        registry.add("op", |_| async move { Ok(None) });
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_is_silent_when_absent() {
        let registry = HandlerRegistry::new();
        registry.remove("never-registered");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_unbinds() {
        let registry = HandlerRegistry::new();
        registry.add("op", |_| async move { Ok(None) });
        registry.remove("op");
        assert!(registry.get("op").is_none());
    }
}
