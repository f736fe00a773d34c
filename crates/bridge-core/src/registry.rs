//! Command registry: maps command names to handlers.
//!
//! Handlers are stored behind `Arc` so that resolution only takes the read
//! lock for a map lookup; the handler itself runs with no lock held, and a
//! re-registration swapping the binding never affects an execution that
//! already resolved the old handler.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::command::{CommandContext, Parameters};
use crate::errors::HandlerError;

/// Implemented by every command handler.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Run the command. Long-running handlers must watch `ctx.cancel`.
    async fn handle(&self, ctx: CommandContext, params: Parameters) -> Result<Value, HandlerError>;
}

/// Adapter turning an async closure into a [`CommandHandler`].
pub struct FnHandler<F, Fut> {
    f: F,
    _marker: PhantomData<fn() -> Fut>,
}

/// Wrap an async closure as a handler.
///
/// ```ignore
/// registry.register("echo", handler_fn(|_ctx, params| async move {
///     Ok(serde_json::json!(params))
/// }));
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F, Fut>
where
    F: Fn(CommandContext, Parameters) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send,
{
    FnHandler {
        f,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<F, Fut> CommandHandler for FnHandler<F, Fut>
where
    F: Fn(CommandContext, Parameters) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send,
{
    async fn handle(&self, ctx: CommandContext, params: Parameters) -> Result<Value, HandlerError> {
        (self.f)(ctx, params).await
    }
}

/// Name → handler table. Last write wins.
pub struct CommandRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn CommandHandler>>>,
}

impl CommandRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Create a shared registry pre-loaded with the built-in commands.
    pub fn with_builtins() -> Arc<Self> {
        let registry = Arc::new(Self::new());
        crate::builtin::register_builtins(&registry);
        registry
    }

    /// Bind `name` to `handler`, returning the previous binding if any.
    pub fn register(
        &self,
        name: impl Into<String>,
        handler: impl CommandHandler + 'static,
    ) -> Option<Arc<dyn CommandHandler>> {
        self.register_arc(name, Arc::new(handler))
    }

    /// Bind `name` to an already shared handler.
    pub fn register_arc(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn CommandHandler>,
    ) -> Option<Arc<dyn CommandHandler>> {
        let name = name.into();
        debug!(command = name, "command registered");
        self.handlers.write().insert(name, handler)
    }

    /// Remove a binding.
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.write().remove(name)
    }

    /// Look up the handler bound to `name`.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.read().get(name).cloned()
    }

    /// List all registered command names (sorted).
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Check whether a command is registered.
    pub fn has_command(&self, name: &str) -> bool {
        self.handlers.read().contains_key(name)
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Whether no command is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}
