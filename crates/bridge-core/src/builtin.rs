//! Built-in commands every bridge ships with.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Value, json};

use crate::command::{CommandContext, Parameters};
use crate::errors::HandlerError;
use crate::registry::{CommandHandler, CommandRegistry};

/// `ping`: liveness echo.
pub struct PingHandler;

#[async_trait]
impl CommandHandler for PingHandler {
    async fn handle(&self, _ctx: CommandContext, _params: Parameters) -> Result<Value, HandlerError> {
        Ok(json!({
            "pong": true,
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }))
    }
}

/// `validate`: checks the `content` parameter.
///
/// Content must be present and non-blank. With `format=json` it must also
/// parse as JSON. Problems are reported in the payload, not as a fault.
pub struct ValidateHandler;

#[async_trait]
impl CommandHandler for ValidateHandler {
    async fn handle(&self, _ctx: CommandContext, params: Parameters) -> Result<Value, HandlerError> {
        let mut errors = Vec::new();
        match params.get("content").map(String::as_str) {
            None => errors.push("content is required".to_owned()),
            Some(content) if content.trim().is_empty() => errors.push("content is empty".to_owned()),
            Some(content) => match params.get("format").map(String::as_str) {
                Some("json") => {
                    if let Err(e) = serde_json::from_str::<Value>(content) {
                        errors.push(format!("invalid json: {e}"));
                    }
                }
                Some("text") | None => {}
                Some(other) => errors.push(format!("unsupported format: {other}")),
            },
        }
        Ok(json!({ "valid": errors.is_empty(), "errors": errors }))
    }
}

/// `commands`: sorted list of registered command names.
///
/// Holds a weak reference so the registry can own it without a cycle.
pub struct CommandsHandler {
    registry: Weak<CommandRegistry>,
}

impl CommandsHandler {
    /// Describe the given registry.
    pub fn new(registry: &Arc<CommandRegistry>) -> Self {
        Self {
            registry: Arc::downgrade(registry),
        }
    }
}

#[async_trait]
impl CommandHandler for CommandsHandler {
    async fn handle(&self, _ctx: CommandContext, _params: Parameters) -> Result<Value, HandlerError> {
        let registry = self
            .registry
            .upgrade()
            .ok_or_else(|| HandlerError::failed("command registry is gone"))?;
        Ok(json!(registry.names()))
    }
}

/// Register `ping`, `validate` and `commands` on a shared registry.
pub fn register_builtins(registry: &Arc<CommandRegistry>) {
    let _ = registry.register("ping", PingHandler);
    let _ = registry.register("validate", ValidateHandler);
    let _ = registry.register("commands", CommandsHandler::new(registry));
}
