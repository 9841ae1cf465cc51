//! Command registry: named top-level actions invoked by the entry point.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use kiln_core::{AppError, AppResult};

use crate::registry::NamedRegistry;

/// Handler bound to a command name.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Runs the command with the parsed CLI arguments.
    async fn run(&self, args: Value) -> AppResult<Value>;
}

/// Registry of commands; one handler per name.
#[derive(Clone)]
pub struct CommandRegistry {
    /// Command name → handler.
    handlers: Arc<NamedRegistry<Arc<dyn CommandHandler>>>,
}

impl CommandRegistry {
    /// Creates an empty command registry.
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(NamedRegistry::new("command")),
        }
    }

    /// Registers `handler` under `name`. First writer wins unless `override_existing`.
    pub async fn add_new_command(
        &self,
        name: &str,
        handler: Arc<dyn CommandHandler>,
        override_existing: bool,
    ) -> bool {
        self.handlers.add(name, handler, override_existing).await
    }

    /// Runs the command registered under `name`.
    ///
    /// An unregistered name fails with `UnknownCommand` before anything runs.
    pub async fn receive_command(&self, name: &str, args: Value) -> AppResult<Value> {
        let handler = self
            .handlers
            .get(name)
            .await
            .ok_or_else(|| AppError::unknown_command(name))?;

        info!(command = %name, "Dispatching command");
        handler.run(args).await
    }

    /// Sorted snapshot of registered command names.
    pub async fn existing_command_names(&self) -> Vec<String> {
        self.handlers.names().await
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::traits::command_fn;
    use kiln_core::ErrorKind;

    #[tokio::test]
    async fn test_receive_runs_handler_with_args() {
        let registry = CommandRegistry::new();
        registry
            .add_new_command("echo", command_fn(|args| async move { Ok(args) }), false)
            .await;

        let out = registry.receive_command("echo", json!({"_": ["a"]})).await.unwrap();
        assert_eq!(out, json!({"_": ["a"]}));
    }

    #[tokio::test]
    async fn test_later_registration_is_noop() {
        let registry = CommandRegistry::new();
        assert!(registry.add_new_command("build", command_fn(|_| async { Ok(json!(1)) }), false).await);
        assert!(!registry.add_new_command("build", command_fn(|_| async { Ok(json!(2)) }), false).await);

        assert_eq!(registry.receive_command("build", Value::Null).await.unwrap(), json!(1));
    }

    #[tokio::test]
    async fn test_handler_failure_propagates() {
        let registry = CommandRegistry::new();
        registry
            .add_new_command(
                "build",
                command_fn(|_| async { Err(AppError::storage("disk full")) }),
                false,
            )
            .await;

        let err = registry.receive_command("build", Value::Null).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Storage);
        assert_eq!(err.message, "disk full");
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let registry = CommandRegistry::new();
        let err = registry.receive_command("deploy", Value::Null).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownCommand);
        assert!(err.message.contains("deploy"));
    }
}
