//! Closure adapters for handlers, methods, commands and factories.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use kiln_core::AppResult;

use crate::api::context::PluginContext;
use crate::commands::CommandHandler;
use crate::hooks::definitions::HookHandler;
use crate::methods::Method;
use crate::plugin::{Plugin, PluginFactory};

type BoxedFn2 = Arc<dyn Fn(Value, Value) -> BoxFuture<'static, AppResult<Value>> + Send + Sync>;
type BoxedFn1 = Arc<dyn Fn(Value) -> BoxFuture<'static, AppResult<Value>> + Send + Sync>;

/// A closure-based hook handler.
pub struct ClosureHandler {
    handler: BoxedFn2,
}

impl ClosureHandler {
    /// Wraps `(value, args) -> future` into a handler.
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(Value, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<Value>> + Send + 'static,
    {
        Self {
            handler: Arc::new(
                move |value: Value, args: Value| -> BoxFuture<'static, AppResult<Value>> {
                    Box::pin(handler(value, args))
                },
            ),
        }
    }
}

#[async_trait]
impl HookHandler for ClosureHandler {
    async fn call(&self, value: Value, args: Value) -> AppResult<Value> {
        (self.handler)(value, args).await
    }
}

/// A closure-based method.
pub struct ClosureMethod {
    method: BoxedFn1,
}

impl ClosureMethod {
    /// Wraps `args -> future` into a method.
    pub fn new<F, Fut>(method: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<Value>> + Send + 'static,
    {
        Self {
            method: Arc::new(move |args: Value| -> BoxFuture<'static, AppResult<Value>> {
                Box::pin(method(args))
            }),
        }
    }
}

#[async_trait]
impl Method for ClosureMethod {
    async fn invoke(&self, args: Value) -> AppResult<Value> {
        (self.method)(args).await
    }
}

/// A closure-based command handler.
pub struct ClosureCommand {
    command: BoxedFn1,
}

impl ClosureCommand {
    /// Wraps `args -> future` into a command handler.
    pub fn new<F, Fut>(command: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<Value>> + Send + 'static,
    {
        Self {
            command: Arc::new(move |args: Value| -> BoxFuture<'static, AppResult<Value>> {
                Box::pin(command(args))
            }),
        }
    }
}

#[async_trait]
impl CommandHandler for ClosureCommand {
    async fn run(&self, args: Value) -> AppResult<Value> {
        (self.command)(args).await
    }
}

/// Shorthand for `Arc::new(ClosureHandler::new(f))`.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn HookHandler>
where
    F: Fn(Value, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<Value>> + Send + 'static,
{
    Arc::new(ClosureHandler::new(f))
}

/// Shorthand for `Arc::new(ClosureMethod::new(f))`.
pub fn method_fn<F, Fut>(f: F) -> Arc<dyn Method>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<Value>> + Send + 'static,
{
    Arc::new(ClosureMethod::new(f))
}

/// Shorthand for `Arc::new(ClosureCommand::new(f))`.
pub fn command_fn<F, Fut>(f: F) -> Arc<dyn CommandHandler>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<Value>> + Send + 'static,
{
    Arc::new(ClosureCommand::new(f))
}

/// Turns an infallible `(context, options) -> plugin` closure into a factory.
pub fn factory_fn<F, P>(f: F) -> PluginFactory
where
    F: Fn(PluginContext, Value) -> P + Send + Sync + 'static,
    P: Plugin + 'static,
{
    Arc::new(
        move |context: PluginContext, options: Value| -> AppResult<Arc<dyn Plugin>> {
            Ok(Arc::new(f(context, options)))
        },
    )
}
