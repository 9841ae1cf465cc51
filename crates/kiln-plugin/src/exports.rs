//! Builder for closure-based plugins.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use kiln_core::AppResult;

use crate::api::context::RegisterContext;
use crate::hooks::definitions::{HookHandler, HookTable};
use crate::plugin::Plugin;

type RegisterFn = Arc<dyn Fn(RegisterContext) -> BoxFuture<'static, AppResult<()>> + Send + Sync>;

/// A plugin assembled by [`PluginBuilder`].
pub struct BuiltPlugin {
    name: Option<String>,
    register: Option<RegisterFn>,
    hooks: HookTable,
}

#[async_trait]
impl Plugin for BuiltPlugin {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    async fn register(&self, ctx: &RegisterContext) -> AppResult<()> {
        match &self.register {
            Some(register) => register(ctx.clone()).await,
            None => Ok(()),
        }
    }

    fn hooks(&self) -> HookTable {
        self.hooks.clone()
    }
}

impl std::fmt::Debug for BuiltPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltPlugin")
            .field("name", &self.name)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

/// Builds a plugin from closures.
///
/// ```rust,ignore
/// let plugin = PluginBuilder::named("banner")
///     .tap("html", handler_fn(|doc, _| async move { Ok(doc) }))
///     .build();
/// ```
#[derive(Default)]
pub struct PluginBuilder {
    name: Option<String>,
    register: Option<RegisterFn>,
    hooks: HookTable,
}

impl PluginBuilder {
    /// An unnamed plugin; it gets an `anonymous-plugin-N` name when loaded.
    pub fn new() -> Self {
        Self::default()
    }

    /// A plugin called `name`.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Sets the register callback.
    pub fn on_register<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(RegisterContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<()>> + Send + 'static,
    {
        self.register = Some(Arc::new(
            move |ctx: RegisterContext| -> BoxFuture<'static, AppResult<()>> { Box::pin(f(ctx)) },
        ));
        self
    }

    /// Adds a hook-table entry.
    pub fn tap(mut self, hook: impl Into<String>, handler: Arc<dyn HookHandler>) -> Self {
        self.hooks.insert(hook, handler);
        self
    }

    /// Replaces the hook table.
    pub fn hooks(mut self, hooks: HookTable) -> Self {
        self.hooks = hooks;
        self
    }

    /// Finishes the plugin.
    pub fn build(self) -> BuiltPlugin {
        BuiltPlugin {
            name: self.name,
            register: self.register,
            hooks: self.hooks,
        }
    }
}
