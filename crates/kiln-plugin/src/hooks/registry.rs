//! Hook registry: which hooks exist and where their taps go.

use std::sync::Arc;

use tracing::debug;

use super::definitions::{HookBinder, HookTap};
use crate::registry::NamedRegistry;

/// Registry of hook names and their binders.
///
/// Only the plugin that created a hook keeps the object that can dispatch
/// it; the registry can forward taps but never fires a hook itself.
///
/// ```compile_fail
/// # async fn fire(registry: kiln_plugin::HookRegistry) {
/// let _ = registry.call("banner", ()).await;
/// # }
/// ```
///
/// ```compile_fail
/// # async fn fire(registry: kiln_plugin::HookRegistry) {
/// let _ = registry.collect("size", ()).await;
/// # }
/// ```
#[derive(Clone)]
pub struct HookRegistry {
    /// Hook name → binder.
    binders: Arc<NamedRegistry<Arc<dyn HookBinder>>>,
}

impl HookRegistry {
    /// Creates an empty hook registry.
    pub fn new() -> Self {
        Self {
            binders: Arc::new(NamedRegistry::new("hook")),
        }
    }

    /// Registers a hook under `name`. First writer wins unless `override_existing`.
    pub async fn add_new_hook(
        &self,
        name: &str,
        binder: Arc<dyn HookBinder>,
        override_existing: bool,
    ) -> bool {
        let kind = binder.kind();
        let added = self.binders.add(name, binder, override_existing).await;
        if added {
            debug!(hook = %name, kind = %kind, "Hook registered");
        }
        added
    }

    /// Forwards a tap to the binder of `name`.
    ///
    /// Returns `false` when no hook with that name exists.
    pub async fn bind(&self, name: &str, tap: HookTap) -> bool {
        match self.binders.get(name).await {
            Some(binder) => {
                debug!(hook = %name, plugin = %tap.contributor, "Hook tapped");
                binder.bind(tap).await;
                true
            }
            None => false,
        }
    }

    /// Whether a hook named `name` exists.
    pub async fn contains(&self, name: &str) -> bool {
        self.binders.contains(name).await
    }

    /// Sorted snapshot of registered hook names.
    pub async fn existing_hook_names(&self) -> Vec<String> {
        self.binders.names().await
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::hooks::typed::{NotifyHook, TransformHook};
    use crate::traits::handler_fn;

    #[tokio::test]
    async fn test_bind_forwards_to_owner() {
        let registry = HookRegistry::new();
        let hook: TransformHook<Value> = TransformHook::new("banner");
        assert!(registry.add_new_hook("banner", hook.binder(), false).await);

        let tapped = registry
            .bind(
                "banner",
                HookTap::new("stamp", handler_fn(|_, _| async move { Ok(json!("stamped")) })),
            )
            .await;

        assert!(tapped);
        assert_eq!(hook.contributors().await, vec!["stamp"]);
        assert_eq!(hook.call(json!("raw"), Value::Null).await.unwrap(), json!("stamped"));
    }

    #[tokio::test]
    async fn test_second_registration_is_ignored_but_taps_reach_first_owner() {
        let registry = HookRegistry::new();
        let first: NotifyHook<Value> = NotifyHook::new("done");
        let second: NotifyHook<Value> = NotifyHook::new("done");

        assert!(registry.add_new_hook("done", first.binder(), false).await);
        assert!(!registry.add_new_hook("done", second.binder(), false).await);

        registry
            .bind("done", HookTap::new("listener", handler_fn(|v, _| async move { Ok(v) })))
            .await;

        assert_eq!(first.contributors().await, vec!["listener"]);
        assert!(second.contributors().await.is_empty());
    }

    #[tokio::test]
    async fn test_bind_unknown_hook() {
        let registry = HookRegistry::new();
        let tapped = registry
            .bind("nope", HookTap::new("p", handler_fn(|v, _| async move { Ok(v) })))
            .await;
        assert!(!tapped);
        assert!(registry.existing_hook_names().await.is_empty());
    }
}
