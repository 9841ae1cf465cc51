//! Method registry entries and the read-only method view handed to plugins.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use kiln_core::{AppError, AppResult};

use crate::registry::NamedRegistry;

/// A named capability contributed by a plugin.
#[async_trait]
pub trait Method: Send + Sync {
    /// Invokes the method.
    async fn invoke(&self, args: Value) -> AppResult<Value>;
}

/// Shared storage behind the method registry.
pub(crate) type MethodStore = Arc<NamedRegistry<Arc<dyn Method>>>;

/// Read-only view of the method registry.
///
/// Plugins receive this through their [`PluginContext`](crate::PluginContext).
/// It has no insertion API: methods can only be added during the
/// registration sweep, through the register context.
#[derive(Clone)]
pub struct MethodTable {
    store: MethodStore,
}

impl MethodTable {
    pub(crate) fn new(store: MethodStore) -> Self {
        Self { store }
    }

    /// Returns the method registered under `name`.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Method>> {
        self.store.get(name).await
    }

    /// Whether a method named `name` exists.
    pub async fn contains(&self, name: &str) -> bool {
        self.store.contains(name).await
    }

    /// Invokes the method registered under `name`.
    pub async fn call(&self, name: &str, args: Value) -> AppResult<Value> {
        let method = self
            .get(name)
            .await
            .ok_or_else(|| AppError::method_not_found(name))?;
        method.invoke(args).await
    }

    /// Invokes `name` and decodes the result.
    pub async fn call_as<R: DeserializeOwned>(&self, name: &str, args: Value) -> AppResult<R> {
        let value = self.call(name, args).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Sorted snapshot of registered method names.
    pub async fn names(&self) -> Vec<String> {
        self.store.names().await
    }
}

impl std::fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodTable").finish_non_exhaustive()
    }
}
