//! Write-once named registry shared by methods, hooks and commands.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::{debug, warn};

/// A name → entry map where the first writer wins unless an override is
/// requested explicitly. Entries are never removed.
#[derive(Debug)]
pub struct NamedRegistry<T> {
    /// What this registry holds, for log output (`"method"`, `"hook"`, ...).
    label: &'static str,
    /// Name → entry.
    entries: RwLock<HashMap<String, T>>,
}

impl<T: Clone> NamedRegistry<T> {
    /// Creates an empty registry.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Installs `value` under `name`.
    ///
    /// Returns `false` and leaves the registry untouched when the name is
    /// taken and `override_existing` is not set.
    pub async fn add(&self, name: &str, value: T, override_existing: bool) -> bool {
        let mut entries = self.entries.write().await;

        if entries.contains_key(name) {
            if !override_existing {
                debug!(kind = self.label, name = %name, "Name already registered, keeping first entry");
                return false;
            }
            warn!(kind = self.label, name = %name, "Overriding registered entry");
        }

        entries.insert(name.to_string(), value);
        true
    }

    /// Returns the entry registered under `name`.
    pub async fn get(&self, name: &str) -> Option<T> {
        self.entries.read().await.get(name).cloned()
    }

    /// Whether `name` is registered.
    pub async fn contains(&self, name: &str) -> bool {
        self.entries.read().await.contains_key(name)
    }

    /// Sorted snapshot of all registered names.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether nothing has been registered yet.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
