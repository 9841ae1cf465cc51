//! Hook handler, tap and binder definitions.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use kiln_core::AppResult;

/// How the handlers of one hook combine into a single result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookKind {
    /// Each handler receives the previous handler's output; the last output wins.
    Transform,
    /// Each handler's output is appended to a running list.
    Accumulate,
    /// Handlers run for their side effects; outputs are discarded.
    Notify,
}

impl HookKind {
    /// Returns the string name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transform => "transform",
            Self::Accumulate => "accumulate",
            Self::Notify => "notify",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A plugin-contributed hook handler.
///
/// `value` is the running value for Transform hooks, the subject for Notify
/// hooks and `null` for Accumulate hooks. The return value is the next
/// running value, the item to append, or ignored, respectively.
#[async_trait]
pub trait HookHandler: Send + Sync {
    /// Handles one hook invocation.
    async fn call(&self, value: Value, args: Value) -> AppResult<Value>;
}

/// A handler bound to a hook on behalf of a plugin.
#[derive(Clone)]
pub struct HookTap {
    /// Name of the plugin that contributed the handler.
    pub contributor: String,
    /// The handler.
    pub handler: Arc<dyn HookHandler>,
}

impl HookTap {
    /// Creates a new tap.
    pub fn new(contributor: impl Into<String>, handler: Arc<dyn HookHandler>) -> Self {
        Self {
            contributor: contributor.into(),
            handler,
        }
    }
}

impl fmt::Debug for HookTap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookTap")
            .field("contributor", &self.contributor)
            .field("handler", &"<handler>")
            .finish()
    }
}

/// The integration point a hook owner registers under the hook's name.
///
/// The registry only forwards taps here; the owner decides how the taps are
/// stored and dispatched.
#[async_trait]
pub trait HookBinder: Send + Sync {
    /// The composition kind of the hook behind this binder.
    fn kind(&self) -> HookKind;

    /// Accepts a tap from a plugin.
    async fn bind(&self, tap: HookTap);
}

/// A plugin's declared hook implementations, in declaration order.
///
/// Declaring the same hook twice keeps the position of the first
/// declaration and the handler of the last.
#[derive(Clone, Default)]
pub struct HookTable {
    /// Hook name → handler.
    entries: Vec<(String, Arc<dyn HookHandler>)>,
}

impl HookTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a handler for `hook`.
    pub fn tap(mut self, hook: impl Into<String>, handler: Arc<dyn HookHandler>) -> Self {
        self.insert(hook, handler);
        self
    }

    /// Declares a handler for `hook` in place.
    pub fn insert(&mut self, hook: impl Into<String>, handler: Arc<dyn HookHandler>) {
        let hook = hook.into();
        match self.entries.iter_mut().find(|(name, _)| *name == hook) {
            Some(entry) => entry.1 = handler,
            None => self.entries.push((hook, handler)),
        }
    }

    /// Iterates over `(hook name, handler)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn HookHandler>)> {
        self.entries.iter().map(|(name, handler)| (name.as_str(), handler))
    }

    /// Declared hook names.
    pub fn hook_names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Number of declared handlers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no handler is declared.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for HookTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.hook_names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::handler_fn;

    #[test]
    fn test_redeclaring_keeps_position() {
        let table = HookTable::new()
            .tap("config", handler_fn(|v, _| async move { Ok(v) }))
            .tap("paths", handler_fn(|v, _| async move { Ok(v) }))
            .tap("config", handler_fn(|_, _| async move { Ok(Value::Null) }));

        assert_eq!(table.hook_names(), vec!["config", "paths"]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(HookKind::Transform.to_string(), "transform");
        assert_eq!(HookKind::Accumulate.as_str(), "accumulate");
        assert_eq!(HookKind::Notify.as_str(), "notify");
    }
}
