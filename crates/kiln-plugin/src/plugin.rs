//! Plugin trait, factories, references and per-plugin lifecycle slots.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use kiln_core::config::PluginEntry;
use kiln_core::{AppError, AppResult};

use crate::api::context::{PluginContext, RegisterContext};
use crate::hooks::definitions::HookTable;
use crate::manager::PluginSummary;

/// A loaded plugin.
///
/// Every part is optional: a plugin may only register capabilities, only
/// tap hooks declared by others, or both.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Display name. `None` gets an `anonymous-plugin-N` name on load.
    fn name(&self) -> Option<&str> {
        None
    }

    /// Contributes methods, hooks and commands. Called exactly once.
    async fn register(&self, _ctx: &RegisterContext) -> AppResult<()> {
        Ok(())
    }

    /// The hooks this plugin taps, in declaration order.
    fn hooks(&self) -> HookTable {
        HookTable::new()
    }
}

/// Builds a plugin from its capability handle and options.
pub type PluginFactory =
    Arc<dyn Fn(PluginContext, Value) -> AppResult<Arc<dyn Plugin>> + Send + Sync>;

/// A resolved plugin module.
///
/// Mirrors a module that is either callable itself or carries a callable
/// `default` export.
#[derive(Clone, Default)]
pub struct PluginModule {
    /// The module itself is a factory.
    pub callable: Option<PluginFactory>,
    /// The module's `default` export.
    pub default: Option<PluginFactory>,
    /// Where the module came from, for error messages.
    pub label: Option<String>,
}

impl PluginModule {
    /// A module that is itself the factory.
    pub fn callable(factory: PluginFactory) -> Self {
        Self {
            callable: Some(factory),
            default: None,
            label: None,
        }
    }

    /// A module exposing the factory as its `default` export.
    pub fn with_default(factory: PluginFactory) -> Self {
        Self {
            callable: None,
            default: Some(factory),
            label: None,
        }
    }

    /// Attaches a label used when the module turns out to be malformed.
    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// A module with no callable export.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Picks the factory: the module itself first, then `default`.
    pub fn factory(&self, reference: &str) -> AppResult<PluginFactory> {
        self.callable
            .clone()
            .or_else(|| self.default.clone())
            .ok_or_else(|| AppError::malformed_factory(reference))
    }
}

impl std::fmt::Debug for PluginModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginModule")
            .field("callable", &self.callable.is_some())
            .field("default", &self.default.is_some())
            .field("label", &self.label)
            .finish()
    }
}

/// How a plugin is referenced in a load request.
#[derive(Clone)]
pub enum PluginRef {
    /// A factory used as-is.
    Factory(PluginFactory),
    /// An already-imported module.
    Module(PluginModule),
    /// A name resolved through the loader's naming conventions.
    Name(String),
}

impl PluginRef {
    /// Human-readable description for errors and logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Factory(_) => "<factory>".to_string(),
            Self::Module(module) => match &module.label {
                Some(label) => format!("<module {label}>"),
                None => "<module>".to_string(),
            },
            Self::Name(name) => name.clone(),
        }
    }
}

impl std::fmt::Debug for PluginRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Factory(_) => f.write_str("PluginRef::Factory"),
            Self::Module(module) => f.debug_tuple("PluginRef::Module").field(module).finish(),
            Self::Name(name) => f.debug_tuple("PluginRef::Name").field(name).finish(),
        }
    }
}

impl From<PluginFactory> for PluginRef {
    fn from(factory: PluginFactory) -> Self {
        Self::Factory(factory)
    }
}

impl From<PluginModule> for PluginRef {
    fn from(module: PluginModule) -> Self {
        Self::Module(module)
    }
}

impl From<&str> for PluginRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for PluginRef {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

/// One entry of a `load_plugins` call: a reference plus its options.
#[derive(Debug, Clone)]
pub struct PluginSpec {
    /// What to load.
    pub reference: PluginRef,
    /// Options handed to the factory. Always an object.
    pub options: Value,
}

impl PluginSpec {
    /// A reference with empty options.
    pub fn new(reference: impl Into<PluginRef>) -> Self {
        Self {
            reference: reference.into(),
            options: Value::Object(Map::new()),
        }
    }

    /// A reference with options; anything that is not an object becomes `{}`.
    pub fn with_options(reference: impl Into<PluginRef>, options: Value) -> Self {
        Self {
            reference: reference.into(),
            options: normalize_options(options),
        }
    }
}

impl From<PluginRef> for PluginSpec {
    fn from(reference: PluginRef) -> Self {
        Self::new(reference)
    }
}

impl From<PluginFactory> for PluginSpec {
    fn from(factory: PluginFactory) -> Self {
        Self::new(factory)
    }
}

impl From<PluginModule> for PluginSpec {
    fn from(module: PluginModule) -> Self {
        Self::new(module)
    }
}

impl From<&str> for PluginSpec {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<PluginEntry> for PluginSpec {
    fn from(entry: PluginEntry) -> Self {
        match entry {
            PluginEntry::Name(name) => Self::new(name),
            PluginEntry::WithOptions(name, options) => Self::with_options(name, options),
        }
    }
}

/// Options are always an object by the time a factory sees them.
pub(crate) fn normalize_options(options: Value) -> Value {
    match options {
        Value::Object(_) => options,
        _ => Value::Object(Map::new()),
    }
}

/// A loaded plugin with its private lifecycle flags.
pub(crate) struct PluginSlot {
    pub(crate) name: String,
    pub(crate) plugin: Arc<dyn Plugin>,
    registered: AtomicBool,
    tapped: AtomicBool,
    ignored: AtomicBool,
    failed: AtomicBool,
}

impl PluginSlot {
    pub(crate) fn new(name: String, plugin: Arc<dyn Plugin>) -> Self {
        Self {
            name,
            plugin,
            registered: AtomicBool::new(false),
            tapped: AtomicBool::new(false),
            ignored: AtomicBool::new(false),
            failed: AtomicBool::new(false),
        }
    }

    /// `register` ran and returned `Ok`.
    pub(crate) fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst) && !self.is_failed()
    }

    /// Flips `registered` on; returns `false` if it was already set.
    pub(crate) fn mark_registered(&self) -> bool {
        !self.registered.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn is_tapped(&self) -> bool {
        self.tapped.load(Ordering::SeqCst)
    }

    /// Flips `tapped` on; returns `false` if it was already set.
    pub(crate) fn mark_tapped(&self) -> bool {
        !self.tapped.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn is_ignored(&self) -> bool {
        self.ignored.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_ignored(&self) {
        self.ignored.store(true, Ordering::SeqCst);
    }

    /// `register` returned an error; the slot is never tapped.
    pub(crate) fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_failed(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }

    pub(crate) fn summary(&self) -> PluginSummary {
        PluginSummary {
            name: self.name.clone(),
            registered: self.is_registered(),
            tapped: self.is_tapped(),
            ignored: self.is_ignored(),
        }
    }
}

/// The manager's ordered plugin set, shared with every capability handle.
pub(crate) type PluginSet = Arc<RwLock<Vec<Arc<PluginSlot>>>>;

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use kiln_core::ErrorKind;

    struct Nameless;

    impl Plugin for Nameless {}

    fn factory() -> PluginFactory {
        Arc::new(|_ctx: PluginContext, _opts: Value| -> AppResult<Arc<dyn Plugin>> {
            Ok(Arc::new(Nameless))
        })
    }

    #[test]
    fn test_module_prefers_callable_then_default() {
        assert!(PluginModule::callable(factory()).factory("m").is_ok());
        assert!(PluginModule::with_default(factory()).factory("m").is_ok());

        match PluginModule::empty().factory("kiln-plugin-broken") {
            Err(err) => {
                assert_eq!(err.kind, ErrorKind::MalformedFactory);
                assert!(err.message.contains("kiln-plugin-broken"));
            }
            Ok(_) => panic!("a module without exports must be rejected"),
        }
    }

    #[test]
    fn test_module_label_names_the_reference() {
        let labeled = PluginRef::from(PluginModule::empty().labeled("entry #2"));
        assert_eq!(labeled.describe(), "<module entry #2>");
        assert_eq!(PluginRef::from(PluginModule::empty()).describe(), "<module>");
    }

    #[test]
    fn test_spec_normalizes_options() {
        assert_eq!(PluginSpec::with_options("a", json!(5)).options, json!({}));
        assert_eq!(PluginSpec::with_options("a", Value::Null).options, json!({}));
        assert_eq!(
            PluginSpec::with_options("a", json!({"k": 1})).options,
            json!({"k": 1})
        );
    }

    #[test]
    fn test_spec_from_config_entry() {
        let spec = PluginSpec::from(PluginEntry::WithOptions("size".into(), json!({"limit": 2})));
        assert!(matches!(spec.reference, PluginRef::Name(ref n) if n == "size"));
        assert_eq!(spec.options, json!({"limit": 2}));
    }

    #[test]
    fn test_slot_flags_flip_once() {
        let slot = PluginSlot::new("p".into(), Arc::new(Nameless));
        assert!(slot.mark_registered());
        assert!(!slot.mark_registered());
        assert!(slot.is_registered());
        assert!(!slot.is_tapped());
        slot.mark_ignored();
        assert!(slot.is_ignored());
    }
}
