//! Plugin manager: loading and the two-phase activation protocol.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use kiln_core::AppResult;

use crate::api::context::{PluginContext, RegisterContext};
use crate::commands::CommandRegistry;
use crate::hooks::definitions::HookTap;
use crate::hooks::registry::HookRegistry;
use crate::loader::PluginLoader;
use crate::methods::{MethodStore, MethodTable};
use crate::plugin::{PluginRef, PluginSet, PluginSlot, PluginSpec, normalize_options};
use crate::registry::NamedRegistry;

/// Counter behind `anonymous-plugin-N` names; shared by every manager in the process.
static ANONYMOUS_INDEX: AtomicUsize = AtomicUsize::new(0);

/// Lifecycle state of one loaded plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSummary {
    /// Plugin name (possibly generated).
    pub name: String,
    /// `register` ran and succeeded.
    pub registered: bool,
    /// Hook table has been bound.
    pub tapped: bool,
    /// Marked ignored by another plugin.
    pub ignored: bool,
}

/// Owns the method, hook and command registries and the loaded plugins.
///
/// Plugins are activated in two sweeps: every pending plugin registers its
/// methods, hooks and commands first, then every pending plugin that is not
/// ignored has its hook table bound. Handler order equals load order.
pub struct PluginManager {
    loader: PluginLoader,
    methods: MethodStore,
    hooks: HookRegistry,
    commands: CommandRegistry,
    plugins: PluginSet,
}

impl PluginManager {
    /// Creates a manager that resolves names through `loader`.
    pub fn new(loader: PluginLoader) -> Self {
        Self {
            loader,
            methods: Arc::new(NamedRegistry::new("method")),
            hooks: HookRegistry::new(),
            commands: CommandRegistry::new(),
            plugins: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// A capability handle like the one each plugin factory receives.
    pub fn context(&self) -> PluginContext {
        PluginContext::new(self.methods(), self.plugins.clone())
    }

    /// Read-only view of the registered methods.
    pub fn methods(&self) -> MethodTable {
        MethodTable::new(self.methods.clone())
    }

    /// The hook registry.
    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    /// The command registry.
    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    /// Resolves, instantiates and appends one plugin. Returns its name.
    ///
    /// The plugin is neither registered nor tapped until the next sweep.
    pub async fn load_plugin(&self, spec: impl Into<PluginSpec>) -> AppResult<String> {
        Ok(self.load_slot(spec.into()).await?.name.clone())
    }

    async fn load_slot(&self, spec: PluginSpec) -> AppResult<Arc<PluginSlot>> {
        let reference = spec.reference.describe();

        let loaded = self
            .loader
            .resolve(&spec.reference, normalize_options(spec.options))
            .await
            .inspect_err(|e| error!(reference = %reference, error = %e, "Plugin load failed"))?;

        let plugin = (loaded.factory)(self.context(), normalize_options(loaded.options))?;

        let name = match plugin.name() {
            Some(name) => name.to_string(),
            None => format!(
                "anonymous-plugin-{}",
                ANONYMOUS_INDEX.fetch_add(1, Ordering::SeqCst)
            ),
        };

        let slot = Arc::new(PluginSlot::new(name.clone(), plugin));
        self.plugins.write().await.push(slot.clone());

        info!(plugin = %name, reference = %reference, "Plugin loaded");
        Ok(slot)
    }

    /// Loads every entry in order, then runs both activation sweeps.
    ///
    /// A load failure removes every plugin this call appended before
    /// returning the error, so nothing from a broken batch is activated by
    /// a later sweep. A registration failure aborts the call and leaves the
    /// failing plugin permanently untapped.
    pub async fn load_plugins<I, S>(&self, specs: I) -> AppResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<PluginSpec>,
    {
        let mut batch: Vec<Arc<PluginSlot>> = Vec::new();
        for (index, spec) in specs.into_iter().enumerate() {
            let mut spec = spec.into();
            if let PluginRef::Module(module) = &mut spec.reference {
                if module.label.is_none() {
                    module.label = Some(format!("#{index}"));
                }
            }

            match self.load_slot(spec).await {
                Ok(slot) => batch.push(slot),
                Err(e) => {
                    if !batch.is_empty() {
                        self.plugins
                            .write()
                            .await
                            .retain(|slot| !batch.iter().any(|b| Arc::ptr_eq(b, slot)));
                        warn!(discarded = batch.len(), "Plugin batch rolled back");
                    }
                    return Err(e);
                }
            }
        }
        self.register_plugins().await?;
        self.tap_all_plugin_hooks().await;
        Ok(())
    }

    /// Registration sweep: runs `register` once on each pending plugin.
    pub async fn register_plugins(&self) -> AppResult<()> {
        for slot in self.snapshot().await {
            if !slot.mark_registered() {
                continue;
            }

            let ctx = RegisterContext::snapshot(
                &slot.name,
                self.methods.clone(),
                self.hooks.clone(),
                self.commands.clone(),
            )
            .await;

            if let Err(e) = slot.plugin.register(&ctx).await {
                slot.mark_failed();
                error!(plugin = %slot.name, error = %e, "Plugin registration failed");
                return Err(e);
            }

            debug!(plugin = %slot.name, "Plugin registered");
        }
        Ok(())
    }

    /// Tap sweep: binds each pending, non-ignored plugin's hook table.
    ///
    /// Only plugins whose `register` succeeded are tapped. Entries naming a
    /// hook nobody declared are skipped.
    pub async fn tap_all_plugin_hooks(&self) {
        for slot in self.snapshot().await {
            if !slot.is_registered() {
                debug!(plugin = %slot.name, "Skipping unregistered plugin");
                continue;
            }
            if slot.is_ignored() {
                if !slot.is_tapped() {
                    debug!(plugin = %slot.name, "Skipping ignored plugin");
                }
                continue;
            }
            if !slot.mark_tapped() {
                continue;
            }

            let table = slot.plugin.hooks();
            let mut bound = 0usize;
            for (hook, handler) in table.iter() {
                let tap = HookTap::new(slot.name.clone(), handler.clone());
                if self.hooks.bind(hook, tap).await {
                    bound += 1;
                } else {
                    debug!(plugin = %slot.name, hook = %hook, "No such hook, tap skipped");
                }
            }

            debug!(plugin = %slot.name, hooks = bound, "Plugin hooks tapped");
        }
    }

    /// Marks the first plugin named `name` as ignored.
    pub async fn ignore_plugin_by_name(&self, name: &str) -> bool {
        self.context().ignore_plugin_by_name(name).await
    }

    /// Dispatches a command by name.
    pub async fn receive_command(&self, name: &str, args: Value) -> AppResult<Value> {
        self.commands.receive_command(name, args).await
    }

    /// Sorted snapshot of registered method names.
    pub async fn existing_method_names(&self) -> Vec<String> {
        self.methods.names().await
    }

    /// Sorted snapshot of registered hook names.
    pub async fn existing_hook_names(&self) -> Vec<String> {
        self.hooks.existing_hook_names().await
    }

    /// Sorted snapshot of registered command names.
    pub async fn existing_command_names(&self) -> Vec<String> {
        self.commands.existing_command_names().await
    }

    /// Loaded plugins in load order, with their lifecycle flags.
    pub async fn plugins(&self) -> Vec<PluginSummary> {
        self.context().plugins().await
    }

    /// Clones the slot list so no lock is held while plugin code runs.
    async fn snapshot(&self) -> Vec<Arc<PluginSlot>> {
        self.plugins.read().await.clone()
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new(PluginLoader::new())
    }
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("loader", &self.loader)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::exports::PluginBuilder;
    use crate::hooks::typed::TransformHook;
    use crate::plugin::PluginModule;
    use crate::traits::{factory_fn, handler_fn, method_fn};
    use kiln_core::ErrorKind;

    #[tokio::test]
    async fn test_anonymous_plugins_get_generated_names() {
        let manager = PluginManager::default();
        let a = manager
            .load_plugin(factory_fn(|_, _| PluginBuilder::new().build()))
            .await
            .unwrap();
        let b = manager
            .load_plugin(factory_fn(|_, _| PluginBuilder::new().build()))
            .await
            .unwrap();

        assert!(a.starts_with("anonymous-plugin-"));
        assert!(b.starts_with("anonymous-plugin-"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_module_default_export_loads() {
        let manager = PluginManager::default();
        let module = PluginModule::with_default(factory_fn(|_, _| PluginBuilder::named("m").build()));
        assert_eq!(manager.load_plugin(module).await.unwrap(), "m");
    }

    #[tokio::test]
    async fn test_factory_receives_object_options() {
        let manager = PluginManager::default();
        let seen = Arc::new(std::sync::Mutex::new(Value::Null));
        let sink = seen.clone();

        manager
            .load_plugin(PluginSpec::with_options(
                factory_fn(move |_, options| {
                    *sink.lock().unwrap() = options;
                    PluginBuilder::named("opts").build()
                }),
                json!("not an object"),
            ))
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), json!({}));
    }

    #[tokio::test]
    async fn test_register_runs_once_across_sweeps() {
        let manager = PluginManager::default();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();

        manager
            .load_plugins([factory_fn(move |_, _| {
                let counter = counter.clone();
                PluginBuilder::named("once")
                    .on_register(move |_| {
                        let counter = counter.clone();
                        async move {
                            counter.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        }
                    })
                    .build()
            })])
            .await
            .unwrap();
        manager.load_plugins(Vec::<PluginSpec>::new()).await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        let summary = manager.plugins().await;
        assert_eq!(
            summary,
            vec![PluginSummary {
                name: "once".into(),
                registered: true,
                tapped: true,
                ignored: false
            }]
        );
    }

    #[tokio::test]
    async fn test_register_failure_aborts_load_plugins() {
        let manager = PluginManager::default();
        let err = manager
            .load_plugins([factory_fn(|_, _| {
                PluginBuilder::named("bad")
                    .on_register(|_| async { Err(kiln_core::AppError::plugin("nope")) })
                    .build()
            })])
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Plugin);
        assert_eq!(err.message, "nope");
        assert_eq!(
            manager.plugins().await,
            vec![PluginSummary {
                name: "bad".into(),
                registered: false,
                tapped: false,
                ignored: false
            }]
        );
    }

    #[tokio::test]
    async fn test_register_context_snapshots_earlier_names() {
        let manager = PluginManager::default();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();

        let first = factory_fn(|_, _| {
            PluginBuilder::named("first")
                .on_register(|ctx| async move {
                    ctx.add_new_method("getPaths", method_fn(|_| async { Ok(json!({})) }), false)
                        .await;
                    Ok(())
                })
                .build()
        });
        let second = factory_fn(move |_, _| {
            let sink = sink.clone();
            PluginBuilder::named("second")
                .on_register(move |ctx| {
                    let sink = sink.clone();
                    async move {
                        sink.lock().unwrap().extend(ctx.existing_method_names().to_vec());
                        Ok(())
                    }
                })
                .build()
        });

        manager.load_plugins([first, second]).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["getPaths".to_string()]);
    }

    #[tokio::test]
    async fn test_taps_on_unknown_hooks_are_skipped() {
        let manager = PluginManager::default();
        let hook: TransformHook<Value> = TransformHook::new("banner");
        let binder = hook.binder();

        let owner = factory_fn(move |_, _| {
            let binder = binder.clone();
            PluginBuilder::named("owner")
                .on_register(move |ctx| {
                    let binder = binder.clone();
                    async move {
                        ctx.add_new_hook("banner", binder, false).await;
                        Ok(())
                    }
                })
                .build()
        });
        let tapper = factory_fn(|_, _| {
            PluginBuilder::named("tapper")
                .tap("banner", handler_fn(|_, _| async { Ok(json!("tapped")) }))
                .tap("missing", handler_fn(|v, _| async move { Ok(v) }))
                .build()
        });

        manager.load_plugins([owner, tapper]).await.unwrap();
        assert_eq!(hook.contributors().await, vec!["tapper"]);
        assert_eq!(hook.call(json!("raw"), Value::Null).await.unwrap(), json!("tapped"));
    }
}
