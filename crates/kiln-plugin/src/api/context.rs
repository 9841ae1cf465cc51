//! Plugin context: capabilities handed to factories and register callbacks.

use std::sync::Arc;

use tracing::{debug, info};

use crate::commands::{CommandHandler, CommandRegistry};
use crate::hooks::definitions::HookBinder;
use crate::hooks::registry::HookRegistry;
use crate::methods::{Method, MethodStore, MethodTable};
use crate::manager::PluginSummary;
use crate::plugin::PluginSet;

/// Capability handle given to every plugin factory.
///
/// Grants read access to the shared methods and the ability to suppress
/// another plugin's hook binding. It cannot add methods; that only happens
/// through [`RegisterContext`] during the registration sweep.
#[derive(Clone)]
pub struct PluginContext {
    methods: MethodTable,
    plugins: PluginSet,
}

impl PluginContext {
    pub(crate) fn new(methods: MethodTable, plugins: PluginSet) -> Self {
        Self { methods, plugins }
    }

    /// Read-only view of every registered method.
    pub fn methods(&self) -> &MethodTable {
        &self.methods
    }

    /// Loaded plugins in load order, with their lifecycle flags.
    pub async fn plugins(&self) -> Vec<PluginSummary> {
        self.plugins.read().await.iter().map(|slot| slot.summary()).collect()
    }

    /// Marks the first plugin named `name` as ignored.
    ///
    /// An ignored plugin that has not been tapped yet never gets its hook
    /// handlers bound. Handlers already bound stay bound. Returns `false`
    /// when no plugin has that name.
    pub async fn ignore_plugin_by_name(&self, name: &str) -> bool {
        let plugins = self.plugins.read().await;
        match plugins.iter().find(|slot| slot.name == name) {
            Some(slot) => {
                slot.mark_ignored();
                info!(plugin = %name, tapped = slot.is_tapped(), "Plugin ignored");
                true
            }
            None => {
                debug!(plugin = %name, "No plugin to ignore");
                false
            }
        }
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext").finish_non_exhaustive()
    }
}

/// Arguments to [`Plugin::register`](crate::Plugin::register).
///
/// The `existing_*_names` lists are snapshots taken when this plugin's
/// registration started.
#[derive(Clone)]
pub struct RegisterContext {
    plugin_name: String,
    methods: MethodStore,
    hooks: HookRegistry,
    commands: CommandRegistry,
    method_names: Vec<String>,
    hook_names: Vec<String>,
    command_names: Vec<String>,
}

impl RegisterContext {
    pub(crate) async fn snapshot(
        plugin_name: &str,
        methods: MethodStore,
        hooks: HookRegistry,
        commands: CommandRegistry,
    ) -> Self {
        let method_names = methods.names().await;
        let hook_names = hooks.existing_hook_names().await;
        let command_names = commands.existing_command_names().await;

        Self {
            plugin_name: plugin_name.to_string(),
            methods,
            hooks,
            commands,
            method_names,
            hook_names,
            command_names,
        }
    }

    /// Name of the plugin being registered.
    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    /// Adds a method. Returns `false` if the name was taken and `override_existing` is off.
    pub async fn add_new_method(
        &self,
        name: &str,
        method: Arc<dyn Method>,
        override_existing: bool,
    ) -> bool {
        let added = self.methods.add(name, method, override_existing).await;
        if added {
            debug!(plugin = %self.plugin_name, method = %name, "Method registered");
        }
        added
    }

    /// Adds a hook. The binder decides the hook's composition kind.
    pub async fn add_new_hook(
        &self,
        name: &str,
        binder: Arc<dyn HookBinder>,
        override_existing: bool,
    ) -> bool {
        self.hooks.add_new_hook(name, binder, override_existing).await
    }

    /// Adds a command.
    pub async fn add_new_command(
        &self,
        name: &str,
        handler: Arc<dyn CommandHandler>,
        override_existing: bool,
    ) -> bool {
        let added = self
            .commands
            .add_new_command(name, handler, override_existing)
            .await;
        if added {
            debug!(plugin = %self.plugin_name, command = %name, "Command registered");
        }
        added
    }

    /// Method names registered before this plugin's registration.
    pub fn existing_method_names(&self) -> &[String] {
        &self.method_names
    }

    /// Hook names registered before this plugin's registration.
    pub fn existing_hook_names(&self) -> &[String] {
        &self.hook_names
    }

    /// Command names registered before this plugin's registration.
    pub fn existing_command_names(&self) -> &[String] {
        &self.command_names
    }
}

impl std::fmt::Debug for RegisterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterContext")
            .field("plugin_name", &self.plugin_name)
            .finish_non_exhaustive()
    }
}
