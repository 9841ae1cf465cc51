//! # kiln-plugin
//!
//! The Kiln plugin kernel. Provides:
//!
//! - Method registry: write-once named capabilities, read through [`MethodTable`]
//! - Hook registry: named extension points with Transform / Accumulate / Notify
//!   composition, dispatched sequentially in tap order
//! - Command registry and [`PluginManager::receive_command`]
//! - Plugin loader with name-convention module resolution
//! - Two-phase activation (registration sweep, then tap sweep)
//! - Owner/view split for shared records ([`SharedRecord`] / [`RecordView`])

pub mod api;
pub mod commands;
pub mod exports;
pub mod hooks;
pub mod loader;
pub mod macros;
pub mod manager;
pub mod methods;
pub mod plugin;
pub mod prelude;
pub mod registry;
pub mod state;
pub mod traits;

pub use api::context::{PluginContext, RegisterContext};
pub use commands::{CommandHandler, CommandRegistry};
pub use exports::{BuiltPlugin, PluginBuilder};
pub use hooks::definitions::{HookBinder, HookHandler, HookKind, HookTap, HookTable};
pub use hooks::registry::HookRegistry;
pub use hooks::typed::{AccumulateHook, NotifyHook, TransformHook};
#[cfg(feature = "dynamic")]
pub use loader::DynamicResolver;
pub use loader::{
    DirectoryResolver, LoadedFactory, ModuleCatalog, ModuleResolver, PluginLoader, ResolvedModule,
};
pub use manager::{PluginManager, PluginSummary};
pub use methods::{Method, MethodTable};
pub use plugin::{Plugin, PluginFactory, PluginModule, PluginRef, PluginSpec};
pub use registry::NamedRegistry;
pub use state::{RecordView, SharedRecord};
pub use traits::{command_fn, factory_fn, handler_fn, method_fn};

#[doc(hidden)]
pub mod __private {
    pub use serde_json;
}
