//! Prelude for convenient imports.

pub use async_trait::async_trait;
pub use serde_json::{Value, json};

pub use kiln_core::{AppError, AppResult, ErrorKind};

pub use crate::api::context::{PluginContext, RegisterContext};
pub use crate::commands::CommandHandler;
pub use crate::exports::{BuiltPlugin, PluginBuilder};
pub use crate::hooks::definitions::{HookBinder, HookHandler, HookKind, HookTable, HookTap};
pub use crate::hooks::typed::{AccumulateHook, NotifyHook, TransformHook};
pub use crate::methods::{Method, MethodTable};
pub use crate::plugin::{Plugin, PluginFactory, PluginModule, PluginRef, PluginSpec};
pub use crate::state::{RecordView, SharedRecord};
pub use crate::traits::{command_fn, factory_fn, handler_fn, method_fn};

pub use crate::{arg_or, hook_table};
