//! Hook system: definitions, registry, sequential dispatcher and typed hook objects.

pub mod definitions;
pub mod dispatcher;
pub mod registry;
pub mod typed;

pub use definitions::{HookBinder, HookHandler, HookKind, HookTap, HookTable};
pub use registry::HookRegistry;
pub use typed::{AccumulateHook, NotifyHook, TransformHook};
