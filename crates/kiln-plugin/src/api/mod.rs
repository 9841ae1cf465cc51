//! Plugin API: the handles plugins receive from the kernel.

pub mod context;

pub use context::{PluginContext, RegisterContext};
