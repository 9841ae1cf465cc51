//! Built-in command plugins.

pub mod build;
pub mod dev;
