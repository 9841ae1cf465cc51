//! # kiln-core
//!
//! Core crate for Kiln. Contains the unified error system, the input
//! configuration schema and its layered loader, and the default path table
//! that the `paths` hook starts from.
//!
//! This crate has **no** internal dependencies on other Kiln crates.

pub mod config;
pub mod error;
pub mod paths;
pub mod result;

pub use config::InputConfig;
pub use error::{AppError, ErrorKind};
pub use paths::PathTable;
pub use result::AppResult;
