//! Unified error types for Kiln.
//!
//! Every kernel operation and plugin callback reports failures as an
//! [`AppError`]. Handler errors travel through hook dispatch and command
//! dispatch untouched, so the process boundary can still see which kind of
//! failure happened and where it came from.

use std::fmt;
use thiserror::Error;

/// Top-level error kind categorization used across the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// A plugin reference did not resolve to any loadable module.
    PluginNotFound,
    /// A resolved module exposes no callable factory.
    MalformedFactory,
    /// No plugin registered the requested command.
    UnknownCommand,
    /// No plugin registered the requested method.
    MethodNotFound,
    /// A hook handler failed during dispatch.
    Hook,
    /// A plugin failed while registering or running.
    Plugin,
    /// Input validation failed.
    Validation,
    /// A configuration error occurred.
    Configuration,
    /// A serialization/deserialization error occurred.
    Serialization,
    /// A filesystem I/O error occurred.
    Storage,
    /// An internal error occurred.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PluginNotFound => write!(f, "PLUGIN_NOT_FOUND"),
            Self::MalformedFactory => write!(f, "MALFORMED_FACTORY"),
            Self::UnknownCommand => write!(f, "UNKNOWN_COMMAND"),
            Self::MethodNotFound => write!(f, "METHOD_NOT_FOUND"),
            Self::Hook => write!(f, "HOOK"),
            Self::Plugin => write!(f, "PLUGIN"),
            Self::Validation => write!(f, "VALIDATION"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Serialization => write!(f, "SERIALIZATION"),
            Self::Storage => write!(f, "STORAGE"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// The unified application error used throughout Kiln.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new application error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new application error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// A plugin reference could not be resolved through any naming candidate.
    pub fn plugin_not_found(reference: &str) -> Self {
        Self::new(
            ErrorKind::PluginNotFound,
            format!("failed to find kiln plugin with the name {reference}"),
        )
    }

    /// A resolved module does not expose a callable factory.
    pub fn malformed_factory(reference: &str) -> Self {
        Self::new(
            ErrorKind::MalformedFactory,
            format!("plugin {reference} should export a factory"),
        )
    }

    /// No plugin responds to the command.
    pub fn unknown_command(name: &str) -> Self {
        Self::new(
            ErrorKind::UnknownCommand,
            format!(
                "failed to find plugin available to respond to this command. command name is {name}"
            ),
        )
    }

    /// No plugin registered the method.
    pub fn method_not_found(name: &str) -> Self {
        Self::new(
            ErrorKind::MethodNotFound,
            format!("no plugin registered the method {name}"),
        )
    }

    /// Create a hook error.
    pub fn hook(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Hook, message)
    }

    /// Create a plugin error.
    pub fn plugin(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Plugin, message)
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Returns whether this error is of the given kind.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorKind::Storage, format!("I/O error: {err}"), err)
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_command_names_the_command() {
        let err = AppError::unknown_command("deploy");
        assert!(err.is(ErrorKind::UnknownCommand));
        assert!(err.to_string().contains("deploy"));
        assert!(err.to_string().starts_with("UNKNOWN_COMMAND"));
    }

    #[test]
    fn test_plugin_not_found_keeps_reference() {
        let err = AppError::plugin_not_found("@acme/missing");
        assert_eq!(err.kind, ErrorKind::PluginNotFound);
        assert!(err.message.contains("@acme/missing"));
    }

    #[test]
    fn test_io_error_maps_to_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: AppError = io.into();
        assert_eq!(err.kind, ErrorKind::Storage);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_clone_drops_source_but_keeps_kind() {
        let io = std::io::Error::other("boom");
        let err: AppError = io.into();
        let cloned = err.clone();
        assert_eq!(cloned.kind, err.kind);
        assert_eq!(cloned.message, err.message);
        assert!(cloned.source.is_none());
    }
}
