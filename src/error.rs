//! Error types for Hookline
//!
//! This module defines all error types used by the plugin lifecycle engine.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.
//!
//! Plugin authors work with `anyhow::Result` in apply functions, hook
//! handlers and command handlers; the engine wraps those failures into the
//! `PluginApply`, `Hook` and `Command` variants with the owning context.

use thiserror::Error;

use crate::plugins::PluginKind;
use crate::service::Stage;

/// The primary error type for Hookline operations.
#[derive(Error, Debug)]
pub enum HooklineError {
    /// Configuration-related errors (missing cwd, malformed config file, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A module identifier or its package descriptor could not be resolved
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// A command, method or plugin id was registered twice
    #[error("Duplicate registration: {0}")]
    DuplicateRegistration(String),

    /// Wrong shape passed to an operation (e.g. non-array `add` seed)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown hook application mode
    #[error("Unsupported apply mode: {0}")]
    UnsupportedMode(String),

    /// `run` requested a command nobody registered
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    /// A preset or plugin failed to load or apply
    #[error("Register {kind} {path} failed, since {message}")]
    PluginApply {
        kind: PluginKind,
        path: String,
        message: String,
    },

    /// `before` constraints on a hook key form a cycle
    #[error("Hook order cycle on '{key}' between plugins: {plugins}")]
    HookOrderCycle { key: String, plugins: String },

    /// Attempt to move the lifecycle backwards
    #[error("Stage regression: cannot move from {from:?} to {to:?}")]
    StageRegression { from: Stage, to: Stage },

    /// A hook handler returned an error
    #[error("Hook '{key}' from plugin '{plugin}' failed: {message}")]
    Hook {
        key: String,
        plugin: String,
        message: String,
    },

    /// A command handler returned an error
    #[error("Command '{name}' failed: {message}")]
    Command { name: String, message: String },

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized `Result` type for Hookline operations.
pub type Result<T> = std::result::Result<T, HooklineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HooklineError::Config("cwd /nope does not exist".to_string());
        assert_eq!(err.to_string(), "Configuration error: cwd /nope does not exist");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: HooklineError = io_err.into();
        assert!(matches!(err, HooklineError::Io(_)));
    }

    #[test]
    fn test_plugin_apply_display_carries_context() {
        let err = HooklineError::PluginApply {
            kind: PluginKind::Preset,
            path: "/work/node_modules/preset-a/index.js".to_string(),
            message: "boom".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Register preset /work/node_modules/preset-a/index.js failed, since boom"
        );
    }

    #[test]
    fn test_stage_regression_display() {
        let err = HooklineError::StageRegression {
            from: Stage::Run,
            to: Stage::Init,
        };
        assert!(err.to_string().contains("Run"));
        assert!(err.to_string().contains("Init"));
    }

    #[test]
    fn test_result_type() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(returns_result().unwrap(), 42);
    }
}
