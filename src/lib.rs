//! Hookline - plugin lifecycle and hook orchestration engine
//!
//! Presets and plugins are resolved, applied in order against a per-plugin
//! `PluginApi`, and contribute hooks, commands and methods. Hooks are then
//! applied as ordered, sequential pipelines at well-defined lifecycle points.

pub mod builtin;
pub mod commands;
pub mod config;
pub mod error;
pub mod hooks;
pub mod plugins;
pub mod service;

pub use config::ServiceOptions;
pub use error::{HooklineError, Result};
pub use service::{PluginApi, Service, Stage};
