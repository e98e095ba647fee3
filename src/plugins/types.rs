//! Plugin types for Hookline
//!
//! This module defines the uniform record every preset and plugin is resolved
//! into, the `Plugin` trait implemented by extension code, and the values
//! exchanged between the lifecycle engine and an apply function.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::PackageDescriptor;
use crate::error::{HooklineError, Result};
use crate::service::PluginApi;

use super::loader::PluginLoader;

/// Whether a record is a preset or a plain plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginKind {
    /// May contribute further plugin records when applied.
    Preset,
    /// Contributes hooks, commands and methods only.
    Plugin,
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginKind::Preset => write!(f, "preset"),
            PluginKind::Plugin => write!(f, "plugin"),
        }
    }
}

/// Rule that decides whether a registered plugin takes part in pipelines.
#[derive(Clone, Default)]
pub enum EnableBy {
    /// Enabled as soon as it is registered (unless skipped or set to `false`).
    #[default]
    Register,
    /// Enabled only when the user config contains the plugin's key.
    Config,
    /// Enabled when the predicate returns `true`.
    Predicate(Arc<dyn Fn() -> bool + Send + Sync>),
}

impl EnableBy {
    /// Build a predicate rule from a closure.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        EnableBy::Predicate(Arc::new(f))
    }
}

impl fmt::Debug for EnableBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnableBy::Register => write!(f, "Register"),
            EnableBy::Config => write!(f, "Config"),
            EnableBy::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}

impl FromStr for EnableBy {
    type Err = HooklineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "register" => Ok(EnableBy::Register),
            "config" => Ok(EnableBy::Config),
            other => Err(HooklineError::InvalidArgument(format!(
                "enableBy must be 'register' or 'config', got '{}'",
                other
            ))),
        }
    }
}

/// What an apply function hands back to the lifecycle engine.
///
/// Only presets may return `presets`; plugins returning presets are rejected.
#[derive(Debug, Default)]
pub struct ApplyResult {
    /// Further presets to register. Presets returning presets are ignored.
    pub presets: Vec<PluginSource>,
    /// Further plugins appended to the initialization queue.
    pub plugins: Vec<PluginSource>,
}

impl ApplyResult {
    /// Result carrying no further sources.
    pub fn none() -> Self {
        Self::default()
    }

    /// Result that queues the given plugin sources.
    pub fn with_plugins<I, S>(plugins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PluginSource>,
    {
        Self {
            presets: Vec::new(),
            plugins: plugins.into_iter().map(Into::into).collect(),
        }
    }
}

/// Extension code run once at initialization with its own API facade.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Register hooks, commands and methods through `api`.
    async fn apply(&self, api: &mut PluginApi<'_>) -> anyhow::Result<ApplyResult>;
}

/// Adapter turning a synchronous closure into a [`Plugin`].
///
/// Most apply functions only register things, so a closure is enough.
pub struct FnPlugin<F> {
    f: F,
}

#[async_trait]
impl<F> Plugin for FnPlugin<F>
where
    F: for<'a, 'b> Fn(&'a mut PluginApi<'b>) -> anyhow::Result<ApplyResult> + Send + Sync,
{
    async fn apply(&self, api: &mut PluginApi<'_>) -> anyhow::Result<ApplyResult> {
        (self.f)(api)
    }
}

/// Wrap a closure as a shareable plugin.
pub fn plugin_fn<F>(f: F) -> Arc<dyn Plugin>
where
    F: for<'a, 'b> Fn(&'a mut PluginApi<'b>) -> anyhow::Result<ApplyResult>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnPlugin { f })
}

/// A plugin instance supplied directly by the host program.
#[derive(Clone)]
pub struct InlinePlugin {
    pub id: String,
    pub key: String,
    pub plugin: Arc<dyn Plugin>,
    pub enable_by: EnableBy,
}

impl InlinePlugin {
    /// Create an inline plugin whose key equals its id.
    pub fn new(id: impl Into<String>, plugin: Arc<dyn Plugin>) -> Self {
        let id = id.into();
        Self {
            key: id.clone(),
            id,
            plugin,
            enable_by: EnableBy::Register,
        }
    }

    /// Override the config key.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Override the enable rule.
    pub fn enable_by(mut self, enable_by: EnableBy) -> Self {
        self.enable_by = enable_by;
        self
    }
}

/// Where a preset or plugin comes from before resolution.
#[derive(Clone)]
pub enum PluginSource {
    /// A module identifier resolved on disk relative to the working directory.
    Module(String),
    /// An already-instantiated plugin.
    Inline(InlinePlugin),
}

impl fmt::Debug for PluginSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginSource::Module(id) => f.debug_tuple("Module").field(id).finish(),
            PluginSource::Inline(inline) => f.debug_tuple("Inline").field(&inline.id).finish(),
        }
    }
}

impl From<&str> for PluginSource {
    fn from(s: &str) -> Self {
        PluginSource::Module(s.to_string())
    }
}

impl From<String> for PluginSource {
    fn from(s: String) -> Self {
        PluginSource::Module(s)
    }
}

impl From<InlinePlugin> for PluginSource {
    fn from(inline: InlinePlugin) -> Self {
        PluginSource::Inline(inline)
    }
}

/// How a record obtains its plugin instance.
#[derive(Clone)]
pub enum PluginLoad {
    /// Loaded on demand from a resolved module path.
    Module {
        path: PathBuf,
        package: PackageDescriptor,
        loader: Arc<dyn PluginLoader>,
    },
    /// Already instantiated.
    Inline(Arc<dyn Plugin>),
}

/// The normalized, immutable description of a preset or plugin.
#[derive(Clone)]
pub struct PluginRecord {
    /// Unique identity, derived from the owning package name.
    pub id: String,
    /// Key looked up in the user config by the enable policy.
    pub key: String,
    /// Preset or plugin.
    pub kind: PluginKind,
    /// Absolute module path; `None` for inline plugins.
    pub source_path: Option<PathBuf>,
    /// How the plugin instance is obtained.
    pub load: PluginLoad,
    /// Enable rule.
    pub enable_by: EnableBy,
}

impl fmt::Debug for PluginRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRecord")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("source_path", &self.source_path)
            .field("enable_by", &self.enable_by)
            .finish()
    }
}

impl PluginRecord {
    /// Build a record around an inline plugin.
    pub fn inline(kind: PluginKind, inline: InlinePlugin) -> Self {
        Self {
            id: inline.id,
            key: inline.key,
            kind,
            source_path: None,
            load: PluginLoad::Inline(inline.plugin),
            enable_by: inline.enable_by,
        }
    }

    /// Whether this record is a preset.
    pub fn is_preset(&self) -> bool {
        self.kind == PluginKind::Preset
    }

    /// Human-readable origin used in error messages.
    pub fn display_path(&self) -> String {
        match &self.source_path {
            Some(path) => path.display().to_string(),
            None => format!("<inline:{}>", self.id),
        }
    }

    /// Obtain the plugin instance, wrapping load failures with context.
    pub fn instantiate(&self) -> Result<Arc<dyn Plugin>> {
        match &self.load {
            PluginLoad::Inline(plugin) => Ok(Arc::clone(plugin)),
            PluginLoad::Module {
                path,
                package,
                loader,
            } => loader
                .load(path, package)
                .map_err(|e| HooklineError::PluginApply {
                    kind: self.kind,
                    path: self.display_path(),
                    message: e.to_string(),
                }),
        }
    }
}
