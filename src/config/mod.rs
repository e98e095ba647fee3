//! Configuration for Hookline
//!
//! - `ConfigLoader` reads the user configuration file named by the host
//! - `load_dotenv` loads `<cwd>/.env` into the process environment
//! - `ServiceOptions` carries everything a `Service` is constructed from
//!
//! # User Config File
//!
//! JSON5 (plain JSON is accepted). Members other than `presets` and
//! `plugins` are free-form; a member named after a plugin key feeds the
//! enable policy.
//!
//! ```json5
//! {
//!     // resolved relative to the working directory
//!     presets: ["preset-app"],
//!     plugins: ["./plugins/banner"],
//!     "plugin-lint": { strict: true },
//!     analytics: false,
//! }
//! ```

mod package;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{HooklineError, Result};
use crate::plugins::{ModuleResolver, PackageLocator, PluginLoader, PluginSource};

pub use package::{PackageDescriptor, PackagePluginMeta, PACKAGE_FILE};

/// The user configuration object.
pub type UserConfig = Map<String, Value>;

/// Environment variable consulted when no env is given explicitly.
pub const ENV_VAR: &str = "NODE_ENV";

/// Env used when neither the options nor the environment name one.
pub const DEFAULT_ENV: &str = "development";

/// Environment file loaded from the working directory.
pub const DOTENV_FILE: &str = ".env";

/// Loads the user configuration file.
///
/// Every call reads the file from disk, so edits between calls are observed.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    cwd: PathBuf,
}

impl ConfigLoader {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self { cwd: cwd.into() }
    }

    /// Load the config named by the host, or an empty config when none is
    /// named.
    pub fn user_config(&self, config_name: Option<&str>) -> Result<UserConfig> {
        match config_name {
            Some(name) if !name.is_empty() => self.load(name),
            _ => Ok(UserConfig::new()),
        }
    }

    /// Load `<cwd>/<file_name>`.
    ///
    /// A missing file yields an empty config. An `__esModule` namespace is
    /// unwrapped to its `default` member; any other object, including one
    /// whose only key is `default`, is taken as the config itself.
    pub fn load(&self, file_name: &str) -> Result<UserConfig> {
        let path = self.cwd.join(file_name);
        if !path.exists() {
            debug!(path = %path.display(), "No user config file");
            return Ok(UserConfig::new());
        }

        let content = fs::read_to_string(&path).map_err(|e| {
            HooklineError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let value: Value = json5::from_str(&content).map_err(|e| {
            HooklineError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        match unwrap_default_export(value) {
            Value::Object(map) => {
                info!(path = %path.display(), keys = map.len(), "Loaded user config");
                Ok(map)
            }
            other => Err(HooklineError::Config(format!(
                "User config {} must be an object, got {}",
                path.display(),
                json_type_name(&other)
            ))),
        }
    }
}

fn unwrap_default_export(value: Value) -> Value {
    let Value::Object(mut map) = value else {
        return value;
    };

    if map.get("__esModule") == Some(&Value::Bool(true)) {
        return map.remove("default").unwrap_or(Value::Object(Map::new()));
    }

    Value::Object(map)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Read a list-of-strings member (`presets`, `plugins`) from the user config.
pub fn string_list(config: &UserConfig, field: &str) -> Result<Vec<String>> {
    match config.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    HooklineError::Config(format!(
                        "User config '{}' must only contain strings, found {}",
                        field,
                        json_type_name(item)
                    ))
                })
            })
            .collect(),
        Some(other) => Err(HooklineError::Config(format!(
            "User config '{}' must be an array, got {}",
            field,
            json_type_name(other)
        ))),
    }
}

/// Load `<cwd>/.env` into the process environment.
///
/// Returns whether a file was loaded. Variables already set are kept.
pub fn load_dotenv(cwd: &Path) -> Result<bool> {
    let path = cwd.join(DOTENV_FILE);
    if !path.is_file() {
        return Ok(false);
    }
    dotenvy::from_path(&path).map_err(|e| {
        HooklineError::Config(format!("Failed to load {}: {}", path.display(), e))
    })?;
    debug!(path = %path.display(), "Loaded environment file");
    Ok(true)
}

/// Resolve the run's env name: explicit, then `$NODE_ENV`, then
/// `development`. Empty values fall through.
pub fn resolve_env(explicit: Option<&str>) -> String {
    explicit
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| std::env::var(ENV_VAR).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| DEFAULT_ENV.to_string())
}

/// Everything a `Service` is constructed from.
#[derive(Clone, Default)]
pub struct ServiceOptions {
    /// Working directory; defaults to the process working directory.
    pub cwd: Option<PathBuf>,
    /// Package descriptor; defaults to `<cwd>/package.json`.
    pub pkg: Option<PackageDescriptor>,
    pub env: Option<String>,
    /// User config file name, relative to `cwd`.
    pub config_name: Option<String>,
    /// Host-supplied presets, applied before user-configured ones.
    pub presets: Vec<PluginSource>,
    /// Host-supplied plugins, applied before user-configured ones.
    pub plugins: Vec<PluginSource>,
    /// Maps resolved module paths to plugin instances.
    pub loader: Option<Arc<dyn PluginLoader>>,
    pub module_resolver: Option<Arc<dyn ModuleResolver>>,
    pub package_locator: Option<Arc<dyn PackageLocator>>,
}

impl ServiceOptions {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: Some(cwd.into()),
            ..Default::default()
        }
    }

    pub fn pkg(mut self, pkg: PackageDescriptor) -> Self {
        self.pkg = Some(pkg);
        self
    }

    pub fn env(mut self, env: impl Into<String>) -> Self {
        self.env = Some(env.into());
        self
    }

    pub fn config_name(mut self, name: impl Into<String>) -> Self {
        self.config_name = Some(name.into());
        self
    }

    pub fn preset(mut self, source: impl Into<PluginSource>) -> Self {
        self.presets.push(source.into());
        self
    }

    pub fn plugin(mut self, source: impl Into<PluginSource>) -> Self {
        self.plugins.push(source.into());
        self
    }

    pub fn loader(mut self, loader: Arc<dyn PluginLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn module_resolver(mut self, resolver: Arc<dyn ModuleResolver>) -> Self {
        self.module_resolver = Some(resolver);
        self
    }

    pub fn package_locator(mut self, locator: Arc<dyn PackageLocator>) -> Self {
        self.package_locator = Some(locator);
        self
    }
}

impl fmt::Debug for ServiceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceOptions")
            .field("cwd", &self.cwd)
            .field("env", &self.env)
            .field("config_name", &self.config_name)
            .field("presets", &self.presets)
            .field("plugins", &self.plugins)
            .finish()
    }
}
