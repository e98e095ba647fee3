//! Package descriptor (`package.json`) reading.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{HooklineError, Result};

/// File name of a package descriptor.
pub const PACKAGE_FILE: &str = "package.json";

/// The subset of `package.json` the engine understands.
///
/// Unknown members are preserved in `extra` so plugins can read them through
/// the `pkg` accessor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    /// Declared package name; source of plugin ids.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Entry module relative to the package directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,

    #[serde(
        default,
        rename = "devDependencies",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub dev_dependencies: BTreeMap<String, String>,

    /// Plugin metadata under the `hookline` member.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hookline: Option<PackagePluginMeta>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Plugin-specific metadata a package may declare.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackagePluginMeta {
    /// `"register"` or `"config"`.
    #[serde(default, rename = "enableBy", skip_serializing_if = "Option::is_none")]
    pub enable_by: Option<String>,
}

impl PackageDescriptor {
    /// Read and parse a descriptor file.
    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            HooklineError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Read `<dir>/package.json`, falling back to an empty descriptor when the
    /// file is absent or unreadable.
    pub fn read_or_default(dir: &Path) -> Self {
        let path = dir.join(PACKAGE_FILE);
        if !path.is_file() {
            return Self::default();
        }
        match Self::read(&path) {
            Ok(pkg) => pkg,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable package descriptor");
                Self::default()
            }
        }
    }

    /// The descriptor as a JSON value, as exposed to plugins.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
