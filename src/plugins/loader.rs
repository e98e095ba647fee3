//! Plugin instance loading for Hookline
//!
//! Rust plugins are compiled into the host program, so "loading a module"
//! means mapping a resolved module path to a plugin instance the host
//! registered ahead of time.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::PackageDescriptor;
use crate::error::{HooklineError, Result};

use super::types::Plugin;

/// Turns a resolved module path into a plugin instance.
pub trait PluginLoader: Send + Sync {
    /// Load the plugin exported by the module at `path`.
    fn load(&self, path: &Path, package: &PackageDescriptor) -> Result<Arc<dyn Plugin>>;
}

/// Loader backed by plugins registered in memory.
///
/// Lookup order: exact module path, then the owning package name.
#[derive(Clone, Default)]
pub struct StaticLoader {
    by_path: HashMap<PathBuf, Arc<dyn Plugin>>,
    by_package: HashMap<String, Arc<dyn Plugin>>,
}

impl StaticLoader {
    /// Create an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `plugin` for the module at `path`.
    pub fn with_path(mut self, path: impl AsRef<Path>, plugin: Arc<dyn Plugin>) -> Self {
        let path = path.as_ref();
        let path = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        self.by_path.insert(path, plugin);
        self
    }

    /// Serve `plugin` for any module of the named package.
    pub fn with_package(mut self, name: impl Into<String>, plugin: Arc<dyn Plugin>) -> Self {
        self.by_package.insert(name.into(), plugin);
        self
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.by_path.len() + self.by_package.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PluginLoader for StaticLoader {
    fn load(&self, path: &Path, package: &PackageDescriptor) -> Result<Arc<dyn Plugin>> {
        if let Some(plugin) = self.by_path.get(path) {
            return Ok(Arc::clone(plugin));
        }

        package
            .name
            .as_deref()
            .and_then(|name| self.by_package.get(name))
            .map(Arc::clone)
            .ok_or_else(|| {
                HooklineError::Resolution(format!(
                    "No plugin registered for module {}",
                    path.display()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::types::{plugin_fn, ApplyResult};
    use tempfile::TempDir;

    fn noop() -> Arc<dyn Plugin> {
        plugin_fn(|_api| Ok(ApplyResult::none()))
    }

    fn package(name: &str) -> PackageDescriptor {
        PackageDescriptor {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_static_loader_by_path() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("index.js");
        fs::write(&file, "").unwrap();

        let loader = StaticLoader::new().with_path(&file, noop());
        let canonical = fs::canonicalize(&file).unwrap();
        assert!(loader.load(&canonical, &PackageDescriptor::default()).is_ok());
    }

    #[test]
    fn test_static_loader_by_package() {
        let loader = StaticLoader::new().with_package("plugin-a", noop());
        assert!(loader
            .load(Path::new("/anywhere/index.js"), &package("plugin-a"))
            .is_ok());
    }

    #[test]
    fn test_static_loader_missing() {
        let loader = StaticLoader::new().with_package("plugin-a", noop());
        let err = loader
            .load(Path::new("/anywhere/index.js"), &package("plugin-b"))
            .err()
            .unwrap();
        assert!(matches!(err, HooklineError::Resolution(_)));
        assert!(err.to_string().contains("No plugin registered"));
    }

    #[test]
    fn test_static_loader_len() {
        let loader = StaticLoader::new();
        assert!(loader.is_empty());
        let loader = loader.with_package("a", noop()).with_package("b", noop());
        assert_eq!(loader.len(), 2);
    }
}
