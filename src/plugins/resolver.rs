//! Preset and plugin resolution for Hookline
//!
//! Turns host-supplied plugin sources plus the identifiers listed in the user
//! config into uniform `PluginRecord`s. Module identifiers are resolved on
//! disk, the nearest `package.json` supplies the plugin identity, and the
//! configured `PluginLoader` is kept on the record so the instance is only
//! obtained when the plugin is applied.

use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::config::{PackageDescriptor, PACKAGE_FILE};
use crate::error::{HooklineError, Result};

use super::loader::PluginLoader;
use super::types::{EnableBy, PluginKind, PluginLoad, PluginRecord, PluginSource};

/// Extensions tried, in order, when an identifier does not name a file.
pub const DEFAULT_EXTENSIONS: &[&str] = &["js", "ts"];

/// Resolves a module identifier to an absolute file path.
pub trait ModuleResolver: Send + Sync {
    /// Resolve `identifier` relative to `basedir`.
    fn resolve(&self, identifier: &str, basedir: &Path) -> Result<PathBuf>;
}

/// Finds the package descriptor owning a file.
pub trait PackageLocator: Send + Sync {
    /// Return the nearest ancestor `package.json` path and its contents.
    fn find_package(&self, start: &Path) -> Result<Option<(PathBuf, PackageDescriptor)>>;
}

/// Node-style module resolution.
///
/// Path-like identifiers (`/x`, `./x`, `../x`) are joined onto the base
/// directory; bare identifiers are searched in `node_modules` of the base
/// directory and every ancestor. Each candidate is tried as a file, then with
/// each extension appended, then as a directory (`main`, then `index.<ext>`).
#[derive(Debug, Clone)]
pub struct NodeModuleResolver {
    extensions: Vec<String>,
}

impl Default for NodeModuleResolver {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect())
    }
}

impl NodeModuleResolver {
    /// Create a resolver with an explicit extension search order.
    pub fn new(extensions: Vec<String>) -> Self {
        let extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_string())
            .collect();
        Self { extensions }
    }

    /// Extension search order.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    fn try_file(&self, candidate: &Path) -> Option<PathBuf> {
        if candidate.is_file() {
            return Some(candidate.to_path_buf());
        }
        self.extensions
            .iter()
            .map(|ext| with_appended_extension(candidate, ext))
            .find(|p| p.is_file())
    }

    fn try_index(&self, dir: &Path) -> Option<PathBuf> {
        self.extensions
            .iter()
            .map(|ext| dir.join(format!("index.{}", ext)))
            .find(|p| p.is_file())
    }

    fn try_directory(&self, dir: &Path) -> Result<Option<PathBuf>> {
        if !dir.is_dir() {
            return Ok(None);
        }

        let manifest = dir.join(PACKAGE_FILE);
        if manifest.is_file() {
            let pkg = PackageDescriptor::read(&manifest)?;
            if let Some(main) = pkg.main.as_deref() {
                let entry = dir.join(main);
                if let Some(found) = self.try_file(&entry).or_else(|| self.try_index(&entry)) {
                    return Ok(Some(found));
                }
            }
        }

        Ok(self.try_index(dir))
    }
}

impl ModuleResolver for NodeModuleResolver {
    fn resolve(&self, identifier: &str, basedir: &Path) -> Result<PathBuf> {
        let candidates: Vec<PathBuf> = if is_path_like(identifier) {
            vec![basedir.join(identifier)]
        } else {
            basedir
                .ancestors()
                .map(|dir| dir.join("node_modules").join(identifier))
                .collect()
        };

        for candidate in &candidates {
            let found = match self.try_file(candidate) {
                Some(found) => Some(found),
                None => self.try_directory(candidate)?,
            };
            if let Some(found) = found {
                return Ok(fs::canonicalize(&found)?);
            }
        }

        Err(HooklineError::Resolution(format!(
            "Cannot find module '{}' from '{}'",
            identifier,
            basedir.display()
        )))
    }
}

/// Walks up the file system looking for `package.json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsPackageLocator;

impl PackageLocator for FsPackageLocator {
    fn find_package(&self, start: &Path) -> Result<Option<(PathBuf, PackageDescriptor)>> {
        for dir in start.ancestors() {
            let manifest = dir.join(PACKAGE_FILE);
            if manifest.is_file() {
                let pkg = PackageDescriptor::read(&manifest)?;
                return Ok(Some((manifest, pkg)));
            }
        }
        Ok(None)
    }
}

/// Resolves plugin sources into records.
#[derive(Clone)]
pub struct PluginResolver {
    cwd: PathBuf,
    modules: Arc<dyn ModuleResolver>,
    packages: Arc<dyn PackageLocator>,
    loader: Arc<dyn PluginLoader>,
}

impl PluginResolver {
    /// Create a resolver using node-style resolution and file-system package
    /// lookup.
    pub fn new(cwd: impl Into<PathBuf>, loader: Arc<dyn PluginLoader>) -> Self {
        Self {
            cwd: cwd.into(),
            modules: Arc::new(NodeModuleResolver::default()),
            packages: Arc::new(FsPackageLocator),
            loader,
        }
    }

    /// Replace the module resolution collaborator.
    pub fn with_module_resolver(mut self, modules: Arc<dyn ModuleResolver>) -> Self {
        self.modules = modules;
        self
    }

    /// Replace the package descriptor collaborator.
    pub fn with_package_locator(mut self, packages: Arc<dyn PackageLocator>) -> Self {
        self.packages = packages;
        self
    }

    /// Base directory for module identifiers.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Resolve host sources followed by user-configured identifiers.
    pub fn resolve_all(
        &self,
        kind: PluginKind,
        host: &[PluginSource],
        user: &[String],
    ) -> Result<Vec<PluginRecord>> {
        host.iter()
            .cloned()
            .chain(user.iter().cloned().map(PluginSource::Module))
            .map(|source| self.resolve(kind, &source))
            .collect()
    }

    /// Resolve a single source.
    pub fn resolve(&self, kind: PluginKind, source: &PluginSource) -> Result<PluginRecord> {
        match source {
            PluginSource::Inline(inline) => Ok(PluginRecord::inline(kind, inline.clone())),
            PluginSource::Module(identifier) => self.resolve_module(kind, identifier),
        }
    }

    fn resolve_module(&self, kind: PluginKind, identifier: &str) -> Result<PluginRecord> {
        let path = self.modules.resolve(identifier, &self.cwd)?;

        let (manifest, package) = self.packages.find_package(&path)?.ok_or_else(|| {
            HooklineError::Resolution(format!(
                "No {} found for {} {}",
                PACKAGE_FILE,
                kind,
                path.display()
            ))
        })?;

        let name = package
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| {
                HooklineError::Resolution(format!(
                    "Package {} declares no name",
                    manifest.display()
                ))
            })?;

        let package_dir = manifest.parent().unwrap_or(Path::new("/"));
        let (id, key) = derive_identity(&name, package_dir, &package, &path);

        let enable_by = match package
            .hookline
            .as_ref()
            .and_then(|meta| meta.enable_by.as_deref())
        {
            Some(rule) => rule.parse()?,
            None => EnableBy::Register,
        };

        debug!(plugin = %id, kind = %kind, path = %path.display(), "Resolved plugin record");

        Ok(PluginRecord {
            id,
            key,
            kind,
            source_path: Some(path.clone()),
            load: PluginLoad::Module {
                path,
                package,
                loader: Arc::clone(&self.loader),
            },
            enable_by,
        })
    }
}

/// The config key is always the package name. Main entries also use it as
/// their id; other modules in the package get `<name>/<relative path>` so
/// their ids stay distinct.
fn derive_identity(
    name: &str,
    package_dir: &Path,
    package: &PackageDescriptor,
    path: &Path,
) -> (String, String) {
    let main = package_dir.join(package.main.as_deref().unwrap_or("index.js"));
    if strip_extension(&main) == strip_extension(path) {
        return (name.to_string(), name.to_string());
    }

    let relative = path.strip_prefix(package_dir).unwrap_or(path);
    let segments: Vec<String> = strip_extension(relative)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    (format!("{}/{}", name, segments.join("/")), name.to_string())
}

fn is_path_like(identifier: &str) -> bool {
    identifier == "."
        || identifier == ".."
        || identifier.starts_with("./")
        || identifier.starts_with("../")
        || Path::new(identifier).is_absolute()
}

fn with_appended_extension(path: &Path, ext: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(".");
    raw.push(ext);
    PathBuf::from(raw)
}

fn strip_extension(path: &Path) -> PathBuf {
    let mut stripped = path.to_path_buf();
    stripped.set_extension("");
    stripped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UserConfig;
    use crate::plugins::loader::StaticLoader;
    use crate::plugins::registry::PluginRegistry;
    use crate::plugins::types::{plugin_fn, ApplyResult, InlinePlugin};
    use serde_json::json;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn resolver(cwd: &Path) -> PluginResolver {
        PluginResolver::new(cwd, Arc::new(StaticLoader::new()))
    }

    /// Lays out `node_modules/<name>/{package.json,index.js}`.
    fn write_package(root: &Path, name: &str) -> PathBuf {
        let dir = root.join("node_modules").join(name);
        write(
            &dir.join("package.json"),
            &format!(r#"{{"name": "{}", "main": "index.js"}}"#, name),
        );
        write(&dir.join("index.js"), "");
        dir
    }

    // ---- NodeModuleResolver ----

    #[test]
    fn test_resolve_relative_with_extension_search() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("plugins/a.ts"), "");

        let found = NodeModuleResolver::default()
            .resolve("./plugins/a", tmp.path())
            .unwrap();
        assert_eq!(found, fs::canonicalize(tmp.path().join("plugins/a.ts")).unwrap());
    }

    #[test]
    fn test_resolve_extension_order() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("p.js"), "");
        write(&tmp.path().join("p.ts"), "");

        let found = NodeModuleResolver::default().resolve("./p", tmp.path()).unwrap();
        assert_eq!(found.extension().unwrap(), "js");

        let ts_first = NodeModuleResolver::new(vec![".ts".to_string(), "js".to_string()]);
        let found = ts_first.resolve("./p", tmp.path()).unwrap();
        assert_eq!(found.extension().unwrap(), "ts");
    }

    #[test]
    fn test_resolve_bare_identifier_walks_ancestors() {
        let tmp = TempDir::new().unwrap();
        write_package(tmp.path(), "plugin-a");
        let nested = tmp.path().join("app/src");
        fs::create_dir_all(&nested).unwrap();

        let found = NodeModuleResolver::default()
            .resolve("plugin-a", &nested)
            .unwrap();
        assert!(found.ends_with("node_modules/plugin-a/index.js"));
    }

    #[test]
    fn test_resolve_directory_main_without_extension() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("node_modules/preset");
        write(&dir.join("package.json"), r#"{"name": "preset", "main": "lib/entry"}"#);
        write(&dir.join("lib/entry.ts"), "");

        let found = NodeModuleResolver::default()
            .resolve("preset", tmp.path())
            .unwrap();
        assert!(found.ends_with("lib/entry.ts"));
    }

    #[test]
    fn test_resolve_missing_module() {
        let tmp = TempDir::new().unwrap();
        let err = NodeModuleResolver::default()
            .resolve("./nope", tmp.path())
            .unwrap_err();
        assert!(matches!(err, HooklineError::Resolution(_)));
        assert!(err.to_string().contains("Cannot find module './nope'"));
    }

    // ---- FsPackageLocator ----

    #[test]
    fn test_find_package_nearest_ancestor() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("package.json"), r#"{"name": "outer"}"#);
        write(&tmp.path().join("inner/package.json"), r#"{"name": "inner"}"#);
        write(&tmp.path().join("inner/src/x.js"), "");

        let (manifest, pkg) = FsPackageLocator
            .find_package(&tmp.path().join("inner/src/x.js"))
            .unwrap()
            .unwrap();
        assert_eq!(pkg.name.as_deref(), Some("inner"));
        assert!(manifest.ends_with("inner/package.json"));
    }

    // ---- PluginResolver ----

    #[test]
    fn test_resolve_main_entry_uses_package_name() {
        let tmp = TempDir::new().unwrap();
        write_package(tmp.path(), "plugin-a");

        let record = resolver(tmp.path())
            .resolve(PluginKind::Plugin, &"plugin-a".into())
            .unwrap();
        assert_eq!(record.id, "plugin-a");
        assert_eq!(record.key, "plugin-a");
        assert_eq!(record.kind, PluginKind::Plugin);
        assert!(record.source_path.unwrap().ends_with("index.js"));
    }

    #[test]
    fn test_resolve_non_main_module_gets_distinct_id() {
        let tmp = TempDir::new().unwrap();
        let dir = write_package(tmp.path(), "preset-b");
        write(&dir.join("plugins/routes.js"), "");

        let record = resolver(tmp.path())
            .resolve(
                PluginKind::Plugin,
                &"./node_modules/preset-b/plugins/routes".into(),
            )
            .unwrap();
        assert_eq!(record.id, "preset-b/plugins/routes");
        assert_eq!(record.key, "preset-b");
    }

    #[test]
    fn test_non_main_module_is_gated_by_package_key() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("node_modules/opt-in");
        write(
            &dir.join("package.json"),
            r#"{"name": "opt-in", "hookline": {"enableBy": "config"}}"#,
        );
        write(&dir.join("index.js"), "");
        write(&dir.join("lib/routes.js"), "");

        let record = resolver(tmp.path())
            .resolve(PluginKind::Plugin, &"./node_modules/opt-in/lib/routes".into())
            .unwrap();
        let id = record.id.clone();
        let mut registry = PluginRegistry::new();
        registry.register(record);

        let mut config = UserConfig::new();
        config.insert("routes".to_string(), json!({}));
        assert!(!registry.is_enabled(&id, &config));

        config.insert("opt-in".to_string(), json!({}));
        assert!(registry.is_enabled(&id, &config));

        config.insert("opt-in".to_string(), json!(false));
        assert!(!registry.is_enabled(&id, &config));
    }

    #[test]
    fn test_resolve_enable_by_from_package() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("node_modules/opt-in");
        write(
            &dir.join("package.json"),
            r#"{"name": "opt-in", "hookline": {"enableBy": "config"}}"#,
        );
        write(&dir.join("index.js"), "");

        let record = resolver(tmp.path())
            .resolve(PluginKind::Plugin, &"opt-in".into())
            .unwrap();
        assert!(matches!(record.enable_by, EnableBy::Config));
    }

    #[test]
    fn test_resolve_without_package_descriptor_fails() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("loose.js"), "");

        struct NoPackages;
        impl PackageLocator for NoPackages {
            fn find_package(&self, _start: &Path) -> Result<Option<(PathBuf, PackageDescriptor)>> {
                Ok(None)
            }
        }

        let err = resolver(tmp.path())
            .with_package_locator(Arc::new(NoPackages))
            .resolve(PluginKind::Preset, &"./loose".into())
            .unwrap_err();
        assert!(matches!(err, HooklineError::Resolution(_)));
        assert!(err.to_string().contains("No package.json found for preset"));
    }

    #[test]
    fn test_resolve_package_without_name_fails() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("pkg/package.json"), r#"{"version": "1.0.0"}"#);
        write(&tmp.path().join("pkg/index.js"), "");

        let err = resolver(tmp.path())
            .resolve(PluginKind::Plugin, &"./pkg".into())
            .unwrap_err();
        assert!(err.to_string().contains("declares no name"));
    }

    #[test]
    fn test_resolve_all_host_first_then_user() {
        let tmp = TempDir::new().unwrap();
        write_package(tmp.path(), "from-host");
        write_package(tmp.path(), "from-user");

        let inline = InlinePlugin::new("inline", plugin_fn(|_api| Ok(ApplyResult::none())));
        let records = resolver(tmp.path())
            .resolve_all(
                PluginKind::Plugin,
                &[inline.into(), "from-host".into()],
                &["from-user".to_string()],
            )
            .unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["inline", "from-host", "from-user"]);
    }

    #[test]
    fn test_resolve_all_propagates_first_error() {
        let tmp = TempDir::new().unwrap();
        let result = resolver(tmp.path()).resolve_all(
            PluginKind::Plugin,
            &["missing".into()],
            &[],
        );
        assert!(matches!(result, Err(HooklineError::Resolution(_))));
    }

    #[test]
    fn test_is_path_like() {
        assert!(is_path_like("./a"));
        assert!(is_path_like("../a"));
        assert!(is_path_like("/abs/a"));
        assert!(!is_path_like("plugin-a"));
        assert!(!is_path_like("@scope/plugin"));
    }
}
