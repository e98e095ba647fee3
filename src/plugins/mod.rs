//! Plugin system for Hookline
//!
//! This module turns preset and plugin sources into uniform records and keeps
//! track of which of them are registered and enabled.
//!
//! # Architecture
//!
//! - **types**: Core data structures (`PluginRecord`, `PluginSource`, `Plugin`, `ApplyResult`, `EnableBy`)
//! - **resolver**: Module resolution, package descriptor lookup, record construction
//! - **loader**: Mapping resolved module paths to compiled-in plugin instances
//! - **registry**: Registration by id, the skip-set, and the enable policy
//!
//! # Plugin Layout On Disk
//!
//! ```text
//! <cwd>/
//! ├── package.json
//! ├── .hooklinerc.json
//! └── node_modules/
//!     ├── preset-app/
//!     │   ├── package.json      { "name": "preset-app", "main": "index.js" }
//!     │   ├── index.js          -> id "preset-app"
//!     │   └── plugins/
//!     │       └── routes.js     -> id "preset-app/plugins/routes"
//!     └── plugin-lint/
//!         ├── package.json      { "name": "plugin-lint", "hookline": { "enableBy": "config" } }
//!         └── index.js          -> id "plugin-lint"
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hookline::plugins::{plugin_fn, ApplyResult, PluginKind, PluginResolver, StaticLoader};
//!
//! let loader = StaticLoader::new()
//!     .with_package("plugin-lint", plugin_fn(|_api| Ok(ApplyResult::none())));
//! let resolver = PluginResolver::new("/work/app", Arc::new(loader));
//! let records = resolver
//!     .resolve_all(PluginKind::Plugin, &["plugin-lint".into()], &[])
//!     .unwrap();
//! assert_eq!(records[0].id, "plugin-lint");
//! ```

mod loader;
pub mod registry;
pub mod resolver;
pub mod types;

pub use loader::{PluginLoader, StaticLoader};
pub use registry::PluginRegistry;
pub use resolver::{
    FsPackageLocator, ModuleResolver, NodeModuleResolver, PackageLocator, PluginResolver,
    DEFAULT_EXTENSIONS,
};
pub use types::{
    plugin_fn, ApplyResult, EnableBy, FnPlugin, InlinePlugin, Plugin, PluginKind, PluginLoad,
    PluginRecord, PluginSource,
};
