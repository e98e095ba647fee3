//! Plugin lifecycle service for Hookline
//!
//! - **stage**: The monotonically advancing lifecycle `Stage`
//! - **state**: `ServiceState`, the per-run context object
//! - **api**: `PluginApi`, the facade each preset and plugin applies against
//! - **lifecycle**: `Service`, which drives construction, init and commands
//!
//! # Lifecycle
//!
//! ```text
//! new()        uninitialized -> constructor     load .env, user config, resolve sources
//! init()       init -> initPresets               apply presets, collect extra plugins
//!              initPlugins                       apply plugins until the queue is empty
//!              initHooks                         merge pending hooks, freeze the table
//!              pluginReady                       spawn onPluginReady
//! run()        await onPluginReady, onStart, run  dispatch the command
//! ```

pub mod api;
pub mod lifecycle;
pub mod stage;
pub mod state;

pub use api::{
    method_fn, ApiMember, MethodArg, MethodFn, PluginApi, PluginMethod, ServiceMember,
    BUILTIN_METHODS, ON_PLUGIN_READY, ON_START, SERVICE_MEMBERS,
};
pub use lifecycle::Service;
pub use stage::Stage;
pub use state::ServiceState;
