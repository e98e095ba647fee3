//! Hook system for Hookline.
//!
//! Plugins attach handlers to named hook keys; the lifecycle engine and
//! command handlers later apply every live handler for a key as one ordered,
//! sequential pipeline.
//!
//! - `add`: each handler returns items appended to an array seed
//! - `modify`: each handler receives the accumulator and returns the next one
//! - `event`: handlers run for side effects only
//!
//! Order within a key: `stage` ascending, `before: <plugin id>` constraints
//! honored, registration order as tie-break.
//!
//! # Example
//!
//! ```rust
//! use hookline::hooks::{apply_plugins, hook_fn_sync, ApplyOptions, HookEntry, HookTable};
//! use hookline::plugins::PluginRegistry;
//! use serde_json::{json, Map};
//!
//! # tokio_test_block_on(async {
//! let mut table = HookTable::new();
//! table.insert(HookEntry::new("addItems", hook_fn_sync(|_| Ok(json!([2])))));
//! table.insert(HookEntry::new("addItems", hook_fn_sync(|_| Ok(json!([3])))).stage(1));
//!
//! let out = apply_plugins(
//!     &table,
//!     &PluginRegistry::new(),
//!     &Map::new(),
//!     ApplyOptions::add("addItems").initial_value(json!([1])),
//! )
//! .await
//! .unwrap();
//! assert_eq!(out, json!([1, 2, 3]));
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f)
//! # }
//! ```

mod order;
pub mod pipeline;
pub mod table;
pub mod types;

pub use order::order_entries;
pub use pipeline::{apply_plugins, HookRunner, Pipeline};
pub use table::HookTable;
pub use types::{
    hook_fn, hook_fn_sync, ApplyMode, ApplyOptions, HookCall, HookEntry, HookHandler, MethodCaller,
    MethodScope,
};
