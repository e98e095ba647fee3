//! Plugin registry for Hookline
//!
//! This module provides the `PluginRegistry` struct holding every registered
//! preset and plugin record, keyed by id, together with the set of plugin ids
//! explicitly skipped by other plugins. It also implements the enable policy
//! that decides whether a plugin's hooks take part in a pipeline.
//!
//! Skipping is a query-time filter: hooks of a skipped plugin stay in the
//! hook table and are simply never selected.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};
use tracing::{info, warn};

use super::types::{EnableBy, PluginRecord};

/// A registry of plugin records plus the skip-set.
///
/// # Example
///
/// ```rust
/// use hookline::plugins::{plugin_fn, ApplyResult, InlinePlugin, PluginKind, PluginRecord, PluginRegistry};
/// use serde_json::Map;
///
/// let mut registry = PluginRegistry::new();
/// let plugin = plugin_fn(|_api| Ok(ApplyResult::none()));
/// registry.register(PluginRecord::inline(PluginKind::Plugin, InlinePlugin::new("lint", plugin)));
///
/// let user_config = Map::new();
/// assert!(registry.is_enabled("lint", &user_config));
///
/// registry.skip(["lint"]);
/// assert!(!registry.is_enabled("lint", &user_config));
/// ```
#[derive(Clone, Default)]
pub struct PluginRegistry {
    /// Map from plugin id to record.
    plugins: HashMap<String, PluginRecord>,

    /// Ids registered, in registration order.
    order: Vec<String>,

    /// Ids explicitly skipped for the rest of the run.
    skipped: HashSet<String>,
}

impl PluginRegistry {
    /// Create a new empty plugin registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record under its id.
    ///
    /// The last write for a given id wins; callers that must reject
    /// duplicates check [`contains`](Self::contains) first.
    pub fn register(&mut self, record: PluginRecord) {
        let id = record.id.clone();
        info!(plugin = %id, kind = %record.kind, "Registered plugin");
        if self.plugins.insert(id.clone(), record).is_some() {
            warn!(plugin = %id, "Plugin re-registered, previous record replaced");
        } else {
            self.order.push(id);
        }
    }

    /// Whether a record with this id exists.
    pub fn contains(&self, id: &str) -> bool {
        self.plugins.contains_key(id)
    }

    /// Get a record by id.
    pub fn get(&self, id: &str) -> Option<&PluginRecord> {
        self.plugins.get(id)
    }

    /// Records in registration order.
    pub fn list(&self) -> Vec<&PluginRecord> {
        self.order
            .iter()
            .filter_map(|id| self.plugins.get(id))
            .collect()
    }

    /// Number of registered records.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Add ids to the skip-set. Irreversible within one run.
    pub fn skip<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for id in ids {
            let id = id.into();
            info!(plugin = %id, "Plugin skipped");
            self.skipped.insert(id);
        }
    }

    /// Whether an id is in the skip-set.
    pub fn is_skipped(&self, id: &str) -> bool {
        self.skipped.contains(id)
    }

    /// Decide whether a plugin's hooks take part in pipelines.
    ///
    /// Rules, in order:
    /// 1. skipped ids and unknown ids are disabled
    /// 2. `enableBy: config` requires the key to be present in the user config
    /// 3. a user config value of exactly `false` disables the plugin
    /// 4. a predicate decides
    /// 5. otherwise enabled
    pub fn is_enabled(&self, id: &str, user_config: &Map<String, Value>) -> bool {
        if self.skipped.contains(id) {
            return false;
        }

        let Some(record) = self.plugins.get(id) else {
            return false;
        };

        if matches!(record.enable_by, EnableBy::Config) && !user_config.contains_key(&record.key)
        {
            return false;
        }

        if user_config.get(&record.key) == Some(&Value::Bool(false)) {
            return false;
        }

        match &record.enable_by {
            EnableBy::Predicate(predicate) => predicate(),
            EnableBy::Register | EnableBy::Config => true,
        }
    }

    /// True only if every id is registered, is not a preset, and is enabled.
    pub fn has_plugins<S: AsRef<str>>(&self, ids: &[S], user_config: &Map<String, Value>) -> bool {
        ids.iter().all(|id| {
            let id = id.as_ref();
            self.plugins
                .get(id)
                .map(|record| !record.is_preset() && self.is_enabled(id, user_config))
                .unwrap_or(false)
        })
    }
}
