//! Per-run service state.
//!
//! One `ServiceState` is owned by one `Service`; plugin facades borrow it
//! mutably for the duration of an apply call. Nothing here is global, so
//! independent runs can coexist in one process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::info;

use crate::commands::CommandTable;
use crate::config::{PackageDescriptor, UserConfig};
use crate::error::{HooklineError, Result};
use crate::hooks::{HookEntry, HookRunner, HookTable};
use crate::plugins::PluginRegistry;

use super::api::{PluginApi, PluginMethod};
use super::stage::Stage;

/// The context object shared by the lifecycle engine and plugin facades.
#[derive(Clone)]
pub struct ServiceState {
    pub(crate) cwd: PathBuf,
    pub(crate) pkg: PackageDescriptor,
    pub(crate) env: String,
    pub(crate) config_name: Option<String>,
    pub(crate) user_config: UserConfig,
    /// Resolved config; set by the host, absent until then.
    pub(crate) config: Option<Value>,
    stage: Stage,
    stage_history: Vec<Stage>,
    pub(crate) registry: PluginRegistry,
    pub(crate) hooks: HookTable,
    /// Hooks registered during apply, per plugin id, in first-registration order.
    pending_hooks: Vec<(String, Vec<HookEntry>)>,
    pub(crate) commands: CommandTable,
    pub(crate) methods: HashMap<String, PluginMethod>,
    /// Free-form extension slot for hosts building on the service.
    pub(crate) additive: Map<String, Value>,
}

impl ServiceState {
    pub fn new(
        cwd: PathBuf,
        pkg: PackageDescriptor,
        env: String,
        config_name: Option<String>,
        user_config: UserConfig,
    ) -> Self {
        Self {
            cwd,
            pkg,
            env,
            config_name,
            user_config,
            config: None,
            stage: Stage::Uninitialized,
            stage_history: vec![Stage::Uninitialized],
            registry: PluginRegistry::new(),
            hooks: HookTable::new(),
            pending_hooks: Vec::new(),
            commands: CommandTable::new(),
            methods: HashMap::new(),
            additive: Map::new(),
        }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn pkg(&self) -> &PackageDescriptor {
        &self.pkg
    }

    pub fn env(&self) -> &str {
        &self.env
    }

    pub fn config_name(&self) -> Option<&str> {
        self.config_name.as_deref()
    }

    pub fn user_config(&self) -> &UserConfig {
        &self.user_config
    }

    pub fn config(&self) -> Option<&Value> {
        self.config.as_ref()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Every stage entered so far, oldest first.
    pub fn stage_history(&self) -> &[Stage] {
        &self.stage_history
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn hooks(&self) -> &HookTable {
        &self.hooks
    }

    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    pub fn additive(&self) -> &Map<String, Value> {
        &self.additive
    }

    /// Move to `stage`.
    ///
    /// Re-entering the current stage is a no-op; moving backwards fails.
    pub fn advance(&mut self, stage: Stage) -> Result<()> {
        if stage < self.stage {
            return Err(HooklineError::StageRegression {
                from: self.stage,
                to: stage,
            });
        }
        if stage == self.stage {
            return Ok(());
        }
        info!(from = %self.stage, to = %stage, "Stage changed");
        self.stage = stage;
        self.stage_history.push(stage);
        Ok(())
    }

    /// Queue a hook for `plugin_id`; merged into the table after init.
    pub(crate) fn push_pending(&mut self, plugin_id: &str, entry: HookEntry) {
        match self.pending_hooks.iter_mut().find(|(id, _)| id == plugin_id) {
            Some((_, entries)) => entries.push(entry),
            None => self
                .pending_hooks
                .push((plugin_id.to_string(), vec![entry])),
        }
    }

    /// Number of hooks still waiting to be merged.
    pub fn pending_len(&self) -> usize {
        self.pending_hooks.iter().map(|(_, entries)| entries.len()).sum()
    }

    /// Move every pending hook into the table, stamping its owner.
    pub(crate) fn merge_pending(&mut self) -> usize {
        let mut merged = 0;
        for (plugin_id, entries) in self.pending_hooks.drain(..) {
            for mut entry in entries {
                entry.plugin_id = Some(plugin_id.clone());
                self.hooks.insert(entry);
                merged += 1;
            }
        }
        merged
    }

    /// Freeze the current table, enable policy and method table for
    /// run-time use.
    ///
    /// Methods called through the runner see a facade over a scratch copy of
    /// this state, so anything they register is dropped.
    pub fn snapshot(&self) -> HookRunner {
        let frozen = Arc::new(self.clone());
        HookRunner::new(
            self.hooks.clone(),
            self.registry.clone(),
            self.user_config.clone(),
        )
        .with_methods(Arc::new(move |caller: &str, name: &str, value: Value| {
            let mut scratch = ServiceState::clone(&frozen);
            let key = scratch
                .registry
                .get(caller)
                .map(|record| record.key.clone())
                .unwrap_or_else(|| caller.to_string());
            let mut api = PluginApi::new(caller, key, &mut scratch);
            api.call(name, value)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::hook_fn_sync;

    fn state() -> ServiceState {
        ServiceState::new(
            PathBuf::from("/work"),
            PackageDescriptor::default(),
            "test".to_string(),
            None,
            UserConfig::new(),
        )
    }

    fn entry(key: &str) -> HookEntry {
        HookEntry::new(key, hook_fn_sync(|_| Ok(Value::Null)))
    }

    // ---- stages ----

    #[test]
    fn test_advance_forward_and_same() {
        let mut state = state();
        state.advance(Stage::Constructor).unwrap();
        state.advance(Stage::Init).unwrap();
        state.advance(Stage::Init).unwrap();
        assert_eq!(state.stage(), Stage::Init);
        assert_eq!(
            state.stage_history(),
            &[Stage::Uninitialized, Stage::Constructor, Stage::Init]
        );
    }

    #[test]
    fn test_advance_backwards_fails() {
        let mut state = state();
        state.advance(Stage::Run).unwrap();
        let err = state.advance(Stage::Init).unwrap_err();
        assert!(matches!(
            err,
            HooklineError::StageRegression {
                from: Stage::Run,
                to: Stage::Init
            }
        ));
        assert_eq!(state.stage(), Stage::Run);
    }

    // ---- pending hooks ----

    #[test]
    fn test_merge_pending_stamps_owner_in_plugin_order() {
        let mut state = state();
        state.push_pending("b", entry("k"));
        state.push_pending("a", entry("k"));
        state.push_pending("b", entry("other").owned_by("spoofed"));
        assert_eq!(state.pending_len(), 3);
        assert!(state.hooks().is_empty());

        assert_eq!(state.merge_pending(), 3);
        assert_eq!(state.pending_len(), 0);

        let owners: Vec<_> = state
            .hooks()
            .get("k")
            .iter()
            .map(|e| e.plugin_id.as_deref().unwrap())
            .collect();
        assert_eq!(owners, vec!["b", "a"]);
        assert_eq!(state.hooks().get("other")[0].plugin_id.as_deref(), Some("b"));
    }
}
