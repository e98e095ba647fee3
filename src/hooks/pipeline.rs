//! Ordered, strictly sequential hook pipelines.
//!
//! A `Pipeline` is built from the live subset of a key's entries (owning
//! plugin enabled, not skipped), put in execution order, and then driven one
//! handler at a time. Once built it owns everything it needs, so it can be
//! awaited without borrowing the service.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{HooklineError, Result};
use crate::plugins::PluginRegistry;

use super::order::order_entries;
use super::table::HookTable;
use super::types::{
    ApplyMode, ApplyOptions, HookCall, HookEntry, HookHandler, MethodCaller, MethodScope,
};

struct Step {
    plugin_id: Option<String>,
    handler: HookHandler,
}

/// Handlers for one hook key, in execution order.
pub struct Pipeline {
    key: String,
    steps: Vec<Step>,
    methods: Option<MethodCaller>,
}

impl Pipeline {
    /// Select and order the live entries for `key`.
    ///
    /// Entries without an owning plugin (registered by the host) are always
    /// live.
    pub fn build(
        key: &str,
        table: &HookTable,
        registry: &PluginRegistry,
        user_config: &Map<String, Value>,
    ) -> Result<Self> {
        let live: Vec<&HookEntry> = table
            .get(key)
            .iter()
            .filter(|entry| match entry.plugin_id.as_deref() {
                Some(id) => registry.is_enabled(id, user_config),
                None => true,
            })
            .collect();

        let steps = order_entries(key, &live)?
            .into_iter()
            .map(|i| Step {
                plugin_id: live[i].plugin_id.clone(),
                handler: Arc::clone(&live[i].handler),
            })
            .collect();

        Ok(Self {
            key: key.to_string(),
            steps,
            methods: None,
        })
    }

    /// Let handlers call plugin methods through [`HookCall::methods`].
    pub fn with_methods(mut self, methods: Option<MethodCaller>) -> Self {
        self.methods = methods;
        self
    }

    /// Owning plugin of each step, in execution order.
    pub fn plugin_ids(&self) -> Vec<Option<&str>> {
        self.steps.iter().map(|s| s.plugin_id.as_deref()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Drive every handler to completion, one at a time.
    pub async fn run(self, mode: ApplyMode, initial_value: Option<Value>, args: Value) -> Result<Value> {
        debug!(key = %self.key, mode = %mode, hooks = self.steps.len(), "Applying plugins");

        match mode {
            ApplyMode::Add => {
                let mut memo = match initial_value {
                    None => Vec::new(),
                    Some(Value::Array(items)) => items,
                    Some(_) => {
                        return Err(HooklineError::InvalidArgument(format!(
                            "applyPlugins failed for '{}', initial value must be an array if mode is add",
                            self.key
                        )))
                    }
                };
                for step in &self.steps {
                    match self.call(step, Value::Null, &args).await? {
                        Value::Array(items) => memo.extend(items),
                        item => memo.push(item),
                    }
                }
                Ok(Value::Array(memo))
            }
            ApplyMode::Modify => {
                let mut memo = initial_value.unwrap_or(Value::Null);
                for step in &self.steps {
                    memo = self.call(step, memo, &args).await?;
                }
                Ok(memo)
            }
            ApplyMode::Event => {
                for step in &self.steps {
                    self.call(step, Value::Null, &args).await?;
                }
                Ok(Value::Null)
            }
        }
    }

    async fn call(&self, step: &Step, memo: Value, args: &Value) -> Result<Value> {
        let owner = step.plugin_id.as_deref().unwrap_or("<host>");
        let call = HookCall {
            memo,
            args: args.clone(),
            methods: match &self.methods {
                Some(invoke) => MethodScope::new(owner, Arc::clone(invoke)),
                None => MethodScope::default(),
            },
        };
        (step.handler)(call).await.map_err(|e| HooklineError::Hook {
            key: self.key.clone(),
            plugin: owner.to_string(),
            message: format!("{:#}", e),
        })
    }
}

/// Build and drive the pipeline described by `opts`.
pub async fn apply_plugins(
    table: &HookTable,
    registry: &PluginRegistry,
    user_config: &Map<String, Value>,
    opts: ApplyOptions,
) -> Result<Value> {
    let pipeline = Pipeline::build(&opts.key, table, registry, user_config)?;
    pipeline.run(opts.mode, opts.initial_value, opts.args).await
}

/// Frozen view of the hook table and enable policy.
///
/// Produced once initialization has merged every plugin's hooks; handed to
/// command handlers so they can apply hooks and call plugin methods at run
/// time.
#[derive(Clone, Default)]
pub struct HookRunner {
    hooks: Arc<HookTable>,
    registry: Arc<PluginRegistry>,
    user_config: Arc<Map<String, Value>>,
    methods: Option<MethodCaller>,
}

impl HookRunner {
    pub fn new(hooks: HookTable, registry: PluginRegistry, user_config: Map<String, Value>) -> Self {
        Self {
            hooks: Arc::new(hooks),
            registry: Arc::new(registry),
            user_config: Arc::new(user_config),
            methods: None,
        }
    }

    pub fn with_methods(mut self, methods: MethodCaller) -> Self {
        self.methods = Some(methods);
        self
    }

    pub async fn apply_plugins(&self, opts: ApplyOptions) -> Result<Value> {
        let pipeline = Pipeline::build(&opts.key, &self.hooks, &self.registry, &self.user_config)?
            .with_methods(self.methods.clone());
        pipeline.run(opts.mode, opts.initial_value, opts.args).await
    }

    /// Call a plugin method on behalf of `caller`.
    pub fn call_method(&self, caller: &str, name: &str, value: Value) -> Result<Value> {
        match &self.methods {
            Some(invoke) => MethodScope::new(caller, Arc::clone(invoke)).call(name, value),
            None => MethodScope::default().call(name, value),
        }
    }

    pub fn has_plugins<S: AsRef<str>>(&self, ids: &[S]) -> bool {
        self.registry.has_plugins(ids, &self.user_config)
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.registry.is_enabled(id, &self.user_config)
    }

    pub fn hooks(&self) -> &HookTable {
        &self.hooks
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn user_config(&self) -> &Map<String, Value> {
        &self.user_config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::types::{hook_fn, hook_fn_sync};
    use crate::plugins::{plugin_fn, ApplyResult, EnableBy, InlinePlugin, PluginKind, PluginRecord};
    use serde_json::json;
    use std::sync::Mutex;

    fn registry(ids: &[&str]) -> PluginRegistry {
        let mut registry = PluginRegistry::new();
        for id in ids {
            registry.register(PluginRecord::inline(
                PluginKind::Plugin,
                InlinePlugin::new(*id, plugin_fn(|_api| Ok(ApplyResult::none()))),
            ));
        }
        registry
    }

    fn constant(key: &str, owner: &str, stage: i32, value: Value) -> HookEntry {
        HookEntry::new(key, hook_fn_sync(move |_| Ok(value.clone())))
            .owned_by(owner)
            .stage(stage)
    }

    #[tokio::test]
    async fn test_add_concatenates_in_stage_order() {
        let mut table = HookTable::new();
        table.insert(constant("addItems", "b", 1, json!([3])));
        table.insert(constant("addItems", "a", 0, json!([2])));

        let out = apply_plugins(
            &table,
            &registry(&["a", "b"]),
            &Map::new(),
            ApplyOptions::add("addItems").initial_value(json!([1])),
        )
        .await
        .unwrap();
        assert_eq!(out, json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn test_add_scalar_item_is_appended() {
        let mut table = HookTable::new();
        table.insert(constant("addItems", "a", 0, json!("x")));

        let out = apply_plugins(&table, &registry(&["a"]), &Map::new(), ApplyOptions::add("addItems"))
            .await
            .unwrap();
        assert_eq!(out, json!(["x"]));
    }

    #[tokio::test]
    async fn test_add_without_hooks_returns_seed_or_empty() {
        let table = HookTable::new();
        let reg = registry(&[]);
        let out = apply_plugins(&table, &reg, &Map::new(), ApplyOptions::add("none"))
            .await
            .unwrap();
        assert_eq!(out, json!([]));

        let out = apply_plugins(
            &table,
            &reg,
            &Map::new(),
            ApplyOptions::add("none").initial_value(json!([7])),
        )
        .await
        .unwrap();
        assert_eq!(out, json!([7]));
    }

    #[tokio::test]
    async fn test_add_rejects_non_array_seed() {
        let table = HookTable::new();
        let err = apply_plugins(
            &table,
            &registry(&[]),
            &Map::new(),
            ApplyOptions::add("addItems").initial_value(json!({"not": "array"})),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, HooklineError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_modify_threads_accumulator() {
        let mut table = HookTable::new();
        table.insert(
            HookEntry::new(
                "modifyCount",
                hook_fn_sync(|call| Ok(json!(call.memo.as_i64().unwrap() * 2))),
            )
            .owned_by("b")
            .stage(1),
        );
        table.insert(
            HookEntry::new(
                "modifyCount",
                hook_fn_sync(|call| Ok(json!(call.memo.as_i64().unwrap() + 1))),
            )
            .owned_by("a")
            .stage(0),
        );

        let out = apply_plugins(
            &table,
            &registry(&["a", "b"]),
            &Map::new(),
            ApplyOptions::modify("modifyCount").initial_value(json!(0)),
        )
        .await
        .unwrap();
        assert_eq!(out, json!(2));
    }

    #[tokio::test]
    async fn test_modify_receives_args() {
        let mut table = HookTable::new();
        table.insert(
            HookEntry::new(
                "modifyConfig",
                hook_fn_sync(|call| {
                    let mut memo = call.memo;
                    memo["env"] = call.args["env"].clone();
                    Ok(memo)
                }),
            )
            .owned_by("a"),
        );

        let out = apply_plugins(
            &table,
            &registry(&["a"]),
            &Map::new(),
            ApplyOptions::modify("modifyConfig")
                .initial_value(json!({}))
                .args(json!({"env": "production"})),
        )
        .await
        .unwrap();
        assert_eq!(out, json!({"env": "production"}));
    }

    #[tokio::test]
    async fn test_event_runs_sequentially_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut table = HookTable::new();
        for (owner, stage) in [("late", 10), ("early", -10), ("middle", 0)] {
            let log = Arc::clone(&log);
            table.insert(
                HookEntry::new(
                    "onStart",
                    hook_fn(move |_call| {
                        let log = Arc::clone(&log);
                        async move {
                            tokio::task::yield_now().await;
                            log.lock().unwrap().push(owner);
                            Ok(Value::Null)
                        }
                    }),
                )
                .owned_by(owner)
                .stage(stage),
            );
        }

        let out = apply_plugins(
            &table,
            &registry(&["late", "early", "middle"]),
            &Map::new(),
            ApplyOptions::event("onStart"),
        )
        .await
        .unwrap();
        assert_eq!(out, Value::Null);
        assert_eq!(*log.lock().unwrap(), vec!["early", "middle", "late"]);
    }

    #[tokio::test]
    async fn test_skipped_plugin_hooks_are_excluded_in_every_mode() {
        let mut table = HookTable::new();
        table.insert(constant("k", "a", 0, json!([1])));
        table.insert(constant("k", "skipped", 0, json!([99])));

        let mut reg = registry(&["a", "skipped"]);
        reg.skip(["skipped"]);
        assert_eq!(table.get("k").len(), 2);

        let pipeline = Pipeline::build("k", &table, &reg, &Map::new()).unwrap();
        assert_eq!(pipeline.plugin_ids(), vec![Some("a")]);

        let out = apply_plugins(&table, &reg, &Map::new(), ApplyOptions::add("k"))
            .await
            .unwrap();
        assert_eq!(out, json!([1]));

        let out = apply_plugins(&table, &reg, &Map::new(), ApplyOptions::modify("k"))
            .await
            .unwrap();
        assert_eq!(out, json!([1]));

        let fired = Arc::new(Mutex::new(Vec::new()));
        for owner in ["a", "skipped"] {
            let fired = Arc::clone(&fired);
            table.insert(
                HookEntry::new(
                    "onReady",
                    hook_fn_sync(move |_| {
                        fired.lock().unwrap().push(owner);
                        Ok(Value::Null)
                    }),
                )
                .owned_by(owner),
            );
        }
        let out = apply_plugins(&table, &reg, &Map::new(), ApplyOptions::event("onReady"))
            .await
            .unwrap();
        assert_eq!(out, Value::Null);
        assert_eq!(*fired.lock().unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_runner_handlers_call_methods_as_their_owner() {
        let mut table = HookTable::new();
        table.insert(
            HookEntry::new("modifyName", hook_fn_sync(|call| Ok(call.methods.call("greet", call.memo)?)))
                .owned_by("a"),
        );
        let runner = HookRunner::new(table, registry(&["a"]), Map::new()).with_methods(Arc::new(
            |caller: &str, name: &str, value: Value| -> Result<Value> {
                Ok(json!(format!("{} via {}: {}", name, caller, value.as_str().unwrap_or_default())))
            },
        ));

        let out = runner
            .apply_plugins(ApplyOptions::modify("modifyName").initial_value(json!("bob")))
            .await
            .unwrap();
        assert_eq!(out, json!("greet via a: bob"));
        assert_eq!(runner.call_method("host", "greet", json!("x")).unwrap(), json!("greet via host: x"));
    }

    #[tokio::test]
    async fn test_methods_unavailable_without_binding() {
        let mut table = HookTable::new();
        table.insert(
            HookEntry::new("modifyName", hook_fn_sync(|call| Ok(call.methods.call("greet", call.memo)?)))
                .owned_by("a"),
        );
        let err = apply_plugins(&table, &registry(&["a"]), &Map::new(), ApplyOptions::modify("modifyName"))
            .await
            .unwrap_err();
        assert!(matches!(err, HooklineError::Hook { ref plugin, .. } if plugin == "a"));
    }

    #[tokio::test]
    async fn test_config_gated_plugin_joins_when_key_present() {
        let mut reg = PluginRegistry::new();
        reg.register(PluginRecord::inline(
            PluginKind::Plugin,
            InlinePlugin::new("opt", plugin_fn(|_api| Ok(ApplyResult::none())))
                .enable_by(EnableBy::Config),
        ));
        let mut table = HookTable::new();
        table.insert(constant("k", "opt", 0, json!(["opt"])));

        let out = apply_plugins(&table, &reg, &Map::new(), ApplyOptions::add("k"))
            .await
            .unwrap();
        assert_eq!(out, json!([]));

        let mut config = Map::new();
        config.insert("opt".to_string(), json!({}));
        let out = apply_plugins(&table, &reg, &config, ApplyOptions::add("k"))
            .await
            .unwrap();
        assert_eq!(out, json!(["opt"]));
    }

    #[tokio::test]
    async fn test_handler_error_is_wrapped() {
        let mut table = HookTable::new();
        table.insert(
            HookEntry::new("onStart", hook_fn_sync(|_| anyhow::bail!("disk full"))).owned_by("a"),
        );

        let err = apply_plugins(&table, &registry(&["a"]), &Map::new(), ApplyOptions::event("onStart"))
            .await
            .unwrap_err();
        match err {
            HooklineError::Hook { key, plugin, message } => {
                assert_eq!(key, "onStart");
                assert_eq!(plugin, "a");
                assert_eq!(message, "disk full");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_error_stops_pipeline() {
        let ran = Arc::new(Mutex::new(false));
        let sink = Arc::clone(&ran);
        let mut table = HookTable::new();
        table.insert(HookEntry::new("k", hook_fn_sync(|_| anyhow::bail!("nope"))).owned_by("a"));
        table.insert(
            HookEntry::new(
                "k",
                hook_fn_sync(move |_| {
                    *sink.lock().unwrap() = true;
                    Ok(Value::Null)
                }),
            )
            .owned_by("b"),
        );

        assert!(apply_plugins(&table, &registry(&["a", "b"]), &Map::new(), ApplyOptions::event("k"))
            .await
            .is_err());
        assert!(!*ran.lock().unwrap());
    }

    #[tokio::test]
    async fn test_host_entries_are_always_live() {
        let mut table = HookTable::new();
        table.insert(HookEntry::new("k", hook_fn_sync(|_| Ok(json!([1])))));

        let out = apply_plugins(&table, &registry(&[]), &Map::new(), ApplyOptions::add("k"))
            .await
            .unwrap();
        assert_eq!(out, json!([1]));
    }

    #[tokio::test]
    async fn test_hook_runner_snapshot() {
        let mut table = HookTable::new();
        table.insert(constant("k", "a", 0, json!([1])));
        let runner = HookRunner::new(table, registry(&["a"]), Map::new());

        assert!(runner.has_plugins(&["a"]));
        assert!(runner.is_enabled("a"));
        assert_eq!(runner.hooks().len(), 1);
        let out = runner.apply_plugins(ApplyOptions::add("k")).await.unwrap();
        assert_eq!(out, json!([1]));
    }
}
