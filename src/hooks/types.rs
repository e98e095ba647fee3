//! Hook types: handlers, entries and application options.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{HooklineError, Result};

/// What a handler receives for one pipeline step.
#[derive(Debug, Clone, Default)]
pub struct HookCall {
    /// Running accumulator (`modify` only; `Null` otherwise).
    pub memo: Value,
    /// Caller-supplied arguments, identical for every step.
    pub args: Value,
    /// Plugin methods, callable on behalf of the step's owner.
    pub methods: MethodScope,
}

/// Invokes a plugin method by name: `(caller id, method name, argument)`.
pub type MethodCaller = Arc<dyn Fn(&str, &str, Value) -> Result<Value> + Send + Sync>;

/// Method lookup bound to one caller, resolved when the handler runs.
#[derive(Clone, Default)]
pub struct MethodScope {
    caller: String,
    invoke: Option<MethodCaller>,
}

impl MethodScope {
    pub fn new(caller: impl Into<String>, invoke: MethodCaller) -> Self {
        Self {
            caller: caller.into(),
            invoke: Some(invoke),
        }
    }

    /// Id of the plugin calls are made for.
    pub fn caller(&self) -> &str {
        &self.caller
    }

    /// Call the method registered under `name`.
    pub fn call(&self, name: &str, value: Value) -> Result<Value> {
        match &self.invoke {
            Some(invoke) => invoke(&self.caller, name, value),
            None => Err(HooklineError::InvalidArgument(format!(
                "api.{}() is not available outside a service run",
                name
            ))),
        }
    }
}

impl fmt::Debug for MethodScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodScope")
            .field("caller", &self.caller)
            .field("bound", &self.invoke.is_some())
            .finish()
    }
}

/// Type-erased async hook handler.
pub type HookHandler = Arc<dyn Fn(HookCall) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Wrap an async closure as a [`HookHandler`].
pub fn hook_fn<F, Fut>(f: F) -> HookHandler
where
    F: Fn(HookCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(move |call| Box::pin(f(call)))
}

/// Wrap a synchronous closure as a [`HookHandler`].
pub fn hook_fn_sync<F>(f: F) -> HookHandler
where
    F: Fn(HookCall) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Arc::new(move |call| {
        let result = f(call);
        Box::pin(async move { result })
    })
}

/// A handler attached to a hook key.
#[derive(Clone)]
pub struct HookEntry {
    /// Hook key the handler attaches to.
    pub key: String,
    pub handler: HookHandler,
    /// Owning plugin; stamped when pending hooks are merged into the table.
    pub plugin_id: Option<String>,
    /// Lower stages run earlier.
    pub stage: i32,
    /// Run before every entry owned by this plugin id.
    pub before: Option<String>,
}

impl HookEntry {
    /// Create an entry at stage 0 with no ordering constraint.
    pub fn new(key: impl Into<String>, handler: HookHandler) -> Self {
        Self {
            key: key.into(),
            handler,
            plugin_id: None,
            stage: 0,
            before: None,
        }
    }

    pub fn stage(mut self, stage: i32) -> Self {
        self.stage = stage;
        self
    }

    pub fn before(mut self, plugin_id: impl Into<String>) -> Self {
        self.before = Some(plugin_id.into());
        self
    }

    pub fn owned_by(mut self, plugin_id: impl Into<String>) -> Self {
        self.plugin_id = Some(plugin_id.into());
        self
    }
}

impl fmt::Debug for HookEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookEntry")
            .field("key", &self.key)
            .field("plugin_id", &self.plugin_id)
            .field("stage", &self.stage)
            .field("before", &self.before)
            .finish()
    }
}

/// How the results of a hook pipeline are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyMode {
    /// Concatenate each handler's items onto an array seed.
    Add,
    /// Thread an accumulator through each handler.
    Modify,
    /// Run handlers for side effects only.
    Event,
}

impl ApplyMode {
    /// All modes, as exposed through the `ApplyPluginsType` lookup.
    pub const ALL: [ApplyMode; 3] = [ApplyMode::Add, ApplyMode::Modify, ApplyMode::Event];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyMode::Add => "add",
            ApplyMode::Modify => "modify",
            ApplyMode::Event => "event",
        }
    }
}

impl fmt::Display for ApplyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplyMode {
    type Err = HooklineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "add" => Ok(ApplyMode::Add),
            "modify" => Ok(ApplyMode::Modify),
            "event" => Ok(ApplyMode::Event),
            other => Err(HooklineError::UnsupportedMode(format!(
                "applyPlugins failed, type is not defined or is not matched, got '{}'",
                other
            ))),
        }
    }
}

/// Parameters of one hook application.
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    pub key: String,
    pub mode: ApplyMode,
    /// Seed for `add` (must be an array) and `modify`.
    pub initial_value: Option<Value>,
    pub args: Value,
}

impl ApplyOptions {
    pub fn new(key: impl Into<String>, mode: ApplyMode) -> Self {
        Self {
            key: key.into(),
            mode,
            initial_value: None,
            args: Value::Null,
        }
    }

    pub fn add(key: impl Into<String>) -> Self {
        Self::new(key, ApplyMode::Add)
    }

    pub fn modify(key: impl Into<String>) -> Self {
        Self::new(key, ApplyMode::Modify)
    }

    pub fn event(key: impl Into<String>) -> Self {
        Self::new(key, ApplyMode::Event)
    }

    pub fn initial_value(mut self, value: Value) -> Self {
        self.initial_value = Some(value);
        self
    }

    pub fn args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }
}
