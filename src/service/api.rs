//! The facade a preset or plugin sees while it applies.
//!
//! A fresh `PluginApi` is built for every apply call. It carries the
//! plugin's identity and a mutable borrow of the run's `ServiceState`, and
//! resolves dynamic names through an explicit lookup order:
//!
//! 1. methods registered by any plugin so far
//! 2. values in the service's additive extension slot
//! 3. a fixed allow-list of service members
//!
//! Lookup happens at call time, so plugin B can use a method plugin A
//! registered earlier in the same run.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::commands::Command;
use crate::config::{PackageDescriptor, UserConfig};
use crate::error::{HooklineError, Result};
use crate::hooks::{ApplyMode, ApplyOptions, HookEntry, HookHandler};

use super::stage::Stage;
use super::state::ServiceState;

/// Event hook applied before a command runs.
pub const ON_START: &str = "onStart";

/// Event hook applied once every plugin has registered.
pub const ON_PLUGIN_READY: &str = "onPluginReady";

/// Hook shortcuts installed on every facade.
pub const BUILTIN_METHODS: [&str; 2] = [ON_START, ON_PLUGIN_READY];

/// Service members readable through [`PluginApi::get`], in lookup order.
pub const SERVICE_MEMBERS: [&str; 10] = [
    "applyPlugins",
    "cwd",
    "pkg",
    "env",
    "userConfig",
    "config",
    "stage",
    "configName",
    "hasPlugins",
    "ApplyPluginsType",
];

/// A plugin-registered method body. Receives the calling plugin's facade.
pub type MethodFn =
    Arc<dyn Fn(&mut PluginApi<'_>, Value) -> anyhow::Result<Value> + Send + Sync>;

/// Wrap a closure as a [`MethodFn`].
pub fn method_fn<F>(f: F) -> MethodFn
where
    F: for<'a, 'b> Fn(&'a mut PluginApi<'b>, Value) -> anyhow::Result<Value>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Entry in the shared method table.
#[derive(Clone)]
pub enum PluginMethod {
    /// Calling the method registers its argument as a hook under the
    /// method's name, owned by the caller.
    HookShortcut,
    Custom(MethodFn),
}

impl fmt::Debug for PluginMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginMethod::HookShortcut => write!(f, "HookShortcut"),
            PluginMethod::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Argument passed to a plugin method.
pub enum MethodArg {
    Hook(HookHandler),
    Value(Value),
}

impl From<HookHandler> for MethodArg {
    fn from(handler: HookHandler) -> Self {
        MethodArg::Hook(handler)
    }
}

impl From<Value> for MethodArg {
    fn from(value: Value) -> Self {
        MethodArg::Value(value)
    }
}

/// Result of a dynamic name lookup.
#[derive(Debug, Clone)]
pub enum ApiMember {
    Method(PluginMethod),
    Extension(Value),
    Service(ServiceMember),
}

/// An allow-listed service member.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceMember {
    /// Use [`PluginApi::apply_plugins`].
    ApplyPlugins,
    /// Use [`PluginApi::has_plugins`].
    HasPlugins,
    Value(Value),
}

/// Registration and lookup surface for one plugin.
pub struct PluginApi<'a> {
    id: String,
    key: String,
    state: &'a mut ServiceState,
}

impl<'a> PluginApi<'a> {
    pub fn new(id: impl Into<String>, key: impl Into<String>, state: &'a mut ServiceState) -> Self {
        let mut api = Self {
            id: id.into(),
            key: key.into(),
            state,
        };
        for name in BUILTIN_METHODS {
            api.install_method(name, PluginMethod::HookShortcut);
        }
        api
    }

    /// Id of the plugin this facade belongs to.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Config key of the plugin this facade belongs to.
    pub fn key(&self) -> &str {
        &self.key
    }

    // ---- registration ----

    /// Install a method in the shared method table.
    ///
    /// Without a body the method becomes a hook shortcut. A duplicate name
    /// fails when `fail_on_duplicate` is set and is ignored otherwise.
    pub fn register_method(
        &mut self,
        name: &str,
        method: Option<MethodFn>,
        fail_on_duplicate: bool,
    ) -> Result<()> {
        let method = match method {
            Some(f) => PluginMethod::Custom(f),
            None => PluginMethod::HookShortcut,
        };
        if !self.install_method(name, method) && fail_on_duplicate {
            return Err(HooklineError::DuplicateRegistration(format!(
                "api.registerMethod() failed, method {} is already exist",
                name
            )));
        }
        Ok(())
    }

    fn install_method(&mut self, name: &str, method: PluginMethod) -> bool {
        if self.state.methods.contains_key(name) {
            return false;
        }
        debug!(plugin = %self.id, method = %name, "Registered method");
        self.state.methods.insert(name.to_string(), method);
        true
    }

    /// Queue a hook for this plugin. It joins the hook table after init.
    pub fn register(&mut self, entry: HookEntry) {
        debug!(plugin = %self.id, key = %entry.key, stage = entry.stage, "Registered hook");
        self.state.push_pending(&self.id, entry);
    }

    /// Register a command and its alias.
    pub fn register_command(&mut self, command: Command) -> Result<()> {
        self.state.commands.register(command)
    }

    /// Exclude plugins from every pipeline for the rest of the run.
    pub fn skip_plugins<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.registry.skip(ids);
    }

    // ---- dynamic lookup ----

    /// Resolve a name: plugin methods, then the additive slot, then the
    /// service allow-list. Members with no value (`config` before it is
    /// set, an absent `configName`) resolve to `None`.
    pub fn get(&self, name: &str) -> Option<ApiMember> {
        if let Some(method) = self.state.methods.get(name) {
            return Some(ApiMember::Method(method.clone()));
        }

        if let Some(value) = self.state.additive.get(name).filter(|v| !v.is_null()) {
            return Some(ApiMember::Extension(value.clone()));
        }

        let member = match name {
            "applyPlugins" => ServiceMember::ApplyPlugins,
            "hasPlugins" => ServiceMember::HasPlugins,
            "cwd" => ServiceMember::Value(Value::String(self.cwd().display().to_string())),
            "pkg" => ServiceMember::Value(self.pkg().to_value()),
            "env" => ServiceMember::Value(Value::String(self.env().to_string())),
            "userConfig" => ServiceMember::Value(Value::Object(self.user_config().clone())),
            "config" => ServiceMember::Value(self.config()?.clone()),
            "stage" => ServiceMember::Value(Value::String(self.stage().to_string())),
            "configName" => ServiceMember::Value(Value::String(self.config_name()?.to_string())),
            "ApplyPluginsType" => ServiceMember::Value(Value::Object(
                ApplyMode::ALL
                    .iter()
                    .map(|mode| (mode.as_str().to_string(), Value::String(mode.to_string())))
                    .collect::<Map<String, Value>>(),
            )),
            _ => return None,
        };
        Some(ApiMember::Service(member))
    }

    /// Invoke a plugin-registered method on behalf of this plugin.
    pub fn call(&mut self, name: &str, arg: impl Into<MethodArg>) -> Result<Value> {
        let method = self.state.methods.get(name).cloned().ok_or_else(|| {
            HooklineError::InvalidArgument(format!("api.{}() is not a registered method", name))
        })?;

        match (method, arg.into()) {
            (PluginMethod::HookShortcut, MethodArg::Hook(handler)) => {
                self.register(HookEntry::new(name, handler));
                Ok(Value::Null)
            }
            (PluginMethod::HookShortcut, MethodArg::Value(_)) => {
                Err(HooklineError::InvalidArgument(format!(
                    "api.{}() expects a hook handler",
                    name
                )))
            }
            (PluginMethod::Custom(f), MethodArg::Value(value)) => {
                f(self, value).map_err(|e| HooklineError::Hook {
                    key: name.to_string(),
                    plugin: self.id.clone(),
                    message: format!("{:#}", e),
                })
            }
            (PluginMethod::Custom(_), MethodArg::Hook(_)) => {
                Err(HooklineError::InvalidArgument(format!(
                    "api.{}() expects a value argument",
                    name
                )))
            }
        }
    }

    /// Shortcut for `call("onStart", handler)`.
    pub fn on_start(&mut self, handler: HookHandler) -> Result<()> {
        self.call(ON_START, handler).map(|_| ())
    }

    /// Shortcut for `call("onPluginReady", handler)`.
    pub fn on_plugin_ready(&mut self, handler: HookHandler) -> Result<()> {
        self.call(ON_PLUGIN_READY, handler).map(|_| ())
    }

    // ---- service members ----

    pub fn cwd(&self) -> &Path {
        self.state.cwd()
    }

    pub fn pkg(&self) -> &PackageDescriptor {
        self.state.pkg()
    }

    pub fn env(&self) -> &str {
        self.state.env()
    }

    pub fn user_config(&self) -> &UserConfig {
        self.state.user_config()
    }

    pub fn config(&self) -> Option<&Value> {
        self.state.config()
    }

    pub fn stage(&self) -> Stage {
        self.state.stage()
    }

    pub fn config_name(&self) -> Option<&str> {
        self.state.config_name()
    }

    /// Whether every id is a registered, enabled, non-preset plugin.
    pub fn has_plugins<S: AsRef<str>>(&self, ids: &[S]) -> bool {
        self.state
            .registry
            .has_plugins(ids, &self.state.user_config)
    }

    /// Apply hooks merged so far. During init the table is still empty.
    pub async fn apply_plugins(&self, opts: ApplyOptions) -> Result<Value> {
        let runner = self.state.snapshot();
        runner.apply_plugins(opts).await
    }
}
