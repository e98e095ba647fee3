//! The lifecycle engine.
//!
//! `Service` owns one run: it resolves presets and plugins at construction,
//! applies them in order during `init`, freezes the hook table, and then
//! dispatches commands.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::commands::{CommandArgs, CommandContext, CommandTable};
use crate::config::{self, ConfigLoader, PackageDescriptor, ServiceOptions, UserConfig};
use crate::error::{HooklineError, Result};
use crate::hooks::{ApplyOptions, HookRunner, HookTable};
use crate::plugins::{
    PluginKind, PluginLoader, PluginRecord, PluginRegistry, PluginResolver, StaticLoader,
};

use super::api::{PluginApi, ON_PLUGIN_READY, ON_START};
use super::stage::Stage;
use super::state::ServiceState;

/// One run of the plugin lifecycle.
pub struct Service {
    state: ServiceState,
    resolver: PluginResolver,
    initial_presets: VecDeque<PluginRecord>,
    initial_plugins: VecDeque<PluginRecord>,
    /// Plugins awaiting apply: preset contributions first, then the initial
    /// plugins, extended as plugins return more.
    plugin_queue: VecDeque<PluginRecord>,
    runner: Option<HookRunner>,
    plugin_ready: Option<JoinHandle<Result<Value>>>,
}

impl Service {
    /// Construct a service: load `.env` and the user config, then resolve
    /// every preset and plugin source.
    pub fn new(opts: ServiceOptions) -> Result<Self> {
        let cwd = match opts.cwd {
            Some(cwd) => cwd,
            None => std::env::current_dir()?,
        };
        if !cwd.is_dir() {
            return Err(HooklineError::Config(format!(
                "cwd {} does not exist",
                cwd.display()
            )));
        }

        let pkg = opts
            .pkg
            .unwrap_or_else(|| PackageDescriptor::read_or_default(&cwd));
        let env = config::resolve_env(opts.env.as_deref());
        config::load_dotenv(&cwd)?;

        let user_config = ConfigLoader::new(cwd.clone()).user_config(opts.config_name.as_deref())?;
        let user_presets = config::string_list(&user_config, "presets")?;
        let user_plugins = config::string_list(&user_config, "plugins")?;

        let loader = opts
            .loader
            .unwrap_or_else(|| Arc::new(StaticLoader::new()) as Arc<dyn PluginLoader>);
        let mut resolver = PluginResolver::new(cwd.clone(), loader);
        if let Some(modules) = opts.module_resolver {
            resolver = resolver.with_module_resolver(modules);
        }
        if let Some(packages) = opts.package_locator {
            resolver = resolver.with_package_locator(packages);
        }

        let presets = resolver.resolve_all(PluginKind::Preset, &opts.presets, &user_presets)?;
        let plugins = resolver.resolve_all(PluginKind::Plugin, &opts.plugins, &user_plugins)?;

        info!(
            cwd = %cwd.display(),
            env = %env,
            presets = presets.len(),
            plugins = plugins.len(),
            "Service created"
        );

        let mut state = ServiceState::new(cwd, pkg, env, opts.config_name, user_config);
        state.advance(Stage::Constructor)?;

        Ok(Self {
            state,
            resolver,
            initial_presets: presets.into(),
            initial_plugins: plugins.into(),
            plugin_queue: VecDeque::new(),
            runner: None,
            plugin_ready: None,
        })
    }

    /// Apply every preset, then every plugin, merge their hooks and fire
    /// `onPluginReady` without waiting for it.
    pub async fn init(&mut self) -> Result<()> {
        self.state.advance(Stage::Init)?;

        self.state.advance(Stage::InitPresets)?;
        while let Some(preset) = self.initial_presets.pop_front() {
            self.init_record(preset).await?;
        }

        self.state.advance(Stage::InitPlugins)?;
        let initial = std::mem::take(&mut self.initial_plugins);
        self.plugin_queue.extend(initial);
        while let Some(plugin) = self.plugin_queue.pop_front() {
            self.init_record(plugin).await?;
        }

        self.state.advance(Stage::InitHooks)?;
        let merged = self.state.merge_pending();
        let runner = self.state.snapshot();
        self.runner = Some(runner.clone());
        info!(
            plugins = self.state.registry.len(),
            hooks = merged,
            "Plugins initialized"
        );

        self.state.advance(Stage::PluginReady)?;
        self.plugin_ready = Some(tokio::spawn(async move {
            let result = runner
                .apply_plugins(ApplyOptions::event(ON_PLUGIN_READY))
                .await;
            if let Err(ref e) = result {
                warn!(error = %e, "onPluginReady failed");
            }
            result
        }));

        Ok(())
    }

    async fn init_record(&mut self, record: PluginRecord) -> Result<()> {
        if self.state.registry.contains(&record.id) {
            return Err(HooklineError::DuplicateRegistration(format!(
                "{} {} is already registered",
                record.kind, record.id
            )));
        }

        let plugin = record.instantiate()?;
        let id = record.id.clone();
        let key = record.key.clone();
        let kind = record.kind;
        let path = record.display_path();
        self.state.registry.register(record);

        let mut api = PluginApi::new(id.clone(), key, &mut self.state);
        let applied = plugin.apply(&mut api).await;
        drop(api);

        // Engine errors raised inside apply keep their kind
        let result = applied.map_err(|e| match e.downcast::<HooklineError>() {
            Ok(err) => err,
            Err(e) => HooklineError::PluginApply {
                kind,
                path,
                message: format!("{:#}", e),
            },
        })?;

        if !result.presets.is_empty() {
            if kind == PluginKind::Preset {
                warn!(
                    plugin = %id,
                    count = result.presets.len(),
                    "Presets returned from a preset are not supported, ignoring"
                );
            } else {
                return Err(HooklineError::InvalidArgument(format!(
                    "plugin {} returned presets, only presets may be returned from presets",
                    id
                )));
            }
        }

        for source in &result.plugins {
            let extra = self.resolver.resolve(PluginKind::Plugin, source)?;
            debug!(plugin = %id, extra = %extra.id, "Queued plugin");
            self.plugin_queue.push_back(extra);
        }

        Ok(())
    }

    /// Wait for the `onPluginReady` event spawned by `init`.
    ///
    /// Returns `Null` when `init` has not run or the event was already awaited.
    pub async fn plugin_ready_settled(&mut self) -> Result<Value> {
        match self.plugin_ready.take() {
            None => Ok(Value::Null),
            Some(handle) => handle.await.map_err(|e| HooklineError::Hook {
                key: ON_PLUGIN_READY.to_string(),
                plugin: "<runtime>".to_string(),
                message: e.to_string(),
            })?,
        }
    }

    /// Initialize, announce `onStart`, then run the named command.
    ///
    /// `onPluginReady` settles before `onStart` so event handlers never
    /// overlap. A failed ready event is logged and does not stop the run.
    pub async fn run(&mut self, name: &str, args: CommandArgs) -> Result<Value> {
        self.init().await?;
        if let Err(e) = self.plugin_ready_settled().await {
            debug!(error = %e, "Continuing after onPluginReady failure");
        }

        self.apply_plugins(
            ApplyOptions::event(ON_START).args(json!({ "args": args.to_value() })),
        )
        .await?;

        self.state.advance(Stage::Run)?;
        self.run_command(name, args).await
    }

    /// Dispatch a command by name or alias.
    ///
    /// A leading positional equal to `name` is dropped before the handler
    /// sees the args.
    pub async fn run_command(&self, name: &str, mut args: CommandArgs) -> Result<Value> {
        args.strip_command(name);

        let command = self
            .state
            .commands
            .resolve(name)
            .cloned()
            .ok_or_else(|| HooklineError::CommandNotFound(name.to_string()))?;

        info!(command = %command.name, requested = %name, "Running command");
        let ctx = CommandContext {
            args,
            hooks: self.hook_runner(),
        };
        (command.handler)(ctx)
            .await
            .map_err(|e| HooklineError::Command {
                name: command.name.clone(),
                message: format!("{:#}", e),
            })
    }

    /// Apply the hooks registered under `opts.key`.
    pub async fn apply_plugins(&self, opts: ApplyOptions) -> Result<Value> {
        self.hook_runner().apply_plugins(opts).await
    }

    /// Frozen hooks for run-time use; a fresh snapshot before `init`.
    pub fn hook_runner(&self) -> HookRunner {
        self.runner
            .clone()
            .unwrap_or_else(|| self.state.snapshot())
    }

    /// Move the lifecycle forward, e.g. through `GetConfig` and `GetPaths`.
    pub fn advance(&mut self, stage: Stage) -> Result<()> {
        self.state.advance(stage)
    }

    pub fn has_plugins<S: AsRef<str>>(&self, ids: &[S]) -> bool {
        self.state.registry.has_plugins(ids, &self.state.user_config)
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.state.registry.is_enabled(id, &self.state.user_config)
    }

    /// Store a value in the additive slot, readable through `PluginApi::get`.
    pub fn set_additive(&mut self, name: impl Into<String>, value: Value) {
        self.state.additive.insert(name.into(), value);
    }

    /// Store the resolved config, readable as `config` through the facade.
    pub fn set_config(&mut self, config: Value) {
        self.state.config = Some(config);
    }

    pub fn state(&self) -> &ServiceState {
        &self.state
    }

    pub fn stage(&self) -> Stage {
        self.state.stage()
    }

    pub fn stage_history(&self) -> &[Stage] {
        self.state.stage_history()
    }

    pub fn cwd(&self) -> &Path {
        self.state.cwd()
    }

    pub fn env(&self) -> &str {
        self.state.env()
    }

    pub fn pkg(&self) -> &PackageDescriptor {
        self.state.pkg()
    }

    pub fn user_config(&self) -> &UserConfig {
        self.state.user_config()
    }

    pub fn registry(&self) -> &PluginRegistry {
        self.state.registry()
    }

    pub fn hooks(&self) -> &HookTable {
        self.state.hooks()
    }

    pub fn commands(&self) -> &CommandTable {
        self.state.commands()
    }
}
