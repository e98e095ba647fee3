//! Built-in preset shipped with the `hookline` binary.
//!
//! Contributes:
//! - `version` (alias `v`): the crate name and version
//! - `config`: the user config after every `modifyConfig` hook, or one
//!   member of it when a key is given
//! - the `modifyConfig` hook shortcut

use serde_json::{json, Value};

use crate::commands::{command_fn, Command, CommandContext};
use crate::hooks::ApplyOptions;
use crate::plugins::{plugin_fn, ApplyResult, InlinePlugin};

/// Id of the built-in preset.
pub const PRESET_ID: &str = "@hookline/preset-builtin";

/// Hook applied by the `config` command.
pub const MODIFY_CONFIG: &str = "modifyConfig";

/// The built-in preset.
pub fn preset() -> InlinePlugin {
    InlinePlugin::new(
        PRESET_ID,
        plugin_fn(|api| {
            api.register_method(MODIFY_CONFIG, None, false)?;

            api.register_command(
                Command::new("version", command_fn(|_ctx| async { Ok(version()) }))
                    .alias("v")
                    .description("show hookline version"),
            )?;

            api.register_command(
                Command::new("config", command_fn(resolved_config))
                    .description("print the resolved user config")
                    .details("hookline config [key]"),
            )?;

            Ok(ApplyResult::none())
        }),
    )
}

fn version() -> Value {
    json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    })
}

async fn resolved_config(ctx: CommandContext) -> anyhow::Result<Value> {
    let seed = Value::Object(ctx.hooks.user_config().clone());
    let config = ctx
        .hooks
        .apply_plugins(
            ApplyOptions::modify(MODIFY_CONFIG)
                .initial_value(seed)
                .args(ctx.args.to_value()),
        )
        .await?;

    match ctx.args.positionals.first() {
        Some(key) => Ok(config.get(key).cloned().unwrap_or(Value::Null)),
        None => Ok(config),
    }
}
