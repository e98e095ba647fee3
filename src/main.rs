use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use hookline::builtin;
use hookline::commands::CommandArgs;
use hookline::{Service, ServiceOptions};

const DEFAULT_CONFIG_FILE: &str = ".hooklinerc.json";

#[derive(Parser)]
#[command(name = "hookline")]
#[command(about = "Plugin lifecycle and hook runner", long_about = None, version)]
struct Cli {
    /// Working directory (defaults to the current directory)
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// User config file, relative to the working directory
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: String,

    /// Env name (defaults to $NODE_ENV, then "development")
    #[arg(long)]
    env: Option<String>,

    /// Extra preset to load (repeatable)
    #[arg(long = "preset", value_name = "ID")]
    presets: Vec<String>,

    /// Extra plugin to load (repeatable)
    #[arg(long = "plugin", value_name = "ID")]
    plugins: Vec<String>,

    /// Command to run
    command: String,

    /// Command arguments and options
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut opts = ServiceOptions {
        cwd: cli.cwd,
        env: cli.env,
        config_name: Some(cli.config),
        ..Default::default()
    }
    .preset(builtin::preset());
    for preset in cli.presets {
        opts = opts.preset(preset);
    }
    for plugin in cli.plugins {
        opts = opts.plugin(plugin);
    }

    let mut service = Service::new(opts).context("Failed to create service")?;

    let args = CommandArgs::from_tokens(std::iter::once(cli.command.clone()).chain(cli.args));
    let output = service
        .run(&cli.command, args)
        .await
        .with_context(|| format!("Command '{}' failed", cli.command))?;

    match output {
        Value::Null => {}
        Value::String(s) => println!("{}", s),
        other => println!("{}", serde_json::to_string_pretty(&other)?),
    }

    Ok(())
}
