//! Lifecycle stages.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Phase of a service run. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Uninitialized,
    Constructor,
    Init,
    InitPresets,
    InitPlugins,
    InitHooks,
    PluginReady,
    GetConfig,
    GetPaths,
    Run,
}

impl Stage {
    /// Every stage, in lifecycle order.
    pub const ALL: [Stage; 10] = [
        Stage::Uninitialized,
        Stage::Constructor,
        Stage::Init,
        Stage::InitPresets,
        Stage::InitPlugins,
        Stage::InitHooks,
        Stage::PluginReady,
        Stage::GetConfig,
        Stage::GetPaths,
        Stage::Run,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Uninitialized => "uninitialized",
            Stage::Constructor => "constructor",
            Stage::Init => "init",
            Stage::InitPresets => "initPresets",
            Stage::InitPlugins => "initPlugins",
            Stage::InitHooks => "initHooks",
            Stage::PluginReady => "pluginReady",
            Stage::GetConfig => "getConfig",
            Stage::GetPaths => "getPaths",
            Stage::Run => "run",
        }
    }
}

impl Default for Stage {
    fn default() -> Self {
        Stage::Uninitialized
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
