//! Configuration resolution for Conductor.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/conductor/settings.json)
//! 3. Project config (.conductor/settings.json)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::workflow::DEFAULT_MAX_WORKERS;

/// Complete Conductor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub loop_stop: LoopStopConfig,
}

/// Engine-wide execution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Parallel worker count used when a workflow leaves `maxWorkers` unset.
    pub default_max_workers: u32,
    /// Buffer size of the live event broadcast per run.
    pub event_capacity: usize,
    /// Whether invocations request streamed model calls.
    pub streaming: bool,
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_max_workers: DEFAULT_MAX_WORKERS,
            event_capacity: 256,
            streaming: true,
            log_level: "info".to_string(),
        }
    }
}

/// How a sub-agent asks a loop to stop early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopStopConfig {
    /// A final response calling this tool stops the loop.
    pub tool_name: String,
    /// A final response whose text contains this marker stops the loop.
    pub text_marker: Option<String>,
}

impl Default for LoopStopConfig {
    fn default() -> Self {
        Self {
            tool_name: "exit_loop".to_string(),
            text_marker: None,
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    let global = global_config_path();
    let project = project_dir.map(|dir| dir.join(".conductor").join("settings.json"));
    resolve_config(global.as_deref(), project.as_deref(), |key| {
        std::env::var(key).ok()
    })
}

/// Layer defaults, the global file, the project file and `lookup` overrides.
///
/// Files that do not exist are skipped. A file only overrides the keys it
/// actually contains.
pub fn resolve_config(
    global_path: Option<&Path>,
    project_path: Option<&Path>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Config> {
    let mut merged = serde_json::to_value(Config::default())?;

    if let Some(path) = global_path.filter(|p| p.exists()) {
        debug!(path = %path.display(), "Loading global config");
        merge_values(&mut merged, read_settings(path)?);
    }
    if let Some(path) = project_path.filter(|p| p.exists()) {
        debug!(path = %path.display(), "Loading project config");
        merge_values(&mut merged, read_settings(path)?);
    }

    let mut config: Config = serde_json::from_value(merged)
        .map_err(|e| Error::Config(format!("Invalid merged config: {e}")))?;
    apply_env_overrides(&mut config, lookup);
    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("conductor").join("settings.json"))
}

fn read_settings(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Recursively copy the keys present in `overlay` onto `base`.
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                merge_values(base.entry(key).or_insert(Value::Null), value);
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Apply `CONDUCTOR_*` overrides read through `lookup`.
///
/// Unparseable values are ignored and the previous setting is kept.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("CONDUCTOR_DEFAULT_MAX_WORKERS")
        && let Ok(n) = val.parse()
    {
        config.engine.default_max_workers = n;
    }
    if let Some(val) = lookup("CONDUCTOR_EVENT_CAPACITY")
        && let Ok(n) = val.parse()
    {
        config.engine.event_capacity = n;
    }
    if let Some(val) = lookup("CONDUCTOR_STREAMING")
        && let Ok(b) = val.parse()
    {
        config.engine.streaming = b;
    }
    if let Some(val) = lookup("CONDUCTOR_LOG_LEVEL") {
        config.engine.log_level = val;
    }
    if let Some(val) = lookup("CONDUCTOR_LOOP_STOP_TOOL") {
        config.loop_stop.tool_name = val;
    }
}
