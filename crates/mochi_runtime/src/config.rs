//! Driver configuration

use anyhow::{Context, Result};
use mochi_core::time::DEFAULT_TICK_RATE_HZ;
use mochi_script::HostOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "mochi.json";

/// Everything the driver needs to boot the runtime and run a scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub host: HostOptions,
    /// Directory holding the runtime module and framework assemblies.
    pub runtime_dir: PathBuf,
    /// Main managed assembly. Its directory is the application directory.
    pub entry_assembly: PathBuf,
    /// Run the entry assembly's `Main` before binding delegates.
    pub run_entry_point: bool,
    pub scripting: ScriptingConfig,
    pub scene: SceneConfig,
}

/// Where the managed side of the entity bridge lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptingConfig {
    pub bridge_assembly: String,
    /// Static type exposing `Start`, `Update` and `Stop`.
    pub bridge_type: String,
    /// Static `(ulong, string)` method that instantiates a script for an entity.
    pub create_instance_method: Option<String>,
    /// Static no-argument method that drops managed script instances before
    /// the runtime shuts down.
    pub clear_method: Option<String>,
    /// Static type exposing `RegisterNativeCallbacks`. Callbacks are not
    /// registered when unset.
    pub callbacks_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub tick_rate_hz: u32,
    pub frames: u32,
    pub entities: Vec<EntityConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityConfig {
    pub name: String,
    /// Managed script type. Entities without one are not scripted.
    #[serde(default)]
    pub script: Option<String>,
}

impl RuntimeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config '{}'", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("parsing config '{}'", path.display()))?;
        Ok(config)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            host: HostOptions::default(),
            runtime_dir: PathBuf::new(),
            entry_assembly: PathBuf::from("TestScript.dll"),
            run_entry_point: false,
            scripting: ScriptingConfig::default(),
            scene: SceneConfig::default(),
        }
    }
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            bridge_assembly: "MochiSharp.Managed".to_string(),
            bridge_type: "MochiSharp.Managed.Core.EntityBridge".to_string(),
            create_instance_method: Some("CreateEntityInstance".to_string()),
            clear_method: Some("ClearAll".to_string()),
            callbacks_type: None,
        }
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
            frames: 10,
            entities: vec![EntityConfig {
                name: "Player".to_string(),
                script: Some("Game.PlayerController".to_string()),
            }],
        }
    }
}
