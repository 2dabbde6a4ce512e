//! Engine configuration files
//!
//! A configuration names the nodes to build, the connection text wiring
//! them, the intent presets and engine-wide settings. Files may be TOML or
//! JSON; TOML is tried first.
//!
//! ```toml
//! name = "pulse"
//! agency = 0.3
//! connections = """
//! Random.Float -> Scale.float
//! Scale.float -> .AgencyAuto
//! """
//!
//! [[nodes]]
//! name = "Random"
//! type = "RandomFloat"
//! config = { seed = 7 }
//!
//! [[intents]]
//! name = "calm"
//! energy = 0.1
//! activation = 1.0
//! ```

use crate::blender::BiasSettings;
use crate::intent::{Intent, DEFAULT_SPEED};
use crate::value::Rgba;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Config loading failure
#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    /// Neither TOML nor JSON
    ParseError(String),
    SerdeError(String),
    /// Parsed but unusable
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            ConfigError::SerdeError(msg) => write!(f, "Serialization error: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::IoError(e)
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// A scalar config entry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Num(f64),
    Str(String),
}

impl ConfigValue {
    /// Textual form, as parameter overrides consume it
    pub fn as_text(&self) -> String {
        match self {
            ConfigValue::Bool(b) => b.to_string(),
            ConfigValue::Num(n) => n.to_string(),
            ConfigValue::Str(s) => s.clone(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Num(n) => Some(*n),
            ConfigValue::Str(s) => s.trim().parse().ok(),
            ConfigValue::Bool(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::Str(s.to_string())
    }
}

impl From<f64> for ConfigValue {
    fn from(n: f64) -> Self {
        ConfigValue::Num(n)
    }
}

/// Per-node string-keyed settings
pub type NodeConfig = BTreeMap<String, ConfigValue>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: NodeConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentSpec {
    pub name: String,
    #[serde(default)]
    pub energy: f32,
    #[serde(default)]
    pub density: f32,
    #[serde(default)]
    pub structure: f32,
    #[serde(default)]
    pub chaos: f32,
    #[serde(default)]
    pub granularity: f32,
    /// Initial activation
    #[serde(default)]
    pub activation: f32,
    #[serde(default = "default_speed")]
    pub speed: f32,
}

fn default_speed() -> f32 {
    DEFAULT_SPEED
}

impl IntentSpec {
    pub fn to_intent(&self) -> Intent {
        Intent::new(
            &self.name,
            self.energy,
            self.density,
            self.structure,
            self.chaos,
            self.granularity,
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub width: u32,
    pub height: u32,
    /// Folder to load memories from on start and save them to on exit
    pub folder: Option<PathBuf>,
    pub seed: Option<u64>,
    pub emit_min_interval: f32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
            folder: None,
            seed: None,
            emit_min_interval: crate::memory_controller::EMIT_MIN_INTERVAL_SEC,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    pub name: String,
    /// Manual engine agency, 0..1
    pub agency: f32,
    /// Master intent strength, 0..1
    pub intent_strength: f32,
    pub connections: String,
    pub background_color: Rgba,
    pub blending: BiasSettings,
    pub memory: MemoryConfig,
    /// Folder holding `<name>.json` parameter snapshots
    pub snapshot_folder: Option<PathBuf>,
    pub nodes: Vec<NodeSpec>,
    pub intents: Vec<IntentSpec>,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            name: "untitled".to_string(),
            agency: 0.0,
            intent_strength: 1.0,
            connections: String::new(),
            background_color: Rgba::BLACK,
            blending: BiasSettings::default(),
            memory: MemoryConfig::default(),
            snapshot_folder: None,
            nodes: Vec::new(),
            intents: Vec::new(),
        }
    }
}

impl SynthConfig {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse TOML, falling back to JSON
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let toml_err = match toml::from_str(content) {
            Ok(config) => return Ok(config),
            Err(e) => e,
        };
        match serde_json::from_str(content) {
            Ok(config) => Ok(config),
            Err(json_err) => Err(ConfigError::ParseError(format!(
                "not TOML ({}) or JSON ({})",
                toml_err.to_string().trim(),
                json_err
            ))),
        }
    }

    /// Write as JSON for a `.json` path, TOML otherwise
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => self.to_json()?,
            _ => self.to_toml()?,
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerdeError(e.to_string()))
    }

    pub fn to_json(&self) -> ConfigResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::SerdeError(e.to_string()))
    }

    /// Structural checks that would make a load meaningless
    ///
    /// Unknown types and bad connection lines are not errors here; the
    /// loader logs and skips those.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "node of type '{}' has no name",
                    node.kind
                )));
            }
            if !seen.insert(node.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate node name '{}'", node.name)));
            }
        }
        if self.memory.width == 0 || self.memory.height == 0 {
            return Err(ConfigError::Invalid("memory size must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn intent_presets(&self) -> Vec<Intent> {
        self.intents.iter().map(IntentSpec::to_intent).collect()
    }
}
