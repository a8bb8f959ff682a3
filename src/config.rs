//! Settings file loading and command-line overrides.

use quarry_agent::{AgentConfig, DigVolume, ToolBindings};
use quarry_core::BlockPos;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

const DEFAULT_CONFIG_PATH: &str = "config/quarry.toml";

/// Complete settings surface, loaded once at startup and never reloaded.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct QuarrySettings {
    pub server: ServerSettings,
    pub auth: AuthSettings,
    pub dig: DigSettings,
    pub tools: ToolSettings,
    pub debug: DebugSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 25565,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    Offline,
    Online,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthSettings {
    pub mode: AuthMode,
    pub username: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            mode: AuthMode::Offline,
            username: "QuarryBot".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DigSettings {
    pub width: u32,
    pub length: u32,
    pub depth: u32,
    /// Blocks between dig columns; a stride, not exhaustive coverage.
    pub interval: u32,
    /// Top corner of the volume as [x, y, z]; layers descend from here.
    pub origin: [i32; 3],
}

impl Default for DigSettings {
    fn default() -> Self {
        Self {
            width: 10,
            length: 10,
            depth: 5,
            interval: 5,
            origin: [0, 64, 0],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolSettings {
    /// Fallback tool when no binding matches.
    pub default: String,
    /// Material name to tool id table.
    pub bindings: BTreeMap<String, String>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        let bindings = [
            ("stone", "wooden_pickaxe"),
            ("cobblestone", "wooden_pickaxe"),
            ("dirt", "wooden_shovel"),
            ("grass", "wooden_shovel"),
            ("sand", "wooden_shovel"),
            ("gravel", "wooden_shovel"),
            ("wood", "wooden_axe"),
            ("oak_log", "wooden_axe"),
            ("spruce_log", "wooden_axe"),
            ("birch_log", "wooden_axe"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self {
            default: "wooden_pickaxe".to_string(),
            bindings,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DebugSettings {
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LogSettings {
    /// Structured event log destination (JSONL); None disables the file sink.
    pub path: Option<PathBuf>,
}

impl QuarrySettings {
    /// Load settings from the default path.
    pub fn load() -> Self {
        Self::load_from_path(Path::new(DEFAULT_CONFIG_PATH))
    }

    /// Load settings from an explicit path, falling back to defaults on errors.
    pub fn load_from_path(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<QuarrySettings>(&contents) {
                Ok(settings) => settings,
                Err(err) => {
                    warn!("Failed to parse {}: {err}. Using defaults", path.display());
                    QuarrySettings::default()
                }
            },
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to read {}: {err}. Using defaults", path.display());
                } else if path != Path::new(DEFAULT_CONFIG_PATH) {
                    warn!(
                        "Settings not found at {}. Using defaults",
                        path.display()
                    );
                }
                QuarrySettings::default()
            }
        }
    }

    /// `host:port` to hand to the session.
    pub fn address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Assemble the agent-side configuration from these settings.
    pub fn agent_config(&self) -> AgentConfig {
        let [x, y, z] = self.dig.origin;
        AgentConfig {
            volume: DigVolume {
                origin: BlockPos::new(x, y, z),
                width: self.dig.width.max(1),
                length: self.dig.length.max(1),
                depth: self.dig.depth.max(1),
                interval: self.dig.interval.max(1),
            },
            bindings: ToolBindings::new(self.tools.bindings.clone(), &self.tools.default),
            ..AgentConfig::default()
        }
    }
}

/// Command-line overrides, parsed by hand in the flag/value style.
#[derive(Debug, Default)]
pub struct CliOptions {
    pub config: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub width: Option<u32>,
    pub length: Option<u32>,
    pub depth: Option<u32>,
    pub interval: Option<u32>,
    pub debug: bool,
}

impl CliOptions {
    /// Parse flags from an argument iterator; unknown flags are ignored.
    pub fn parse<I>(mut args: I) -> Self
    where
        I: Iterator<Item = String>,
    {
        let mut options = Self::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => options.config = args.next().map(PathBuf::from),
                "--host" => options.host = args.next(),
                "--port" => options.port = args.next().and_then(|v| v.parse().ok()),
                "--username" => options.username = args.next(),
                "--width" => options.width = args.next().and_then(|v| v.parse().ok()),
                "--length" => options.length = args.next().and_then(|v| v.parse().ok()),
                "--depth" => options.depth = args.next().and_then(|v| v.parse().ok()),
                "--interval" => options.interval = args.next().and_then(|v| v.parse().ok()),
                "--debug" => options.debug = true,
                _ => {}
            }
        }
        options
    }

    /// Overlay parsed flags on loaded settings.
    pub fn apply(&self, settings: &mut QuarrySettings) {
        if let Some(host) = &self.host {
            settings.server.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(username) = &self.username {
            settings.auth.username = username.clone();
        }
        if let Some(width) = self.width {
            settings.dig.width = width;
        }
        if let Some(length) = self.length {
            settings.dig.length = length;
        }
        if let Some(depth) = self.depth {
            settings.dig.depth = depth;
        }
        if let Some(interval) = self.interval {
            settings.dig.interval = interval;
        }
        if self.debug {
            settings.debug.enabled = true;
        }
    }
}
