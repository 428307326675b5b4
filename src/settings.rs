//! Persisted runtime state under `$INSTALL_DIR` (spec §6 "Persisted state").

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::agent::AgentConfig;
use crate::error::Result;
use crate::hardware::HardwareInfo;

/// Top-level persisted settings: `hw_profile.json`'s contents plus the
/// agent configuration and model directory. `mcp.json` is deliberately
/// opaque (spec §1 scope: MCP transports are an external collaborator) and
/// is passed through as raw JSON rather than a typed struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    #[serde(default)]
    pub agent: AgentConfig,

    /// Last detected hardware profile, refreshed on every `hwinfo`/`auto` run.
    pub hardware: Option<HardwareInfo>,

    /// Opaque passthrough for external MCP server configuration.
    #[serde(default)]
    pub mcp: serde_json::Value,
}

fn default_models_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".neuronos").join("models")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            agent: AgentConfig::default(),
            hardware: None,
            mcp: serde_json::Value::Null,
        }
    }
}

impl Settings {
    /// Load settings from `path`; defaults on a missing or unparsable file.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("failed to parse settings file: {e} — using defaults");
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no settings file at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!("settings saved to {}", path.display());
        Ok(())
    }

    pub fn memory_db_path(install_dir: &Path) -> PathBuf {
        install_dir.join("memory.db")
    }

    pub fn hw_profile_path(install_dir: &Path) -> PathBuf {
        install_dir.join("hw_profile.json")
    }

    pub fn settings_path(install_dir: &Path) -> PathBuf {
        install_dir.join("settings.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("missing.json"));
        assert_eq!(settings.agent.max_steps, 10);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut settings = Settings::default();
        settings.agent.max_steps = 42;
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path);
        assert_eq!(loaded.agent.max_steps, 42);
    }
}
