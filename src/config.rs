use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

pub const CONFIG_FILE_NAME: &str = "config.json";

/// Workspace settings stored next to the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub version: String,
    pub developer: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            version: env!("CARGO_PKG_VERSION").to_string(),
            developer: "attendanced".to_string(),
        }
    }
}

impl AppConfig {
    /// Loads `config.json` from the workspace, writing defaults when the file
    /// is absent. A corrupt file falls back to defaults and is left in place.
    pub fn load_or_init(workspace: &Path) -> AppConfig {
        let path = workspace.join(CONFIG_FILE_NAME);
        if !path.exists() {
            let cfg = AppConfig::default();
            if let Err(e) = cfg.save(workspace) {
                warn!(error = %format!("{e:#}"), "failed to write default config");
            }
            return cfg;
        }
        match Self::read(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "using default config");
                AppConfig::default()
            }
        }
    }

    fn read(path: &Path) -> anyhow::Result<AppConfig> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("{} is invalid JSON", path.to_string_lossy()))
    }

    pub fn save(&self, workspace: &Path) -> anyhow::Result<()> {
        let path = workspace.join(CONFIG_FILE_NAME);
        let text = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(&path, text)
            .with_context(|| format!("failed to write {}", path.to_string_lossy()))
    }
}
