//! Session configuration
//!
//! Loaded from and saved to a JSON file. A missing file means defaults; a
//! file that fails to parse is logged and replaced by defaults.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration of an editing session's sync pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    /// Quiet time after the last edit before a sync pass runs
    pub debounce_ms: u64,
    /// Delete orphaned records and synthesize missing ones during sync
    pub gc_enabled: bool,
    /// Run the duplicate-mark check every this many content changes (0 = never)
    pub consistency_check_interval: u32,
    /// Send the plain text rendering along with the persisted document
    pub persist_plain_text: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            gc_enabled: true,
            consistency_check_interval: 50,
            persist_plain_text: true,
        }
    }
}

impl SessionConfig {
    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = ms;
        self
    }

    pub fn with_gc(mut self, enabled: bool) -> Self {
        self.gc_enabled = enabled;
        self
    }

    pub fn with_consistency_check_interval(mut self, edits: u32) -> Self {
        self.consistency_check_interval = edits;
        self
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Loads, saves and updates a [`SessionConfig`] file
pub struct ConfigManager {
    config_path: PathBuf,
    current: SessionConfig,
}

impl ConfigManager {
    /// Create a manager for `session.json` inside `dir`
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            config_path: dir.as_ref().join("session.json"),
            current: SessionConfig::default(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn parse(&mut self, content: &str) {
        self.current = match serde_json::from_str::<SessionConfig>(content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %self.config_path.display(), error = %e, "failed to parse session config, using defaults");
                SessionConfig::default()
            }
        };
    }

    /// Load the configuration, or defaults if the file doesn't exist
    pub async fn load(&mut self) -> Result<&SessionConfig> {
        if tokio::fs::try_exists(&self.config_path).await? {
            let content = tokio::fs::read_to_string(&self.config_path).await?;
            self.parse(&content);
        } else {
            self.current = SessionConfig::default();
        }
        Ok(&self.current)
    }

    /// Load synchronously, for startup paths outside a runtime
    pub fn load_sync(&mut self) -> Result<&SessionConfig> {
        if self.config_path.exists() {
            let content = std::fs::read_to_string(&self.config_path)?;
            self.parse(&content);
        } else {
            self.current = SessionConfig::default();
        }
        Ok(&self.current)
    }

    pub async fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(&self.current)?;
        tokio::fs::write(&self.config_path, content).await?;
        Ok(())
    }

    pub fn save_sync(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.current)?;
        std::fs::write(&self.config_path, content)?;
        Ok(())
    }

    pub fn get(&self) -> &SessionConfig {
        &self.current
    }

    /// Replace the configuration and save it
    pub async fn update(&mut self, config: SessionConfig) -> Result<()> {
        self.current = config;
        self.save().await
    }

    /// Restore defaults and save them
    pub async fn reset(&mut self) -> Result<&SessionConfig> {
        self.current = SessionConfig::default();
        self.save().await?;
        Ok(&self.current)
    }
}
