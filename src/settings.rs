use crate::refs::dedupe_ref_targets;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Seconds between persisted run refreshes.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
    /// Refs recently compared against, most recent first.
    #[serde(default)]
    pub recent_refs: Vec<String>,
}

fn default_poll_interval_secs() -> u64 {
    15
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            log_level: default_log_level(),
            default_model: None,
            thread_id: None,
            recent_refs: Vec::new(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            // Create default settings if file doesn't exist
            let settings = Self::default();
            settings.save_to(config_path)?;
            return Ok(settings);
        }

        let content = fs::read_to_string(config_path).context("Failed to read settings file")?;

        let mut settings: Self =
            toml::from_str(&content).context("Failed to parse settings file")?;
        settings.recent_refs = dedupe_ref_targets(settings.recent_refs.iter().map(Some));

        Ok(settings)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Ensure config directory exists
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize settings")?;

        fs::write(config_path, content).context("Failed to write settings file")?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            PathBuf::from(xdg_config)
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home).join(".config")
        } else {
            PathBuf::from(".")
        };

        Ok(config_dir.join("revu-runs").join("config.toml"))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// Moves `reference` to the front of the recent list.
    pub fn remember_ref(&mut self, reference: &str) {
        let refs = std::iter::once(reference).chain(self.recent_refs.iter().map(String::as_str));
        self.recent_refs = dedupe_ref_targets(refs.map(Some));
    }

    /// Remembers `reference` and persists the settings.
    pub fn record_ref(&mut self, reference: &str) -> Result<()> {
        self.record_ref_in(reference, &Self::config_path()?)
    }

    pub fn record_ref_in(&mut self, reference: &str, config_path: &Path) -> Result<()> {
        self.remember_ref(reference);
        self.save_to(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings, Settings::default());
        assert!(path.exists());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "poll_interval_secs = 5\nrecent_refs = [\"main\", \" Main \", \"dev\"]\n",
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.poll_interval(), Duration::from_secs(5));
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.recent_refs, vec!["main", "dev"]);
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut settings = Settings {
            default_model: Some("reviewer-large".to_string()),
            ..Settings::default()
        };
        settings.remember_ref("main");
        settings.remember_ref("feature/x");
        settings.remember_ref("MAIN");
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.default_model.as_deref(), Some("reviewer-large"));
        assert_eq!(loaded.recent_refs, vec!["MAIN", "feature/x"]);
    }

    #[test]
    fn recorded_refs_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut settings = Settings::load_from(&path).unwrap();

        settings.record_ref_in("src/app.rs", &path).unwrap();
        settings.record_ref_in(" docs/guide.md ", &path).unwrap();
        settings.record_ref_in("SRC/APP.RS", &path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.recent_refs, vec!["SRC/APP.RS", "docs/guide.md"]);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "poll_interval_secs = \"soon\"").unwrap();
        assert!(Settings::load_from(&path).is_err());
    }
}
