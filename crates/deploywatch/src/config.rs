//! Configuration loading and types

use std::path::{Path, PathBuf};

use deploywatch_core::WatchConfig;
use serde::{Deserialize, Serialize};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "DEPLOYWATCH_CONFIG";

/// Top-level configuration for deploywatch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Event file and report settings
    #[serde(default)]
    pub watch: WatchConfig,
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// First config file found in the usual places, if any
    ///
    /// Checks `DEPLOYWATCH_CONFIG`, then `deploywatch.toml`,
    /// `/etc/deploywatch/deploywatch.toml` and the user config directory.
    #[must_use]
    pub fn find_default_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
            return Some(PathBuf::from(path));
        }

        let mut paths = vec![
            PathBuf::from("deploywatch.toml"),
            PathBuf::from("/etc/deploywatch/deploywatch.toml"),
        ];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("deploywatch/deploywatch.toml"));
        }

        paths.into_iter().find(|path| path.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_partial_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploywatch.toml");
        std::fs::write(
            &path,
            "[watch]\nlogs_dir = \"/var/log/deploywatch\"\nstop_after_playbooks = 2\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.watch.logs_dir, PathBuf::from("/var/log/deploywatch"));
        assert_eq!(config.watch.stop_after(), Some(2));
        assert_eq!(config.watch.poll_interval_ms, 50);
    }

    #[test]
    fn test_empty_config_is_default() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.watch.log_level, "info");
        assert!(config.watch.event_file.is_none());
    }

    #[test]
    fn test_unreadable_config() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(&dir.path().join("missing.toml")).is_err());
    }
}
