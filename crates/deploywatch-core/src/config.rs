//! Deployment manifest and watch settings

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::state::VmState;

/// Environment variable the provisioning callback reads its output path from
pub const EVENT_FILE_ENV: &str = "RUSE_EVENT_FILE";

/// Planned deployment: which VMs the run is expected to produce
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentManifest {
    /// Human-readable deployment name (used in the report header)
    #[serde(default)]
    pub deployment_name: String,
    /// VM groups
    #[serde(default)]
    pub deployments: Vec<VmGroup>,
}

/// A group of identical VMs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmGroup {
    /// Behavior profile, also the base of the VM name
    pub behavior: String,
    /// Cloud flavor
    #[serde(default)]
    pub flavor: String,
    /// Number of VMs in this group
    #[serde(default = "default_count")]
    pub count: usize,
}

fn default_count() -> usize {
    1
}

impl DeploymentManifest {
    /// Parse a manifest from TOML text
    ///
    /// # Errors
    /// Returns `CoreError::Manifest` if the text is not a valid manifest
    pub fn from_toml(text: &str) -> Result<Self, CoreError> {
        toml::from_str(text).map_err(|e| CoreError::Manifest(e.to_string()))
    }

    /// Load a manifest file
    ///
    /// # Errors
    /// Returns `CoreError::Manifest` if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Manifest(format!("{}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Name used for the run, falling back to `fallback` when unset
    #[must_use]
    pub fn run_name<'a>(&'a self, fallback: &'a str) -> &'a str {
        if self.deployment_name.is_empty() {
            fallback
        } else {
            &self.deployment_name
        }
    }

    /// Expand groups into one pending VM each
    ///
    /// Names are `sup-{behavior}-{index}` with dots in the behavior replaced
    /// by dashes; the index counts per behavior across all groups.
    #[must_use]
    pub fn planned_vms(&self) -> Vec<VmState> {
        let mut next_index: std::collections::HashMap<&str, usize> =
            std::collections::HashMap::new();
        let mut vms = Vec::new();

        for group in &self.deployments {
            for _ in 0..group.count {
                let idx = next_index.entry(group.behavior.as_str()).or_insert(0);
                let name = format!("sup-{}-{}", group.behavior.replace('.', "-"), idx);
                *idx += 1;
                vms.push(VmState::new(name, &group.behavior, &group.flavor));
            }
        }

        vms
    }
}

/// Settings for following an event file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Event file; falls back to `RUSE_EVENT_FILE`
    #[serde(default)]
    pub event_file: Option<PathBuf>,
    /// Directory audit logs are written to
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
    /// Sleep between polls when no complete line is available
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Stop after this many `playbook_end` events (0 = only on interrupt)
    #[serde(default = "default_stop_after_playbooks")]
    pub stop_after_playbooks: usize,
    /// Wait for the event file to appear instead of failing
    #[serde(default = "default_wait_for_file")]
    pub wait_for_file: bool,
    /// Capacity of the state-change broadcast channel
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            event_file: None,
            logs_dir: default_logs_dir(),
            poll_interval_ms: default_poll_interval_ms(),
            stop_after_playbooks: default_stop_after_playbooks(),
            wait_for_file: default_wait_for_file(),
            notification_capacity: default_notification_capacity(),
            log_level: default_log_level(),
        }
    }
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_poll_interval_ms() -> u64 {
    50
}

fn default_stop_after_playbooks() -> usize {
    1
}

fn default_wait_for_file() -> bool {
    true
}

fn default_notification_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl WatchConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Resolve the event file: explicit setting, then the producer's env var
    #[must_use]
    pub fn resolve_event_file(&self) -> Option<PathBuf> {
        self.event_file.clone().or_else(|| {
            std::env::var_os(EVENT_FILE_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        })
    }

    /// `None` when the run should only end on interrupt
    #[must_use]
    pub fn stop_after(&self) -> Option<usize> {
        (self.stop_after_playbooks > 0).then_some(self.stop_after_playbooks)
    }
}
