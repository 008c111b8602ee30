//! Deployment event records and the line decoder
//!
//! The provisioning callback appends one JSON object per line:
//!
//! ```text
//! {"type": "vm_ip", "timestamp": "2025-03-02T14:01:12.52", "unix_ts": 1740924072.52,
//!  "task": "Wait for IP", "play": "Provision", "data": {"vm_name": "sup-m1-0", "ip": "10.0.0.4"}}
//! ```
//!
//! The file is tailed while it is still being written, so truncated and
//! garbage lines are expected. [`decode`] never fails loudly.

use std::fmt;

use chrono::{DateTime, Local, NaiveDateTime};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::payload::Payload;

/// Kind tag used when a line carries no `type`
pub const UNKNOWN_KIND: &str = "unknown";

/// Why a line was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Empty or whitespace-only line
    #[error("blank line")]
    Blank,

    /// Not valid JSON (often a line still being written)
    #[error("invalid JSON: {0}")]
    Json(String),

    /// Valid JSON that is not an object
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// Event kinds this workspace understands
///
/// The wire tag is an open set; tags outside this table stay available on
/// [`DeployEvent::kind`] and are ignored by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // Playbook lifecycle
    PlaybookStart,
    PlaybookEnd,
    PlayStart,
    TaskStart,

    // Task results
    TaskOk,
    TaskFailed,
    TaskSkipped,
    HostUnreachable,
    Retry,

    // VM provisioning
    VmCreating,
    VmExists,
    VmProvisioned,
    VmActive,
    VmIp,
    VmFailed,

    // Installation
    InstallPreparing,
    InstallStage1,
    InstallStage2,
    RebootStart,
    RebootComplete,
    InstallComplete,
    InstallFailed,
    InstallFeedback,

    // Teardown
    DiscoveryServers,
    DiscoveryVolumes,
    ResourceDeleting,
    ResourceDeleted,
    ResourceFailed,

    // Statistics
    Recap,
}

impl EventKind {
    /// Look up a wire tag
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        let kind = match tag {
            "playbook_start" => EventKind::PlaybookStart,
            "playbook_end" => EventKind::PlaybookEnd,
            "play_start" => EventKind::PlayStart,
            "task_start" => EventKind::TaskStart,
            "task_ok" => EventKind::TaskOk,
            "task_failed" => EventKind::TaskFailed,
            "task_skipped" => EventKind::TaskSkipped,
            "host_unreachable" => EventKind::HostUnreachable,
            "retry" => EventKind::Retry,
            "vm_creating" => EventKind::VmCreating,
            "vm_exists" => EventKind::VmExists,
            "vm_provisioned" => EventKind::VmProvisioned,
            "vm_active" => EventKind::VmActive,
            "vm_ip" => EventKind::VmIp,
            "vm_failed" => EventKind::VmFailed,
            "install_preparing" => EventKind::InstallPreparing,
            "install_stage1" => EventKind::InstallStage1,
            "install_stage2" => EventKind::InstallStage2,
            "reboot_start" => EventKind::RebootStart,
            "reboot_complete" => EventKind::RebootComplete,
            "install_complete" => EventKind::InstallComplete,
            "install_failed" => EventKind::InstallFailed,
            "install_feedback" => EventKind::InstallFeedback,
            "discovery_servers" => EventKind::DiscoveryServers,
            "discovery_volumes" => EventKind::DiscoveryVolumes,
            "resource_deleting" => EventKind::ResourceDeleting,
            "resource_deleted" => EventKind::ResourceDeleted,
            "resource_failed" => EventKind::ResourceFailed,
            "recap" => EventKind::Recap,
            _ => return None,
        };
        Some(kind)
    }

    /// Wire tag for this kind
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::PlaybookStart => "playbook_start",
            EventKind::PlaybookEnd => "playbook_end",
            EventKind::PlayStart => "play_start",
            EventKind::TaskStart => "task_start",
            EventKind::TaskOk => "task_ok",
            EventKind::TaskFailed => "task_failed",
            EventKind::TaskSkipped => "task_skipped",
            EventKind::HostUnreachable => "host_unreachable",
            EventKind::Retry => "retry",
            EventKind::VmCreating => "vm_creating",
            EventKind::VmExists => "vm_exists",
            EventKind::VmProvisioned => "vm_provisioned",
            EventKind::VmActive => "vm_active",
            EventKind::VmIp => "vm_ip",
            EventKind::VmFailed => "vm_failed",
            EventKind::InstallPreparing => "install_preparing",
            EventKind::InstallStage1 => "install_stage1",
            EventKind::InstallStage2 => "install_stage2",
            EventKind::RebootStart => "reboot_start",
            EventKind::RebootComplete => "reboot_complete",
            EventKind::InstallComplete => "install_complete",
            EventKind::InstallFailed => "install_failed",
            EventKind::InstallFeedback => "install_feedback",
            EventKind::DiscoveryServers => "discovery_servers",
            EventKind::DiscoveryVolumes => "discovery_volumes",
            EventKind::ResourceDeleting => "resource_deleting",
            EventKind::ResourceDeleted => "resource_deleted",
            EventKind::ResourceFailed => "resource_failed",
            EventKind::Recap => "recap",
        }
    }

    /// Kinds that report a task, host, VM or resource failure
    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            EventKind::TaskFailed
                | EventKind::HostUnreachable
                | EventKind::VmFailed
                | EventKind::InstallFailed
                | EventKind::ResourceFailed
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded line of the event stream
#[derive(Debug, Clone, PartialEq)]
pub struct DeployEvent {
    /// Wire tag (`type`), `"unknown"` when absent
    pub kind: String,
    /// Producer wall clock, or decode time when unparseable
    pub timestamp: NaiveDateTime,
    /// Producer-local seconds (`unix_ts`), used for durations only
    pub monotonic_time: f64,
    /// Task name at emit time
    pub task: String,
    /// Play name at emit time (`play`)
    pub group: String,
    /// Open key-value data
    pub payload: Payload,
}

impl DeployEvent {
    /// Create an event of the given kind stamped with the current time
    pub fn new(kind: impl Into<String>) -> Self {
        let now = Local::now();
        Self {
            kind: kind.into(),
            timestamp: now.naive_local(),
            monotonic_time: now.timestamp_micros() as f64 / 1_000_000.0,
            task: String::new(),
            group: String::new(),
            payload: Payload::new(),
        }
    }

    /// Set a payload field
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key, value);
        self
    }

    /// Set the `host` payload field
    #[must_use]
    pub fn with_host(self, host: impl Into<String>) -> Self {
        self.with_data("host", host.into())
    }

    /// Set the task name
    #[must_use]
    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = task.into();
        self
    }

    /// Set both clocks
    #[must_use]
    pub fn at(mut self, timestamp: NaiveDateTime, monotonic_time: f64) -> Self {
        self.timestamp = timestamp;
        self.monotonic_time = monotonic_time;
        self
    }

    /// Known kind, `None` for tags outside the table
    #[must_use]
    pub fn known_kind(&self) -> Option<EventKind> {
        EventKind::from_tag(&self.kind)
    }

    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.payload.host()
    }

    /// VM the event is about: `vm_name`, falling back to `host`
    #[must_use]
    pub fn entity_name(&self) -> Option<&str> {
        self.payload.vm_name().or_else(|| self.payload.host())
    }

    #[must_use]
    pub fn error_text(&self) -> Option<&str> {
        self.payload.error()
    }

    #[must_use]
    pub fn is_failure_kind(&self) -> bool {
        self.known_kind().is_some_and(EventKind::is_failure)
    }

    /// Failure the producer tolerated (`ignore_errors` and friends)
    #[must_use]
    pub fn is_ignored_failure(&self) -> bool {
        self.payload.ignored()
    }

    /// Encode back to the wire format (one line, no trailing newline)
    #[must_use]
    pub fn to_json_line(&self) -> String {
        let mut obj = Map::new();
        obj.insert("type".to_string(), json!(self.kind));
        obj.insert(
            "timestamp".to_string(),
            json!(self.timestamp.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()),
        );
        obj.insert("unix_ts".to_string(), json!(self.monotonic_time));
        obj.insert("task".to_string(), json!(self.task));
        obj.insert("play".to_string(), json!(self.group));
        if !self.payload.is_empty() {
            obj.insert(
                "data".to_string(),
                serde_json::to_value(&self.payload).unwrap_or(Value::Null),
            );
        }
        Value::Object(obj).to_string()
    }
}

/// Decode one line, or `None` when it is blank or malformed
#[must_use]
pub fn decode(line: &str) -> Option<DeployEvent> {
    try_decode(line).ok()
}

/// Decode one line, reporting why it was rejected
///
/// # Errors
/// Returns [`DecodeError`] for blank lines, invalid JSON, and non-object JSON.
pub fn try_decode(line: &str) -> Result<DeployEvent, DecodeError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(DecodeError::Blank);
    }

    let value: Value =
        serde_json::from_str(line).map_err(|e| DecodeError::Json(e.to_string()))?;
    let mut obj = match value {
        Value::Object(obj) => obj,
        other => return Err(DecodeError::NotAnObject(json_type_name(&other))),
    };

    let kind = obj
        .get("type")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_KIND)
        .to_string();

    let timestamp = obj
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
        .unwrap_or_else(|| Local::now().naive_local());

    let monotonic_time = match obj.get("unix_ts") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    };

    let text = |obj: &Map<String, Value>, key: &str| {
        obj.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let task = text(&obj, "task");
    let group = text(&obj, "play");

    let payload = obj
        .remove("data")
        .map(Payload::from_value)
        .unwrap_or_default();

    Ok(DeployEvent {
        kind,
        timestamp,
        monotonic_time,
        task,
        group,
        payload,
    })
}

/// Parse an ISO-8601 timestamp, with or without offset
///
/// Offset-carrying stamps are converted to local time so the timeline sorts
/// naive and zoned producers together.
fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(zoned) = DateTime::parse_from_rfc3339(raw) {
        return Some(zoned.with_timezone(&Local).naive_local());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
