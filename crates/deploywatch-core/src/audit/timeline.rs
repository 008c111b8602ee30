//! Timeline entries and the mapping from events to report lines

use std::fmt;

use chrono::NaiveDateTime;
use deploywatch_api::{DeployEvent, EventKind};

use super::record::{ErrorRecord, FailureKind};
use crate::aggregate::RunAggregate;
use crate::text::truncate;

/// Longest failure text shown on a timeline line
const TIMELINE_TEXT_MAX: usize = 60;

/// Longest task or error fragment on a `task_failed` line
const TASK_FRAGMENT_MAX: usize = 30;

/// Severity marker of a timeline line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Ok,
    Fail,
    Info,
    Warn,
}

impl Marker {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Marker::Ok => "[OK]",
            Marker::Fail => "[FAIL]",
            Marker::Info => "[INFO]",
            Marker::Warn => "[WARN]",
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One significant event, as shown in the report
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub at: NaiveDateTime,
    pub marker: Marker,
    pub target: String,
    pub message: String,
}

impl TimelineEntry {
    pub fn new(
        at: NaiveDateTime,
        marker: Marker,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            at,
            marker,
            target: target.into(),
            message: message.into(),
        }
    }

    /// Markdown bullet for this entry
    #[must_use]
    pub fn to_line(&self) -> String {
        format!(
            "- `{}` {} **{}**: {}",
            self.at.format("%H:%M:%S"),
            self.marker,
            self.target,
            self.message
        )
    }
}

/// What the report keeps from one event
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Noted {
    pub entry: TimelineEntry,
    pub error: Option<ErrorRecord>,
}

impl Noted {
    fn line(entry: TimelineEntry) -> Self {
        Self { entry, error: None }
    }

    fn failure(entry: TimelineEntry, error: ErrorRecord) -> Self {
        Self {
            entry,
            error: Some(error),
        }
    }
}

/// Map an event to its report line, or `None` when it is not significant
///
/// `aggregate` must already reflect the event.
pub(crate) fn note(event: &DeployEvent, aggregate: &RunAggregate) -> Option<Noted> {
    let kind = event.known_kind()?;
    let at = event.timestamp;

    if kind.is_failure() && event.is_ignored_failure() {
        let target = failure_target(event, kind);
        let detail = event.error_text().unwrap_or(kind.as_str());
        return Some(Noted::line(TimelineEntry::new(
            at,
            Marker::Warn,
            target,
            format!("{} (ignored)", truncate(detail, TIMELINE_TEXT_MAX)),
        )));
    }

    let noted = match kind {
        EventKind::PlaybookStart => Noted::line(TimelineEntry::new(
            at,
            Marker::Info,
            "Playbook",
            format!("Started: {}", event.payload.playbook().unwrap_or("unknown")),
        )),
        EventKind::PlaybookEnd => Noted::line(TimelineEntry::new(
            at,
            Marker::Info,
            "Playbook",
            format!(
                "Completed: {} ({:.1}s)",
                event.payload.playbook().unwrap_or("unknown"),
                event.payload.float("elapsed")
            ),
        )),
        EventKind::VmProvisioned => {
            let name = event.payload.vm_name().unwrap_or("unknown");
            let ip = aggregate
                .vm(name)
                .map(|vm| vm.ip_address())
                .filter(|ip| !ip.is_empty());
            let message = match ip {
                Some(ip) => format!("provisioned (IP: {ip})"),
                None => "provisioned".to_string(),
            };
            Noted::line(TimelineEntry::new(at, Marker::Ok, name, message))
        }
        EventKind::VmIp => Noted::line(TimelineEntry::new(
            at,
            Marker::Ok,
            event.entity_name().unwrap_or("unknown"),
            format!("IP assigned: {}", event.payload.ip().unwrap_or_default()),
        )),
        EventKind::InstallComplete => Noted::line(TimelineEntry::new(
            at,
            Marker::Ok,
            event.host().unwrap_or("unknown"),
            "install complete",
        )),
        EventKind::VmFailed | EventKind::InstallFailed => {
            let target = failure_target(event, kind);
            let (error, failure) = if kind == EventKind::VmFailed {
                (
                    event.error_text().unwrap_or("VM creation failed"),
                    FailureKind::VmFailed,
                )
            } else {
                (
                    event.error_text().unwrap_or("Install failed"),
                    FailureKind::InstallFailed {
                        stage: event.payload.stage(),
                    },
                )
            };
            Noted::failure(
                TimelineEntry::new(at, Marker::Fail, target, truncate(error, TIMELINE_TEXT_MAX)),
                ErrorRecord::new(at, target, error, failure)
                    .with_task(event.task.as_str())
                    .with_stderr(event.payload.stderr().unwrap_or_default()),
            )
        }
        EventKind::TaskFailed => {
            let target = failure_target(event, kind);
            let error = event.error_text().unwrap_or("Task failed");
            Noted::failure(
                TimelineEntry::new(
                    at,
                    Marker::Fail,
                    target,
                    format!(
                        "{}: {}",
                        truncate(&event.task, TASK_FRAGMENT_MAX),
                        truncate(error, TASK_FRAGMENT_MAX)
                    ),
                ),
                ErrorRecord::new(at, target, error, FailureKind::TaskFailed)
                    .with_task(event.task.as_str())
                    .with_stderr(event.payload.stderr().unwrap_or_default()),
            )
        }
        EventKind::HostUnreachable => {
            let target = failure_target(event, kind);
            Noted::failure(
                TimelineEntry::new(at, Marker::Fail, target, "Host unreachable"),
                ErrorRecord::new(
                    at,
                    target,
                    event.error_text().unwrap_or("SSH connection failed"),
                    FailureKind::Unreachable,
                )
                .with_task(event.task.as_str()),
            )
        }
        EventKind::ResourceFailed => {
            let target = failure_target(event, kind);
            let error = event.error_text().unwrap_or("deletion failed");
            let resource_type = event.payload.resource_type().unwrap_or("resource");
            Noted::failure(
                TimelineEntry::new(
                    at,
                    Marker::Fail,
                    target,
                    format!(
                        "{resource_type} deletion failed: {}",
                        truncate(error, TIMELINE_TEXT_MAX)
                    ),
                ),
                ErrorRecord::new(at, target, error, FailureKind::ResourceFailed)
                    .with_task(event.task.as_str()),
            )
        }
        EventKind::Recap => {
            let host = event.host().unwrap_or("unknown");
            let recap = event.payload.recap();
            let entry = if recap.has_failures() {
                TimelineEntry::new(
                    at,
                    Marker::Fail,
                    host,
                    format!(
                        "Recap: {} failures, {} unreachable",
                        recap.failures, recap.unreachable
                    ),
                )
            } else {
                TimelineEntry::new(
                    at,
                    Marker::Ok,
                    host,
                    format!("Recap: ok={}, failures={}", recap.ok, recap.failures),
                )
            };
            Noted::line(entry)
        }
        EventKind::DiscoveryServers => Noted::line(TimelineEntry::new(
            at,
            Marker::Info,
            "Discovery",
            format!(
                "{} servers found",
                event.payload.discovered_servers().len()
            ),
        )),
        EventKind::DiscoveryVolumes => Noted::line(TimelineEntry::new(
            at,
            Marker::Info,
            "Discovery",
            format!(
                "{} volumes found",
                event.payload.discovered_volumes().len()
            ),
        )),
        EventKind::ResourceDeleted => Noted::line(TimelineEntry::new(
            at,
            Marker::Ok,
            event.payload.resource_name().unwrap_or("unknown"),
            format!(
                "{} deleted",
                event.payload.resource_type().unwrap_or("resource")
            ),
        )),
        _ => return None,
    };

    Some(noted)
}

/// Name a failure is attributed to
fn failure_target(event: &DeployEvent, kind: EventKind) -> &str {
    let name = match kind {
        EventKind::ResourceFailed => event.payload.resource_name(),
        EventKind::TaskFailed | EventKind::HostUnreachable => event.host(),
        _ => event.entity_name(),
    };
    name.unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::state::VmState;

    fn aggregate() -> RunAggregate {
        RunAggregate::new([VmState::new("sup-a", "M1", "cpu")])
    }

    #[test]
    fn test_routine_events_are_not_noted() {
        let agg = aggregate();
        for kind in ["task_start", "task_ok", "play_start", "install_stage1", "mystery"] {
            assert!(note(&DeployEvent::new(kind).with_host("sup-a"), &agg).is_none());
        }
    }

    #[test]
    fn test_task_failure_line_and_record() {
        let agg = aggregate();
        let event = DeployEvent::new("task_failed")
            .with_task("Install the full model server toolchain")
            .with_host("sup-a")
            .with_data("error", "non-zero return code")
            .with_data("stderr", "E: Could not get lock /var/lib/dpkg/lock");

        let noted = note(&event, &agg).unwrap();
        assert_eq!(noted.entry.marker, Marker::Fail);
        assert_eq!(
            noted.entry.message,
            "Install the full model server : non-zero return code"
        );

        let record = noted.error.unwrap();
        assert_eq!(record.target, "sup-a");
        assert_eq!(record.kind, FailureKind::TaskFailed);
        assert_eq!(record.task, "Install the full model server toolchain");
        assert!(record.stderr.starts_with("E: Could not get lock"));
    }

    #[test]
    fn test_ignored_failure_is_warning_only() {
        let agg = aggregate();
        let event = DeployEvent::new("task_failed")
            .with_host("sup-a")
            .with_data("error", "optional step")
            .with_data("ignored", true);

        let noted = note(&event, &agg).unwrap();
        assert_eq!(noted.entry.marker, Marker::Warn);
        assert_eq!(noted.entry.message, "optional step (ignored)");
        assert!(noted.error.is_none());
    }

    #[test]
    fn test_install_failure_keeps_stage() {
        let agg = aggregate();
        let event = DeployEvent::new("install_failed")
            .with_host("sup-a")
            .with_data("stage", 1)
            .with_data("error", "cloud-init failed");

        let record = note(&event, &agg).unwrap().error.unwrap();
        assert_eq!(
            record.kind,
            FailureKind::InstallFailed {
                stage: "1".to_string()
            }
        );
    }

    #[test]
    fn test_recap_marker() {
        let agg = aggregate();
        let clean = DeployEvent::new("recap").with_host("sup-a").with_data("ok", 12);
        let noted = note(&clean, &agg).unwrap();
        assert_eq!(noted.entry.marker, Marker::Ok);
        assert_eq!(noted.entry.message, "Recap: ok=12, failures=0");

        let bad = DeployEvent::new("recap")
            .with_host("sup-a")
            .with_data("unreachable", 1);
        assert_eq!(note(&bad, &agg).unwrap().entry.marker, Marker::Fail);
    }

    #[test]
    fn test_discovery_line() {
        let agg = aggregate();
        let event = DeployEvent::new("discovery_volumes").with_data("volumes", json!(["a", "b"]));
        assert_eq!(note(&event, &agg).unwrap().entry.message, "2 volumes found");
    }
}
