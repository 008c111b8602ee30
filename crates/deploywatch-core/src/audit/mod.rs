//! Markdown audit log of a deployment run
//!
//! The file is written incrementally: a header and a live progress feed while
//! the run is in flight, then timeline, errors and final summary sections
//! when the writer is closed. Every write is flushed so the report can be
//! read while the run is still going.

mod record;
mod remediation;
mod timeline;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Local};
use deploywatch_api::DeployEvent;
use tracing::{debug, info};

pub use record::{ErrorRecord, FailureKind};
pub use remediation::{rule_names, suggest, suggest_fix, Remediation};
pub use timeline::{Marker, TimelineEntry};

use crate::aggregate::{RunAggregate, RunVerdict};
use crate::error::CoreError;
use crate::state::VmStatus;
use crate::text::truncate;

/// Longest stderr excerpt copied into an error block
const STDERR_MAX: usize = 500;

/// Longest error text in the per-VM summary table
const TABLE_ERROR_MAX: usize = 30;

/// Audit log path for a run started now: `deploy-{name}-{YYYYmmdd-HHMMSS}.md`
#[must_use]
pub fn create_log_path(logs_dir: &Path, run_name: &str) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    logs_dir.join(format!("deploy-{run_name}-{stamp}.md"))
}

/// Open audit log for one run
///
/// Closing consumes the writer, so the summary is written exactly once.
pub struct AuditLog {
    path: PathBuf,
    run_name: String,
    started_at: DateTime<Local>,
    started: Instant,
    out: BufWriter<File>,
    timeline: Vec<TimelineEntry>,
    errors: Vec<ErrorRecord>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("path", &self.path)
            .field("run_name", &self.run_name)
            .field("timeline", &self.timeline.len())
            .field("errors", &self.errors.len())
            .finish_non_exhaustive()
    }
}

impl AuditLog {
    /// Create (or truncate) the log file and write the header
    ///
    /// # Errors
    /// Returns `CoreError::AuditLog` if the directory or file cannot be
    /// created or written
    pub fn open(path: impl Into<PathBuf>, run_name: impl Into<String>) -> Result<Self, CoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| audit_error(&path, &e))?;
        }
        let file = File::create(&path).map_err(|e| audit_error(&path, &e))?;

        let mut log = Self {
            path,
            run_name: run_name.into(),
            started_at: Local::now(),
            started: Instant::now(),
            out: BufWriter::new(file),
            timeline: Vec::new(),
            errors: Vec::new(),
        };
        log.write_header()?;

        info!(path = %log.path.display(), run = %log.run_name, "audit log opened");
        Ok(log)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn timeline(&self) -> &[TimelineEntry] {
        &self.timeline
    }

    #[must_use]
    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    /// Note one event; `aggregate` must already reflect it
    ///
    /// Significant events go to the progress feed right away and are kept
    /// for the timeline; failures are kept for the error section.
    ///
    /// # Errors
    /// Returns `CoreError::AuditLog` if the progress line cannot be written
    pub fn record(&mut self, event: &DeployEvent, aggregate: &RunAggregate) -> Result<(), CoreError> {
        let Some(noted) = timeline::note(event, aggregate) else {
            return Ok(());
        };

        let line = noted.entry.to_line();
        self.write_line(&line)?;
        self.timeline.push(noted.entry);

        if let Some(error) = noted.error {
            debug!(target_name = %error.target, kind = %error.kind, "failure recorded");
            self.errors.push(error);
        }
        Ok(())
    }

    /// Write the closing sections and close the file
    ///
    /// # Errors
    /// Returns `CoreError::AuditLog` if any section cannot be written
    pub fn close(mut self, aggregate: &RunAggregate) -> Result<RunVerdict, CoreError> {
        self.write_timeline()?;
        self.write_errors()?;
        let verdict = self.write_summary(aggregate)?;

        info!(path = %self.path.display(), verdict = %verdict, "audit log closed");
        Ok(verdict)
    }

    // ------------------------------------------------------------------
    // Sections
    // ------------------------------------------------------------------

    fn write_header(&mut self) -> Result<(), CoreError> {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let header = format!(
            "# Deployment Log\n\n\
             ## Summary\n\
             - **Deployment**: {}\n\
             - **Started**: {}\n\
             - **Log File**: {}\n\n\
             ---\n\n\
             ## Progress\n\n",
            self.run_name,
            self.started_at.format("%Y-%m-%dT%H:%M:%S%.6f"),
            file_name
        );
        self.write_text(&header)
    }

    fn write_timeline(&mut self) -> Result<(), CoreError> {
        if self.timeline.is_empty() {
            return Ok(());
        }

        let mut entries = std::mem::take(&mut self.timeline);
        entries.sort_by_key(|e| e.at);

        let mut text = String::from("\n## Timeline\n\n");
        let mut current_date = None;
        for entry in &entries {
            let date = entry.at.date();
            if current_date != Some(date) {
                current_date = Some(date);
                text.push_str(&format!("### {}\n\n", date.format("%Y-%m-%d")));
            }
            text.push_str(&entry.to_line());
            text.push('\n');
        }
        text.push('\n');

        self.timeline = entries;
        self.write_text(&text)
    }

    fn write_errors(&mut self) -> Result<(), CoreError> {
        if self.errors.is_empty() {
            return Ok(());
        }

        let mut text = String::from("## Errors\n\n");
        for (i, err) in self.errors.iter().enumerate() {
            text.push_str(&format!(
                "### Error {}: {} at {}\n\n",
                i + 1,
                err.target,
                err.at.format("%H:%M:%S")
            ));
            text.push_str(&format!("**Task**: {}\n\n", err.task));
            text.push_str(&format!("**Type**: {}\n\n", err.kind));
            text.push_str(&format!("**Error Message**:\n```\n{}\n```\n\n", err.error));
            if !err.stderr.is_empty() {
                text.push_str(&format!(
                    "**Stderr**:\n```\n{}\n```\n\n",
                    truncate(&err.stderr, STDERR_MAX)
                ));
            }
            let fix = suggest_fix(err);
            if !fix.is_empty() {
                text.push_str(&format!("**Suggested Fix**: {fix}\n\n"));
            }
            text.push_str("---\n\n");
        }

        self.write_text(&text)
    }

    fn write_summary(&mut self, aggregate: &RunAggregate) -> Result<RunVerdict, CoreError> {
        let counts = aggregate.counts();
        let verdict = aggregate.verdict();

        let mut text = String::from("## Final Summary\n\n");
        text.push_str(&format!("- **Status**: {verdict}\n"));
        text.push_str(&format!(
            "- **Total Time**: {}\n",
            format_elapsed(self.started.elapsed().as_secs())
        ));
        text.push_str(&format!(
            "- **VMs**: {}/{} completed, {} failed\n\n",
            counts.completed, counts.total, counts.failed
        ));

        if aggregate.vm_count() > 0 {
            text.push_str("| VM Name | Behavior | Status | Provision | Install | Error |\n");
            text.push_str("|---------|----------|--------|-----------|---------|-------|\n");
            for vm in aggregate.vms() {
                let status = match vm.status() {
                    VmStatus::Completed => "[OK]".to_string(),
                    VmStatus::Failed => "[FAIL]".to_string(),
                    other => format!("[{}]", other.as_str().to_uppercase()),
                };
                text.push_str(&format!(
                    "| {} | {} | {} | {} | {} | {} |\n",
                    vm.name(),
                    vm.behavior(),
                    status,
                    vm.provision_time().as_deref().unwrap_or("-"),
                    vm.install_time().as_deref().unwrap_or("-"),
                    truncate(vm.error_text(), TABLE_ERROR_MAX)
                ));
            }
            text.push('\n');
        }

        let resources = aggregate.resource_counts();
        if !resources.is_empty() {
            text.push_str("### Teardown Resources\n\n");
            text.push_str(&format!(
                "- **Servers**: {}/{} deleted\n",
                resources.servers.deleted, resources.servers.total
            ));
            text.push_str(&format!(
                "- **Volumes**: {}/{} deleted\n",
                resources.volumes.deleted, resources.volumes.total
            ));
            if resources.servers.failed > 0 || resources.volumes.failed > 0 {
                text.push_str(&format!(
                    "- **Failed**: {} servers, {} volumes\n",
                    resources.servers.failed, resources.volumes.failed
                ));
            }
            text.push('\n');
        }

        self.write_text(&text)?;
        Ok(verdict)
    }

    // ------------------------------------------------------------------
    // I/O
    // ------------------------------------------------------------------

    fn write_line(&mut self, line: &str) -> Result<(), CoreError> {
        self.write_text(&format!("{line}\n"))
    }

    fn write_text(&mut self, text: &str) -> Result<(), CoreError> {
        self.out
            .write_all(text.as_bytes())
            .and_then(|()| self.out.flush())
            .map_err(|e| audit_error(&self.path, &e))
    }
}

fn audit_error(path: &Path, err: &std::io::Error) -> CoreError {
    CoreError::AuditLog {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

/// `HH:MM:SS`, hours not wrapped
fn format_elapsed(secs: u64) -> String {
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;
    use crate::state::VmState;

    fn at(hour: u32, min: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_opt(hour, min, 0)
            .unwrap()
    }

    fn feed(log: &mut AuditLog, agg: &mut RunAggregate, event: DeployEvent) {
        agg.apply(&event);
        log.record(&event, agg).unwrap();
    }

    #[test]
    fn test_create_log_path() {
        let path = create_log_path(Path::new("logs"), "exp-2");
        let name = path.file_name().unwrap().to_string_lossy().into_owned();

        assert_eq!(path.parent(), Some(Path::new("logs")));
        assert!(name.starts_with("deploy-exp-2-"));
        assert!(name.ends_with(".md"));
        // deploy-exp-2-YYYYmmdd-HHMMSS.md
        assert_eq!(name.len(), "deploy-exp-2-".len() + 15 + 3);
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "00:00:00");
        assert_eq!(format_elapsed(3725), "01:02:05");
        assert_eq!(format_elapsed(100 * 3600), "100:00:00");
    }

    #[test]
    fn test_open_creates_directories_and_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/logs/run.md");

        let log = AuditLog::open(&path, "exp-1").unwrap();
        let verdict = log.close(&RunAggregate::new([])).unwrap();
        assert_eq!(verdict, RunVerdict::Incomplete);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# Deployment Log"));
        assert!(text.contains("- **Deployment**: exp-1"));
        assert!(text.contains("- **Log File**: run.md"));
        assert!(text.contains("## Final Summary"));
    }

    #[test]
    fn test_report_sections_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.md");
        let mut agg = RunAggregate::new([
            VmState::new("sup-a", "M1", "cpu"),
            VmState::new("sup-b", "B2", "gpu"),
        ]);
        let mut log = AuditLog::open(&path, "exp-2").unwrap();

        feed(
            &mut log,
            &mut agg,
            DeployEvent::new("playbook_start")
                .with_data("playbook", "provision-vms.yaml")
                .at(at(10, 0), 1.0),
        );
        feed(
            &mut log,
            &mut agg,
            DeployEvent::new("vm_failed")
                .with_data("vm_name", "sup-b")
                .with_data("error", "Quota exceeded for cores")
                .at(at(10, 2), 2.0),
        );
        feed(
            &mut log,
            &mut agg,
            DeployEvent::new("vm_provisioned")
                .with_data("vm_name", "sup-a")
                .at(at(10, 1), 3.0),
        );

        let verdict = log.close(&agg).unwrap();
        assert_eq!(verdict, RunVerdict::CompletedWithErrors);

        let text = std::fs::read_to_string(&path).unwrap();
        let positions: Vec<usize> = [
            "# Deployment Log",
            "## Progress",
            "## Timeline",
            "## Errors",
            "## Final Summary",
        ]
        .iter()
        .map(|heading| text.find(heading).unwrap())
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));

        // timeline is sorted even though events arrived out of order
        let timeline = &text[positions[2]..positions[3]];
        let provisioned = timeline.find("**sup-a**: provisioned").unwrap();
        let failed = timeline.find("**sup-b**: Quota exceeded").unwrap();
        assert!(provisioned < failed);
        assert!(timeline.contains("### 2025-03-01"));

        assert!(text.contains("**Suggested Fix**: Check project quota limits"));
        assert!(text.contains("- **Status**: COMPLETED WITH ERRORS"));
        assert!(text.contains("| sup-a | M1 | [PROVISIONED] |"));
        assert!(text.contains("| sup-b | B2 | [FAIL] | - | - | Quota exceeded for cores |"));
    }

    #[test]
    fn test_progress_is_flushed_before_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.md");
        let mut agg = RunAggregate::new([VmState::new("sup-a", "M1", "cpu")]);
        let mut log = AuditLog::open(&path, "live").unwrap();

        feed(
            &mut log,
            &mut agg,
            DeployEvent::new("host_unreachable").with_host("sup-a"),
        );

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("[FAIL] **sup-a**: Host unreachable"));
        assert!(!text.contains("## Timeline"));
        assert_eq!(log.errors().len(), 1);
    }

    #[test]
    fn test_ignored_failure_not_in_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.md");
        let mut agg = RunAggregate::new([VmState::new("sup-a", "M1", "cpu")]);
        let mut log = AuditLog::open(&path, "ignored").unwrap();

        feed(
            &mut log,
            &mut agg,
            DeployEvent::new("task_failed")
                .with_host("sup-a")
                .with_data("error", "optional")
                .with_data("ignored", true),
        );
        log.close(&agg).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("[WARN] **sup-a**: optional (ignored)"));
        assert!(!text.contains("## Errors"));
    }

    #[test]
    fn test_stderr_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.md");
        let mut agg = RunAggregate::new([VmState::new("sup-a", "M1", "cpu")]);
        let mut log = AuditLog::open(&path, "stderr").unwrap();

        feed(
            &mut log,
            &mut agg,
            DeployEvent::new("task_failed")
                .with_task("compile")
                .with_host("sup-a")
                .with_data("stderr", "x".repeat(900)),
        );
        log.close(&agg).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains(&format!("```\n{}\n```", "x".repeat(500))));
        assert!(!text.contains(&"x".repeat(501)));
    }

    #[test]
    fn test_teardown_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.md");
        let mut agg = RunAggregate::new([]);
        let mut log = AuditLog::open(&path, "teardown").unwrap();

        feed(
            &mut log,
            &mut agg,
            DeployEvent::new("discovery_volumes").with_data("volumes", json!(["vol-1", "vol-2"])),
        );
        feed(
            &mut log,
            &mut agg,
            DeployEvent::new("resource_deleted")
                .with_data("name", "vol-1")
                .with_data("type", "volume"),
        );
        feed(
            &mut log,
            &mut agg,
            DeployEvent::new("resource_failed")
                .with_data("name", "vol-2")
                .with_data("type", "volume")
                .with_data("error", "volume is in-use"),
        );

        let verdict = log.close(&agg).unwrap();
        assert_eq!(verdict, RunVerdict::CompletedWithErrors);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("### Teardown Resources"));
        assert!(text.contains("- **Volumes**: 1/2 deleted"));
        assert!(text.contains("- **Failed**: 0 servers, 1 volumes"));
        assert!(!text.contains("| VM Name |"));
    }
}
