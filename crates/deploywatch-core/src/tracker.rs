//! Event processing for one run: aggregate plus optional audit log
//!
//! `Tracker` is the single owner of a run's mutable state. It is driven
//! directly in tests and by the `TrackerActor` in the binary.

use std::path::PathBuf;

use deploywatch_api::DeployEvent;
use tracing::{info, warn};

use crate::aggregate::RunAggregate;
use crate::audit::AuditLog;
use crate::error::CoreError;
use crate::message::{RunOutcome, RunSnapshot, StatusCounts};

/// Applies events in order and keeps the audit log in step
#[derive(Debug)]
pub struct Tracker {
    aggregate: RunAggregate,
    audit: Option<AuditLog>,
    audit_path: Option<PathBuf>,
    events: u64,
    finished: bool,
}

impl Tracker {
    /// Track without writing a report
    #[must_use]
    pub fn new(aggregate: RunAggregate) -> Self {
        Self {
            aggregate,
            audit: None,
            audit_path: None,
            events: 0,
            finished: false,
        }
    }

    /// Write the report to `audit`
    #[must_use]
    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit_path = Some(audit.path().to_path_buf());
        self.audit = Some(audit);
        self
    }

    #[must_use]
    pub fn aggregate(&self) -> &RunAggregate {
        &self.aggregate
    }

    /// Events applied so far
    #[must_use]
    pub fn events(&self) -> u64 {
        self.events
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Apply one event, then note it in the audit log
    ///
    /// # Errors
    /// Returns `CoreError::AuditLog` if the report cannot be written, or
    /// `CoreError::AuditLogClosed` once the run was finished
    pub fn process(&mut self, event: &DeployEvent) -> Result<(), CoreError> {
        if self.finished {
            return Err(CoreError::AuditLogClosed);
        }

        self.aggregate.apply(event);
        self.events += 1;

        if let Some(audit) = &mut self.audit {
            audit.record(event, &self.aggregate)?;
        }
        Ok(())
    }

    /// Current counts
    #[must_use]
    pub fn counts(&self) -> StatusCounts {
        StatusCounts {
            phase: self.aggregate.phase(),
            vms: self.aggregate.counts(),
            resources: self.aggregate.resource_counts(),
        }
    }

    /// Immutable copy of every entity
    #[must_use]
    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            phase: self.aggregate.phase(),
            vms: self.aggregate.vms().cloned().collect(),
            servers: self.aggregate.servers().iter().cloned().collect(),
            volumes: self.aggregate.volumes().iter().cloned().collect(),
            counts: self.aggregate.counts(),
            resource_counts: self.aggregate.resource_counts(),
            verdict: self.aggregate.verdict(),
        }
    }

    /// Close the audit log and compute the verdict
    ///
    /// The aggregate stays readable afterwards; further events are rejected.
    ///
    /// # Errors
    /// Returns `CoreError::AuditLogClosed` on a second call, or
    /// `CoreError::AuditLog` if the closing sections cannot be written
    pub fn finish(&mut self) -> Result<RunOutcome, CoreError> {
        if self.finished {
            return Err(CoreError::AuditLogClosed);
        }
        self.finished = true;

        let verdict = match self.audit.take() {
            Some(audit) => audit.close(&self.aggregate)?,
            None => self.aggregate.verdict(),
        };

        let outcome = RunOutcome {
            verdict,
            counts: self.aggregate.counts(),
            resources: self.aggregate.resource_counts(),
            events: self.events,
            audit_path: self.audit_path.clone(),
        };

        if verdict.is_failure() {
            warn!(verdict = %verdict, failed = outcome.counts.failed, "run finished with errors");
        } else {
            info!(verdict = %verdict, events = self.events, "run finished");
        }
        Ok(outcome)
    }
}
