//! Structured failure records kept for the error section of the report

use std::fmt;

use chrono::NaiveDateTime;

/// What kind of failure produced an [`ErrorRecord`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// VM creation failed
    VmFailed,
    /// An install stage failed on the host
    InstallFailed {
        /// Stage as reported (`"1"`, `"2"`, or `"?"`)
        stage: String,
    },
    /// A playbook task failed
    TaskFailed,
    /// SSH to the host failed
    Unreachable,
    /// A teardown deletion failed
    ResourceFailed,
}

impl FailureKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::VmFailed => "vm_failed",
            FailureKind::InstallFailed { .. } => "install_failed",
            FailureKind::TaskFailed => "task_failed",
            FailureKind::Unreachable => "unreachable",
            FailureKind::ResourceFailed => "resource_failed",
        }
    }

    /// Install stage this failure happened in, if it was an install failure
    #[must_use]
    pub fn install_stage(&self) -> Option<&str> {
        match self {
            FailureKind::InstallFailed { stage } => Some(stage),
            _ => None,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InstallFailed { stage } => write!(f, "install_failed (stage {stage})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// One non-ignored failure, with everything needed to debug it later
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    /// Producer timestamp of the failure event
    pub at: NaiveDateTime,
    /// VM, host or resource name
    pub target: String,
    /// Task running when it failed (may be empty)
    pub task: String,
    /// Error text
    pub error: String,
    pub kind: FailureKind,
    /// Captured stderr, empty when the producer sent none
    pub stderr: String,
}

impl ErrorRecord {
    pub fn new(
        at: NaiveDateTime,
        target: impl Into<String>,
        error: impl Into<String>,
        kind: FailureKind,
    ) -> Self {
        Self {
            at,
            target: target.into(),
            task: String::new(),
            error: error.into(),
            kind,
            stderr: String::new(),
        }
    }

    #[must_use]
    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = task.into();
        self
    }

    #[must_use]
    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }
}
