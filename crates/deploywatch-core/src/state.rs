//! VM and teardown resource state machines
//!
//! ```text
//! pending → creating → provisioned → installing → stage1 ⇄ rebooting → stage2 → completed
//!    ↓          ↓           ↓            ↓          ↓          ↓          ↓
//!  failed     failed      failed       failed     failed     failed     failed
//! ```
//!
//! Progress only moves forward by rank. The single regression is
//! `rebooting → stage1` when a host reports its reboot finished. `completed`
//! and `failed` absorb everything, except that a failed VM still collects
//! additional error detail.

use std::fmt;

use chrono::{Local, TimeZone};
use deploywatch_api::RecapCounts;
use serde::{Deserialize, Serialize};

use crate::text::truncate;

/// Longest task label kept on a VM
const TASK_LABEL_MAX: usize = 40;

/// VM deployment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmStatus {
    Pending,
    Creating,
    Provisioned,
    Installing,
    Stage1,
    Rebooting,
    Stage2,
    Completed,
    Failed,
}

impl VmStatus {
    /// Position along the happy path; `Failed` sorts last
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            VmStatus::Pending => 0,
            VmStatus::Creating => 1,
            VmStatus::Provisioned => 2,
            VmStatus::Installing => 3,
            VmStatus::Stage1 => 4,
            VmStatus::Rebooting => 5,
            VmStatus::Stage2 => 6,
            VmStatus::Completed => 7,
            VmStatus::Failed => 8,
        }
    }

    /// `Completed` or `Failed`
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, VmStatus::Completed | VmStatus::Failed)
    }

    /// Any install sub-state
    #[must_use]
    pub fn is_installing(self) -> bool {
        matches!(
            self,
            VmStatus::Installing | VmStatus::Stage1 | VmStatus::Rebooting | VmStatus::Stage2
        )
    }

    /// Work is in flight for this VM
    #[must_use]
    pub fn is_active(self) -> bool {
        self == VmStatus::Creating || self.is_installing()
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            VmStatus::Pending => "pending",
            VmStatus::Creating => "creating",
            VmStatus::Provisioned => "provisioned",
            VmStatus::Installing => "installing",
            VmStatus::Stage1 => "stage1",
            VmStatus::Rebooting => "rebooting",
            VmStatus::Stage2 => "stage2",
            VmStatus::Completed => "completed",
            VmStatus::Failed => "failed",
        }
    }

    fn is_before(self, other: VmStatus) -> bool {
        self.rank() < other.rank()
    }
}

impl fmt::Display for VmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse run stage, set by playbook boundaries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Provisioning,
    Installing,
    Teardown,
}

impl Phase {
    /// Phase announced by a playbook file name, if any
    #[must_use]
    pub fn from_playbook(playbook: &str) -> Option<Self> {
        let playbook = playbook.to_ascii_lowercase();
        if playbook.contains("provision") {
            Some(Phase::Provisioning)
        } else if playbook.contains("install") {
            Some(Phase::Installing)
        } else if playbook.contains("teardown") {
            Some(Phase::Teardown)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Provisioning => "provisioning",
            Phase::Installing => "installing",
            Phase::Teardown => "teardown",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status transition that actually happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange<S> {
    pub from: S,
    pub to: S,
}

/// Result of a VM transition attempt
pub type VmChange = Option<StatusChange<VmStatus>>;

/// Result of a resource transition attempt
pub type ResourceChange = Option<StatusChange<ResourceStatus>>;

/// State for a VM being deployed
#[derive(Debug, Clone, PartialEq)]
pub struct VmState {
    name: String,
    behavior: String,
    flavor: String,
    status: VmStatus,
    ip_address: String,
    error_text: String,
    current_task_label: String,
    provision_started_at: Option<f64>,
    provision_ended_at: Option<f64>,
    install_started_at: Option<f64>,
    install_ended_at: Option<f64>,
}

impl VmState {
    /// Create a pending VM
    pub fn new(name: impl Into<String>, behavior: impl Into<String>, flavor: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behavior: behavior.into(),
            flavor: flavor.into(),
            status: VmStatus::Pending,
            ip_address: String::new(),
            error_text: String::new(),
            current_task_label: String::new(),
            provision_started_at: None,
            provision_ended_at: None,
            install_started_at: None,
            install_ended_at: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn behavior(&self) -> &str {
        &self.behavior
    }

    #[must_use]
    pub fn flavor(&self) -> &str {
        &self.flavor
    }

    #[must_use]
    pub fn status(&self) -> VmStatus {
        self.status
    }

    #[must_use]
    pub fn ip_address(&self) -> &str {
        &self.ip_address
    }

    #[must_use]
    pub fn error_text(&self) -> &str {
        &self.error_text
    }

    #[must_use]
    pub fn current_task_label(&self) -> &str {
        &self.current_task_label
    }

    #[must_use]
    pub fn provision_started_at(&self) -> Option<f64> {
        self.provision_started_at
    }

    #[must_use]
    pub fn provision_ended_at(&self) -> Option<f64> {
        self.provision_ended_at
    }

    #[must_use]
    pub fn install_started_at(&self) -> Option<f64> {
        self.install_started_at
    }

    #[must_use]
    pub fn install_ended_at(&self) -> Option<f64> {
        self.install_ended_at
    }

    /// Seconds spent provisioning, once both ends are known
    #[must_use]
    pub fn provision_duration(&self) -> Option<f64> {
        Some(self.provision_ended_at? - self.provision_started_at?)
    }

    /// Seconds spent installing, once both ends are known
    #[must_use]
    pub fn install_duration(&self) -> Option<f64> {
        Some(self.install_ended_at? - self.install_started_at?)
    }

    /// Local `HH:MM:SS` at which provisioning finished
    #[must_use]
    pub fn provision_time(&self) -> Option<String> {
        self.provision_ended_at.and_then(clock_time)
    }

    /// Local `HH:MM:SS` at which the install finished
    #[must_use]
    pub fn install_time(&self) -> Option<String> {
        self.install_ended_at.and_then(clock_time)
    }

    fn set_status(&mut self, to: VmStatus) -> VmChange {
        if self.status == to {
            return None;
        }
        let from = std::mem::replace(&mut self.status, to);
        Some(StatusChange { from, to })
    }

    fn set_label(&mut self, label: &str) {
        self.current_task_label = truncate(label, TASK_LABEL_MAX).to_string();
    }

    /// Provisioning playbook started: `pending → creating`
    pub fn begin_provisioning(&mut self, at: f64) -> VmChange {
        if self.status != VmStatus::Pending {
            return None;
        }
        self.provision_started_at = stamp(at).or(self.provision_started_at);
        self.set_status(VmStatus::Creating)
    }

    /// Creation started, or the VM already existed
    pub fn mark_creating(&mut self, at: f64) -> VmChange {
        if !matches!(self.status, VmStatus::Pending | VmStatus::Creating) {
            return None;
        }
        self.provision_started_at = self.provision_started_at.or(stamp(at));
        self.set_status(VmStatus::Creating)
    }

    /// VM reached ACTIVE
    pub fn mark_provisioned(&mut self, at: f64) -> VmChange {
        if !self.status.is_before(VmStatus::Provisioned) {
            return None;
        }
        self.provision_ended_at = stamp(at).or(self.provision_ended_at);
        self.set_status(VmStatus::Provisioned)
    }

    /// Install playbook started: `provisioned`/`pending → installing`
    pub fn begin_install(&mut self, at: f64) -> VmChange {
        if !matches!(self.status, VmStatus::Provisioned | VmStatus::Pending) {
            return None;
        }
        self.install_started_at = stamp(at).or(self.install_started_at);
        self.set_status(VmStatus::Installing)
    }

    /// Host is waiting for cloud-init before the install stages
    pub fn mark_preparing(&mut self, at: f64) -> VmChange {
        if !self.status.is_before(VmStatus::Stage1) {
            return None;
        }
        self.install_started_at = self.install_started_at.or(stamp(at));
        self.set_label("Preparing: cloud-init");
        self.set_status(VmStatus::Installing)
    }

    /// Stage 1 (system dependencies) started
    pub fn enter_stage1(&mut self, at: f64) -> VmChange {
        if !self.status.is_before(VmStatus::Stage1) {
            return None;
        }
        self.install_started_at = self.install_started_at.or(stamp(at));
        self.set_label("Stage 1: System deps");
        self.set_status(VmStatus::Stage1)
    }

    /// Reboot between the stages started
    pub fn start_reboot(&mut self) -> VmChange {
        if !matches!(self.status, VmStatus::Installing | VmStatus::Stage1) {
            return None;
        }
        self.set_label("Rebooting");
        self.set_status(VmStatus::Rebooting)
    }

    /// Reboot finished: back to `stage1` until stage 2 starts
    ///
    /// A late report for a host that already moved on is a no-op.
    pub fn finish_reboot(&mut self) -> VmChange {
        if self.status != VmStatus::Rebooting {
            return None;
        }
        self.set_label("Reboot complete");
        self.set_status(VmStatus::Stage1)
    }

    /// Stage 2 (application install) started
    pub fn enter_stage2(&mut self, at: f64) -> VmChange {
        if !self.status.is_before(VmStatus::Stage2) {
            return None;
        }
        self.install_started_at = self.install_started_at.or(stamp(at));
        self.set_label("Stage 2: SUP install");
        self.set_status(VmStatus::Stage2)
    }

    /// Stage 2 finished on this host
    pub fn complete_install(&mut self, at: f64) -> VmChange {
        if !self.status.is_installing() {
            return None;
        }
        self.install_ended_at = stamp(at).or(self.install_ended_at);
        self.set_status(VmStatus::Completed)
    }

    /// Hard failure
    ///
    /// A failed VM keeps its status but appends the new detail; a completed
    /// VM is left alone.
    pub fn fail(&mut self, message: impl Into<String>) -> VmChange {
        let message = message.into();
        match self.status {
            VmStatus::Completed => None,
            VmStatus::Failed => {
                self.attach_error(&message);
                None
            }
            _ => {
                self.error_text = message;
                self.set_status(VmStatus::Failed)
            }
        }
    }

    fn attach_error(&mut self, message: &str) {
        if self.error_text.is_empty() {
            self.error_text = message.to_string();
        } else if !message.is_empty() && !self.error_text.contains(message) {
            self.error_text.push_str("; ");
            self.error_text.push_str(message);
        }
    }

    /// Per-host summary at the end of a playbook
    ///
    /// Failures force `failed`. A clean recap settles the VM in the terminal
    /// state of the current phase, covering hosts whose stage events never
    /// arrived.
    pub fn apply_recap(&mut self, recap: &RecapCounts, phase: Phase, at: f64) -> VmChange {
        if recap.has_failures() {
            if self.error_text.is_empty() && self.status != VmStatus::Completed {
                self.error_text = format!(
                    "Recap: {} failures, {} unreachable",
                    recap.failures, recap.unreachable
                );
            }
            if self.status.is_terminal() {
                return None;
            }
            return self.set_status(VmStatus::Failed);
        }

        if self.status.is_terminal() {
            return None;
        }

        match phase {
            Phase::Installing => {
                self.install_ended_at = stamp(at).or(self.install_ended_at);
                self.set_status(VmStatus::Completed)
            }
            Phase::Provisioning if self.status.is_before(VmStatus::Provisioned) => {
                self.provision_ended_at = stamp(at).or(self.provision_ended_at);
                self.set_status(VmStatus::Provisioned)
            }
            _ => None,
        }
    }

    /// Record the VM's address; empty values are ignored
    pub fn set_ip(&mut self, ip: &str) {
        if !ip.is_empty() {
            self.ip_address = ip.to_string();
        }
    }

    /// Update the label shown next to an unfinished VM
    pub fn set_task_label(&mut self, label: &str) {
        if !self.status.is_terminal() {
            self.set_label(label);
        }
    }
}

/// Teardown resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Server,
    Volume,
}

impl ResourceKind {
    /// Parse the `type` field of a teardown event
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "server" => Some(ResourceKind::Server),
            "volume" => Some(ResourceKind::Volume),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Server => "server",
            ResourceKind::Volume => "volume",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource deletion status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Pending,
    Deleting,
    Deleted,
    Failed,
}

impl ResourceStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, ResourceStatus::Deleted | ResourceStatus::Failed)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceStatus::Pending => "pending",
            ResourceStatus::Deleting => "deleting",
            ResourceStatus::Deleted => "deleted",
            ResourceStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State for a server or volume being deleted
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceState {
    id: String,
    name: String,
    kind: ResourceKind,
    status: ResourceStatus,
    delete_started_at: Option<f64>,
    delete_ended_at: Option<f64>,
    error_text: String,
}

impl ResourceState {
    /// Create a pending resource
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            status: ResourceStatus::Pending,
            delete_started_at: None,
            delete_ended_at: None,
            error_text: String::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    #[must_use]
    pub fn status(&self) -> ResourceStatus {
        self.status
    }

    #[must_use]
    pub fn error_text(&self) -> &str {
        &self.error_text
    }

    #[must_use]
    pub fn delete_started_at(&self) -> Option<f64> {
        self.delete_started_at
    }

    #[must_use]
    pub fn delete_ended_at(&self) -> Option<f64> {
        self.delete_ended_at
    }

    /// Local `HH:MM:SS` at which the deletion was confirmed
    #[must_use]
    pub fn delete_time(&self) -> Option<String> {
        self.delete_ended_at.and_then(clock_time)
    }

    /// Whether a teardown report names this resource
    ///
    /// Producers report either the display name or a truncated ID.
    #[must_use]
    pub fn matches(&self, reported: &str) -> bool {
        !reported.is_empty() && (self.name == reported || self.id.starts_with(reported))
    }

    fn set_status(&mut self, to: ResourceStatus) -> ResourceChange {
        if self.status == to {
            return None;
        }
        let from = std::mem::replace(&mut self.status, to);
        Some(StatusChange { from, to })
    }

    /// Deletion requested
    pub fn mark_deleting(&mut self, at: f64) -> ResourceChange {
        if self.status != ResourceStatus::Pending {
            return None;
        }
        self.delete_started_at = stamp(at).or(self.delete_started_at);
        self.set_status(ResourceStatus::Deleting)
    }

    /// Deletion confirmed
    pub fn mark_deleted(&mut self, at: f64) -> ResourceChange {
        if self.status.is_terminal() {
            return None;
        }
        self.delete_ended_at = stamp(at).or(self.delete_ended_at);
        self.set_status(ResourceStatus::Deleted)
    }

    /// Deletion failed
    pub fn mark_failed(&mut self, error: &str) -> ResourceChange {
        match self.status {
            ResourceStatus::Deleted => None,
            ResourceStatus::Failed => {
                if self.error_text.is_empty() {
                    self.error_text = error.to_string();
                }
                None
            }
            _ => {
                self.error_text = error.to_string();
                self.set_status(ResourceStatus::Failed)
            }
        }
    }
}

/// Producer timestamps of zero or below mean the time is unknown
fn stamp(at: f64) -> Option<f64> {
    (at.is_finite() && at > 0.0).then_some(at)
}

/// Render a producer timestamp as local wall-clock time
fn clock_time(unix: f64) -> Option<String> {
    if !unix.is_finite() {
        return None;
    }
    let secs = unix.floor();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let nanos = ((unix - secs) * 1e9) as u32;
    #[allow(clippy::cast_possible_truncation)]
    let secs = secs as i64;
    Local
        .timestamp_opt(secs, nanos)
        .single()
        .map(|dt| dt.format("%H:%M:%S").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm() -> VmState {
        VmState::new("sup-a", "M1", "v1.14vcpu.28g")
    }

    fn clean_recap() -> RecapCounts {
        RecapCounts {
            ok: 10,
            ..RecapCounts::default()
        }
    }

    #[test]
    fn test_happy_path() {
        let mut vm = vm();

        assert!(vm.mark_creating(100.0).is_some());
        assert!(vm.mark_provisioned(160.0).is_some());
        assert!(vm.enter_stage1(200.0).is_some());
        assert!(vm.start_reboot().is_some());
        assert!(vm.finish_reboot().is_some());
        assert_eq!(vm.status(), VmStatus::Stage1);
        assert!(vm.enter_stage2(400.0).is_some());
        assert!(vm.complete_install(700.0).is_some());

        assert_eq!(vm.status(), VmStatus::Completed);
        assert_eq!(vm.provision_duration(), Some(60.0));
        assert_eq!(vm.install_duration(), Some(500.0));
        assert!(vm.provision_time().is_some());
    }

    #[test]
    fn test_unknown_times_are_not_stamped() {
        let mut vm = vm();
        vm.mark_creating(0.0);
        vm.mark_creating(100.0);
        assert_eq!(vm.provision_started_at(), Some(100.0));

        vm.mark_provisioned(0.0);
        assert_eq!(vm.status(), VmStatus::Provisioned);
        assert_eq!(vm.provision_ended_at(), None);
        assert_eq!(vm.provision_duration(), None);
        assert_eq!(vm.provision_time(), None);

        let mut res = ResourceState::new("vol-1", "vol-1", ResourceKind::Volume);
        res.mark_deleting(50.0);
        res.mark_deleted(-1.0);
        assert_eq!(res.delete_started_at(), Some(50.0));
        assert_eq!(res.delete_time(), None);
    }

    #[test]
    fn test_reboot_complete_only_regresses_rebooting() {
        let mut vm = vm();
        vm.enter_stage2(10.0);

        assert_eq!(vm.finish_reboot(), None);
        assert_eq!(vm.status(), VmStatus::Stage2);
    }

    #[test]
    fn test_progress_never_moves_backwards() {
        let mut vm = vm();
        vm.enter_stage2(10.0);

        assert_eq!(vm.mark_creating(20.0), None);
        assert_eq!(vm.mark_provisioned(20.0), None);
        assert_eq!(vm.enter_stage1(20.0), None);
        assert_eq!(vm.begin_install(20.0), None);
        assert_eq!(vm.status(), VmStatus::Stage2);
    }

    #[test]
    fn test_completed_absorbs_failure() {
        let mut vm = vm();
        vm.enter_stage1(1.0);
        vm.complete_install(2.0);

        assert_eq!(vm.fail("late failure"), None);
        assert_eq!(vm.status(), VmStatus::Completed);
        assert!(vm.error_text().is_empty());
    }

    #[test]
    fn test_failed_accumulates_detail() {
        let mut vm = vm();

        let change = vm.fail("quota exceeded").unwrap();
        assert_eq!(change.from, VmStatus::Pending);
        assert_eq!(change.to, VmStatus::Failed);

        assert_eq!(vm.fail("cleanup failed"), None);
        assert_eq!(vm.fail("quota exceeded"), None);
        assert_eq!(vm.error_text(), "quota exceeded; cleanup failed");
        assert_eq!(vm.mark_provisioned(5.0), None);
        assert_eq!(vm.status(), VmStatus::Failed);
    }

    #[test]
    fn test_recap_success_depends_on_phase() {
        let mut provisioning = vm();
        provisioning.apply_recap(&clean_recap(), Phase::Provisioning, 50.0);
        assert_eq!(provisioning.status(), VmStatus::Provisioned);
        assert_eq!(provisioning.provision_ended_at(), Some(50.0));

        let mut installing = vm();
        installing.begin_install(10.0);
        installing.apply_recap(&clean_recap(), Phase::Installing, 90.0);
        assert_eq!(installing.status(), VmStatus::Completed);
        assert_eq!(installing.install_ended_at(), Some(90.0));

        let mut idle = vm();
        assert_eq!(idle.apply_recap(&clean_recap(), Phase::Idle, 1.0), None);
        assert_eq!(idle.status(), VmStatus::Pending);
    }

    #[test]
    fn test_recap_failures_force_failed() {
        let mut vm = vm();
        vm.enter_stage1(1.0);

        let recap = RecapCounts {
            failures: 2,
            unreachable: 1,
            ..RecapCounts::default()
        };
        vm.apply_recap(&recap, Phase::Installing, 5.0);

        assert_eq!(vm.status(), VmStatus::Failed);
        assert_eq!(vm.error_text(), "Recap: 2 failures, 1 unreachable");
    }

    #[test]
    fn test_task_label_truncated_and_frozen_when_terminal() {
        let mut vm = vm();
        vm.set_task_label("Wait for cloud-init to finish on every single host");
        assert_eq!(vm.current_task_label().chars().count(), 40);

        vm.fail("boom");
        vm.set_task_label("after");
        assert_ne!(vm.current_task_label(), "after");
    }

    #[test]
    fn test_resource_lifecycle() {
        let mut res = ResourceState::new(
            "0f1e2d3c-aaaa-bbbb-cccc-000000000001",
            "sup-web-0",
            ResourceKind::Server,
        );

        assert!(res.matches("sup-web-0"));
        assert!(res.matches("0f1e2d3c"));
        assert!(!res.matches(""));
        assert!(!res.matches("sup-web-1"));

        assert!(res.mark_deleting(1.0).is_some());
        assert!(res.mark_deleted(2.0).is_some());
        assert_eq!(res.mark_failed("too late"), None);
        assert_eq!(res.status(), ResourceStatus::Deleted);
        assert!(res.delete_time().is_some());
    }

    #[test]
    fn test_resource_failed_absorbs() {
        let mut res = ResourceState::new("vol-1", "vol-1", ResourceKind::Volume);

        res.mark_failed("volume is attached");
        assert_eq!(res.mark_deleted(3.0), None);
        assert_eq!(res.status(), ResourceStatus::Failed);
        assert_eq!(res.error_text(), "volume is attached");
    }

    #[test]
    fn test_phase_from_playbook() {
        assert_eq!(
            Phase::from_playbook("provision-vms.yaml"),
            Some(Phase::Provisioning)
        );
        assert_eq!(
            Phase::from_playbook("install-sups.yaml"),
            Some(Phase::Installing)
        );
        assert_eq!(Phase::from_playbook("teardown.yaml"), Some(Phase::Teardown));
        assert_eq!(Phase::from_playbook("site.yaml"), None);
    }
}
