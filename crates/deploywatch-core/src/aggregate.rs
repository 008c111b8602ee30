//! Run aggregate: entity collections, event dispatch and derived counts
//!
//! Every decoded event goes through [`RunAggregate::apply`], which maps the
//! event kind to exactly one handler. Handlers touch a single VM or resource,
//! except the phase sweeps, the hostless install-stage sweeps and the
//! label-only `task_start` sweep.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use deploywatch_api::{DeployEvent, EventKind, MonitorEvent};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::config::DeploymentManifest;
use crate::state::{
    Phase, ResourceChange, ResourceKind, ResourceState, ResourceStatus, StatusChange, VmChange,
    VmState, VmStatus,
};

/// VM tally by status bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VmCounts {
    pub total: usize,
    pub pending: usize,
    pub creating: usize,
    pub provisioned: usize,
    /// `installing` and its stage sub-states
    pub installing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl VmCounts {
    /// Sum of all buckets; always equals `total`
    #[must_use]
    pub fn bucket_sum(&self) -> usize {
        self.pending
            + self.creating
            + self.provisioned
            + self.installing
            + self.completed
            + self.failed
    }
}

/// Tally of one resource type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResourceTally {
    pub total: usize,
    pub pending: usize,
    pub deleting: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// Teardown tallies per resource type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResourceCounts {
    pub servers: ResourceTally,
    pub volumes: ResourceTally,
}

impl ResourceCounts {
    /// No resource has been discovered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.servers.total == 0 && self.volumes.total == 0
    }
}

/// Overall outcome of a run, derived from entity states only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunVerdict {
    Success,
    CompletedWithErrors,
    Provisioned,
    Incomplete,
}

impl RunVerdict {
    #[must_use]
    pub fn is_failure(self) -> bool {
        self == RunVerdict::CompletedWithErrors
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RunVerdict::Success => "SUCCESS",
            RunVerdict::CompletedWithErrors => "COMPLETED WITH ERRORS",
            RunVerdict::Provisioned => "PROVISIONED",
            RunVerdict::Incomplete => "INCOMPLETE",
        }
    }
}

impl fmt::Display for RunVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resources of one type, kept in discovery order
#[derive(Debug, Clone, Default)]
pub struct ResourceSet {
    entries: Vec<ResourceState>,
    index: HashMap<String, usize>,
}

impl ResourceSet {
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ResourceState> {
        self.index.get(id).map(|&idx| &self.entries[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceState> {
        self.entries.iter()
    }

    /// Add a resource unless its ID is already known
    fn insert(&mut self, resource: ResourceState) -> bool {
        if self.index.contains_key(resource.id()) {
            return false;
        }
        self.index
            .insert(resource.id().to_string(), self.entries.len());
        self.entries.push(resource);
        true
    }

    /// First resource, in discovery order, that the report names
    fn find_match_mut(&mut self, reported: &str) -> Option<&mut ResourceState> {
        self.entries.iter_mut().find(|r| r.matches(reported))
    }

    #[must_use]
    pub fn tally(&self) -> ResourceTally {
        let mut tally = ResourceTally {
            total: self.entries.len(),
            ..ResourceTally::default()
        };
        for resource in &self.entries {
            match resource.status() {
                ResourceStatus::Pending => tally.pending += 1,
                ResourceStatus::Deleting => tally.deleting += 1,
                ResourceStatus::Deleted => tally.deleted += 1,
                ResourceStatus::Failed => tally.failed += 1,
            }
        }
        tally
    }
}

/// Live state of one deployment run
#[derive(Debug)]
pub struct RunAggregate {
    /// VMs by name
    vms: BTreeMap<String, VmState>,
    /// Servers found during teardown
    servers: ResourceSet,
    /// Volumes found during teardown
    volumes: ResourceSet,
    /// Current run phase
    phase: Phase,
    /// State-change broadcast sender
    notifier: Option<broadcast::Sender<MonitorEvent>>,
}

impl RunAggregate {
    /// Track the given VMs, all starting where they were created
    pub fn new(vms: impl IntoIterator<Item = VmState>) -> Self {
        Self {
            vms: vms
                .into_iter()
                .map(|vm| (vm.name().to_string(), vm))
                .collect(),
            servers: ResourceSet::default(),
            volumes: ResourceSet::default(),
            phase: Phase::Idle,
            notifier: None,
        }
    }

    /// Track every VM the manifest plans
    #[must_use]
    pub fn from_manifest(manifest: &DeploymentManifest) -> Self {
        Self::new(manifest.planned_vms())
    }

    /// Publish state changes on `sender`
    #[must_use]
    pub fn with_notifier(mut self, sender: broadcast::Sender<MonitorEvent>) -> Self {
        self.notifier = Some(sender);
        self
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn vm(&self, name: &str) -> Option<&VmState> {
        self.vms.get(name)
    }

    /// VMs sorted by name
    pub fn vms(&self) -> impl Iterator<Item = &VmState> {
        self.vms.values()
    }

    #[must_use]
    pub fn vm_count(&self) -> usize {
        self.vms.len()
    }

    #[must_use]
    pub fn servers(&self) -> &ResourceSet {
        &self.servers
    }

    #[must_use]
    pub fn volumes(&self) -> &ResourceSet {
        &self.volumes
    }

    /// VM tally, computed from current state
    #[must_use]
    pub fn counts(&self) -> VmCounts {
        let mut counts = VmCounts {
            total: self.vms.len(),
            ..VmCounts::default()
        };
        for vm in self.vms.values() {
            match vm.status() {
                VmStatus::Pending => counts.pending += 1,
                VmStatus::Creating => counts.creating += 1,
                VmStatus::Provisioned => counts.provisioned += 1,
                VmStatus::Installing
                | VmStatus::Stage1
                | VmStatus::Rebooting
                | VmStatus::Stage2 => counts.installing += 1,
                VmStatus::Completed => counts.completed += 1,
                VmStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Teardown tallies, computed from current state
    #[must_use]
    pub fn resource_counts(&self) -> ResourceCounts {
        ResourceCounts {
            servers: self.servers.tally(),
            volumes: self.volumes.tally(),
        }
    }

    /// Overall outcome as of now
    ///
    /// Runs without VMs (teardown) are judged on their resources.
    #[must_use]
    pub fn verdict(&self) -> RunVerdict {
        let counts = self.counts();
        if counts.total == 0 {
            let resources = self.resource_counts();
            let total = resources.servers.total + resources.volumes.total;
            let deleted = resources.servers.deleted + resources.volumes.deleted;
            return if resources.servers.failed + resources.volumes.failed > 0 {
                RunVerdict::CompletedWithErrors
            } else if total > 0 && deleted == total {
                RunVerdict::Success
            } else {
                RunVerdict::Incomplete
            };
        }

        if counts.failed > 0 {
            RunVerdict::CompletedWithErrors
        } else if counts.completed == counts.total {
            RunVerdict::Success
        } else if counts.provisioned == counts.total {
            RunVerdict::Provisioned
        } else {
            RunVerdict::Incomplete
        }
    }

    /// Apply one event
    ///
    /// Unknown kinds are ignored; failures flagged as ignored change nothing.
    pub fn apply(&mut self, event: &DeployEvent) {
        let Some(kind) = event.known_kind() else {
            trace!(kind = %event.kind, "ignoring unrecognized event kind");
            return;
        };

        if kind.is_failure() && event.is_ignored_failure() {
            debug!(
                kind = %kind,
                entity = event.entity_name().unwrap_or("-"),
                "ignored failure, state unchanged"
            );
            return;
        }

        let at = event.monotonic_time;
        let host = event.host();

        match kind {
            EventKind::PlaybookStart => self.on_playbook_start(event),
            EventKind::VmCreating | EventKind::VmExists => {
                self.update_vm(event.payload.vm_name(), |vm| vm.mark_creating(at));
            }
            EventKind::VmProvisioned => {
                self.update_vm(event.payload.vm_name(), |vm| vm.mark_provisioned(at));
            }
            EventKind::VmActive => self.update_vm(host, |vm| vm.mark_provisioned(at)),
            EventKind::VmIp => self.on_vm_ip(event),
            EventKind::VmFailed => {
                let message = event.error_text().unwrap_or("VM creation failed");
                self.fail_vm(event.payload.vm_name(), message.to_string());
            }
            EventKind::InstallPreparing => self.update_vm(host, |vm| vm.mark_preparing(at)),
            EventKind::InstallStage1 => match host {
                Some(_) => self.update_vm(host, |vm| vm.enter_stage1(at)),
                None => self.sweep_from(&[VmStatus::Installing], |vm| vm.enter_stage1(at)),
            },
            EventKind::RebootStart => match host {
                Some(_) => self.update_vm(host, VmState::start_reboot),
                None => self.sweep_from(&[VmStatus::Stage1], VmState::start_reboot),
            },
            EventKind::RebootComplete => self.update_vm(host, VmState::finish_reboot),
            EventKind::InstallStage2 => match host {
                Some(_) => self.update_vm(host, |vm| vm.enter_stage2(at)),
                None => self.sweep_from(
                    &[VmStatus::Stage1, VmStatus::Rebooting, VmStatus::Installing],
                    |vm| vm.enter_stage2(at),
                ),
            },
            EventKind::InstallComplete => self.update_vm(host, |vm| vm.complete_install(at)),
            EventKind::InstallFailed => {
                let message = format!(
                    "Stage {}: {}",
                    event.payload.stage(),
                    event.error_text().unwrap_or("Install failed")
                );
                self.fail_vm(host, message);
            }
            EventKind::TaskStart => self.on_task_start(event),
            EventKind::TaskOk => {
                let label = event.payload.str("task").unwrap_or(&event.task).to_string();
                self.label_vm(host, &label);
            }
            EventKind::TaskFailed => {
                let task = if event.task.is_empty() {
                    event.payload.string("task")
                } else {
                    event.task.clone()
                };
                let message = format!("{task}: {}", event.error_text().unwrap_or("Task failed"));
                self.fail_vm(host, message);
            }
            EventKind::HostUnreachable => {
                let message = format!(
                    "Host unreachable: {}",
                    event.error_text().unwrap_or("SSH failed")
                );
                self.fail_vm(host, message);
            }
            EventKind::Retry => {
                let task = event.payload.str("task").unwrap_or(&event.task);
                let label = format!(
                    "Retrying: {task} ({} left)",
                    event.payload.count("retries_remaining")
                );
                self.label_vm(event.entity_name(), &label);
            }
            EventKind::Recap => {
                let recap = event.payload.recap();
                let phase = self.phase;
                self.update_vm(host, |vm| vm.apply_recap(&recap, phase, at));
            }
            EventKind::DiscoveryServers => self.on_discovery_servers(event),
            EventKind::DiscoveryVolumes => self.on_discovery_volumes(event),
            EventKind::ResourceDeleting => {
                self.update_resource(event, |res| res.mark_deleting(at));
            }
            EventKind::ResourceDeleted => {
                self.update_resource(event, |res| res.mark_deleted(at));
            }
            EventKind::ResourceFailed => {
                let error = event.error_text().unwrap_or_default().to_string();
                self.update_resource(event, |res| res.mark_failed(&error));
            }
            EventKind::PlaybookEnd
            | EventKind::PlayStart
            | EventKind::TaskSkipped
            | EventKind::InstallFeedback => {}
        }
    }

    // ------------------------------------------------------------------
    // Handlers
    // ------------------------------------------------------------------

    fn on_playbook_start(&mut self, event: &DeployEvent) {
        let playbook = event.payload.playbook().unwrap_or_default();
        let Some(phase) = Phase::from_playbook(playbook) else {
            debug!(playbook, "playbook does not announce a phase");
            return;
        };

        self.set_phase(phase);

        let at = event.monotonic_time;
        let swept = match phase {
            Phase::Provisioning => self.sweep(|vm| vm.begin_provisioning(at)),
            Phase::Installing => self.sweep(|vm| vm.begin_install(at)),
            Phase::Idle | Phase::Teardown => 0,
        };
        if swept > 0 {
            info!(phase = %phase, vms = swept, "phase sweep");
        }
    }

    fn on_vm_ip(&mut self, event: &DeployEvent) {
        let Some(ip) = event.payload.ip() else {
            return;
        };
        if let Some(vm) = event.entity_name().and_then(|name| self.vms.get_mut(name)) {
            vm.set_ip(ip);
            debug!(vm = %vm.name(), ip, "ip assigned");
        }
    }

    fn on_task_start(&mut self, event: &DeployEvent) {
        let name = event.payload.str("name").unwrap_or(&event.task);
        for vm in self.vms.values_mut() {
            if vm.status().is_active() {
                vm.set_task_label(name);
            }
        }
    }

    fn on_discovery_servers(&mut self, event: &DeployEvent) {
        let mut added = 0usize;
        for server in event.payload.discovered_servers() {
            if self
                .servers
                .insert(ResourceState::new(server.id, server.name, ResourceKind::Server))
            {
                added += 1;
            }
        }
        info!(added, total = self.servers.len(), "servers discovered");
    }

    fn on_discovery_volumes(&mut self, event: &DeployEvent) {
        let mut added = 0usize;
        for id in event.payload.discovered_volumes() {
            if self.servers.contains(&id) {
                debug!(id = %id, "volume id collides with a server, dropped");
                continue;
            }
            let name: String = id.chars().take(8).collect();
            if self
                .volumes
                .insert(ResourceState::new(id, name, ResourceKind::Volume))
            {
                added += 1;
            }
        }
        info!(added, total = self.volumes.len(), "volumes discovered");
    }

    // ------------------------------------------------------------------
    // Transition plumbing
    // ------------------------------------------------------------------

    fn set_phase(&mut self, phase: Phase) {
        let previous = std::mem::replace(&mut self.phase, phase);
        if previous == phase {
            return;
        }

        info!(from = %previous, to = %phase, "phase change");
        self.publish(MonitorEvent::PhaseChanged {
            from: previous.to_string(),
            to: phase.to_string(),
        });
    }

    /// Apply a transition to one named VM
    fn update_vm(&mut self, name: Option<&str>, transition: impl FnOnce(&mut VmState) -> VmChange) {
        let Some(name) = name else {
            return;
        };
        let Some(vm) = self.vms.get_mut(name) else {
            trace!(vm = name, "event for untracked vm");
            return;
        };
        if let Some(change) = transition(vm) {
            self.notify_vm(name, change);
        }
    }

    fn fail_vm(&mut self, name: Option<&str>, message: String) {
        let Some(name) = name else {
            return;
        };
        let Some(vm) = self.vms.get_mut(name) else {
            trace!(vm = name, "failure for untracked vm");
            return;
        };
        if let Some(change) = vm.fail(message) {
            warn!(vm = name, error = %vm.error_text(), "vm failed");
            self.notify_vm(name, change);
        }
    }

    fn label_vm(&mut self, name: Option<&str>, label: &str) {
        if let Some(vm) = name.and_then(|name| self.vms.get_mut(name)) {
            vm.set_task_label(label);
        }
    }

    /// Apply a transition to every VM; returns how many changed
    fn sweep(&mut self, mut transition: impl FnMut(&mut VmState) -> VmChange) -> usize {
        let changes: Vec<(String, StatusChange<VmStatus>)> = self
            .vms
            .values_mut()
            .filter_map(|vm| transition(vm).map(|change| (vm.name().to_string(), change)))
            .collect();

        for (name, change) in &changes {
            self.notify_vm(name, *change);
        }
        changes.len()
    }

    /// Sweep restricted to VMs currently in one of `from`
    fn sweep_from(
        &mut self,
        from: &[VmStatus],
        mut transition: impl FnMut(&mut VmState) -> VmChange,
    ) {
        let swept = self.sweep(|vm| {
            if from.contains(&vm.status()) {
                transition(vm)
            } else {
                None
            }
        });
        if swept > 0 {
            debug!(vms = swept, "install stage sweep");
        }
    }

    /// Resolve a teardown report to a resource and apply a transition
    fn update_resource(
        &mut self,
        event: &DeployEvent,
        transition: impl FnOnce(&mut ResourceState) -> ResourceChange,
    ) {
        let Some(reported) = event.payload.resource_name() else {
            return;
        };
        let kind = event.payload.resource_type().and_then(ResourceKind::from_tag);

        let target = match kind {
            Some(ResourceKind::Server) => self.servers.find_match_mut(reported),
            Some(ResourceKind::Volume) => self.volumes.find_match_mut(reported),
            None => self
                .servers
                .find_match_mut(reported)
                .or_else(|| self.volumes.find_match_mut(reported)),
        };
        let Some(resource) = target else {
            debug!(name = reported, "teardown report matches no tracked resource");
            return;
        };

        let id = resource.id().to_string();
        let resource_kind = resource.kind();
        if let Some(change) = transition(resource) {
            info!(
                id = %id,
                kind = %resource_kind,
                from = %change.from,
                to = %change.to,
                "resource state transition"
            );
            self.publish(MonitorEvent::ResourceStateChanged {
                id,
                resource_type: resource_kind.to_string(),
                from: change.from.to_string(),
                to: change.to.to_string(),
            });
        }
    }

    fn notify_vm(&self, name: &str, change: StatusChange<VmStatus>) {
        info!(
            vm = %name,
            from = %change.from,
            to = %change.to,
            "vm state transition"
        );
        self.publish(MonitorEvent::VmStateChanged {
            vm: name.to_string(),
            from: change.from.to_string(),
            to: change.to.to_string(),
        });
    }

    fn publish(&self, event: MonitorEvent) {
        if let Some(sender) = &self.notifier {
            // No subscribers is fine
            let _ = sender.send(event);
        }
    }
}
