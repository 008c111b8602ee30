//! Message types for actor communication
//!
//! Message handlers are implemented in the actor module.

use std::path::PathBuf;

use deploywatch_api::DeployEvent;
use kameo_macros::Reply;
use serde::Serialize;

use crate::aggregate::{ResourceCounts, RunVerdict, VmCounts};
use crate::state::{Phase, ResourceState, VmState};

// ============================================================================
// TrackerActor Messages
// ============================================================================

/// Apply one decoded event
#[derive(Debug)]
pub struct Ingest {
    pub event: DeployEvent,
}

/// Get current counts
#[derive(Debug)]
pub struct GetCounts;

/// Get a copy of every entity
#[derive(Debug)]
pub struct GetSnapshot;

/// Close the audit log and compute the verdict
#[derive(Debug)]
pub struct Finish;

// ============================================================================
// Replies
// ============================================================================

/// Counts at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Reply)]
pub struct StatusCounts {
    pub phase: Phase,
    pub vms: VmCounts,
    pub resources: ResourceCounts,
}

/// Copy of the run state for presentation
#[derive(Debug, Clone, Reply)]
pub struct RunSnapshot {
    /// Current phase
    pub phase: Phase,
    /// VMs sorted by name
    pub vms: Vec<VmState>,
    /// Servers in discovery order
    pub servers: Vec<ResourceState>,
    /// Volumes in discovery order
    pub volumes: Vec<ResourceState>,
    pub counts: VmCounts,
    pub resource_counts: ResourceCounts,
    /// Verdict if the run ended now
    pub verdict: RunVerdict,
}

/// Result of a finished run
#[derive(Debug, Clone, Serialize, Reply)]
pub struct RunOutcome {
    pub verdict: RunVerdict,
    pub counts: VmCounts,
    pub resources: ResourceCounts,
    /// Events applied
    pub events: u64,
    /// Where the report was written, if anywhere
    pub audit_path: Option<PathBuf>,
}
