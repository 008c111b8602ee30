//! deploywatch-core: Deployment state tracking
//!
//! Folds the provisioning event stream into per-VM and per-resource state
//! machines, writes the Markdown audit log, and tails the event file. The
//! `TrackerActor` owns a run's state; the tailer feeds it in file order.

pub mod actor;
pub mod aggregate;
pub mod audit;
pub mod config;
pub mod error;
pub mod message;
pub mod state;
pub mod tail;
pub mod text;
pub mod tracker;

pub use actor::{TrackerActor, TrackerActorArgs};
pub use aggregate::{
    ResourceCounts, ResourceSet, ResourceTally, RunAggregate, RunVerdict, VmCounts,
};
pub use audit::{create_log_path, AuditLog, ErrorRecord, FailureKind, Marker, TimelineEntry};
pub use config::{DeploymentManifest, VmGroup, WatchConfig, EVENT_FILE_ENV};
pub use error::CoreError;
pub use message::{Finish, GetCounts, GetSnapshot, Ingest, RunOutcome, RunSnapshot, StatusCounts};
pub use state::{
    Phase, ResourceKind, ResourceState, ResourceStatus, StatusChange, VmState, VmStatus,
};
pub use tail::{EventSink, EventTailer, StopReason, TailMode, TailStats};
pub use tracker::Tracker;
