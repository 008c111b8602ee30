//! deploywatch-api: Shared wire types
//!
//! Contains the deployment event schema written by the provisioning callback,
//! the line decoder, and the state-change notifications published to
//! presentation layers.

pub mod events;
pub mod notify;
pub mod payload;

pub use events::{decode, try_decode, DecodeError, DeployEvent, EventKind, UNKNOWN_KIND};
pub use notify::MonitorEvent;
pub use payload::{DiscoveredServer, Payload, RecapCounts};
