//! Actor implementations

pub mod tracker;

pub use tracker::{TrackerActor, TrackerActorArgs};
