//! `TrackerActor`: owns the run state
//!
//! All mutation goes through this actor's mailbox, so events are applied in
//! the order the tailer delivers them. Readers get copies.

use async_trait::async_trait;
use deploywatch_api::{DeployEvent, MonitorEvent};
use kameo::actor::{ActorRef, WeakActorRef};
use kameo::error::{ActorStopReason, SendError};
use kameo::message::{Context, Message};
use kameo::prelude::*;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::aggregate::RunAggregate;
use crate::audit::AuditLog;
use crate::error::CoreError;
use crate::message::{Finish, GetCounts, GetSnapshot, Ingest, RunOutcome, RunSnapshot, StatusCounts};
use crate::tail::EventSink;
use crate::tracker::Tracker;

/// Arguments for spawning a `TrackerActor`
pub struct TrackerActorArgs {
    /// Run name, for logging
    pub run_name: String,
    /// Initial state (planned VMs)
    pub aggregate: RunAggregate,
    /// Report destination, if any
    pub audit: Option<AuditLog>,
    /// State-change broadcast sender
    pub event_tx: broadcast::Sender<MonitorEvent>,
}

/// Actor owning the aggregate and audit log of one run
pub struct TrackerActor {
    /// Run name
    run_name: String,
    /// Run state and report
    tracker: Tracker,
}

impl Actor for TrackerActor {
    type Args = TrackerActorArgs;
    type Error = CoreError;

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        info!(
            run = %args.run_name,
            id = %actor_ref.id(),
            vms = args.aggregate.vm_count(),
            "TrackerActor starting"
        );

        let aggregate = args.aggregate.with_notifier(args.event_tx);
        let mut tracker = Tracker::new(aggregate);
        if let Some(audit) = args.audit {
            tracker = tracker.with_audit(audit);
        }

        Ok(Self {
            run_name: args.run_name,
            tracker,
        })
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        info!(run = %self.run_name, reason = ?reason, "TrackerActor stopping");

        if !self.tracker.is_finished() {
            // close the report even if nobody asked for the verdict
            match self.tracker.finish() {
                Ok(outcome) => info!(verdict = %outcome.verdict, "report closed on stop"),
                Err(e) => warn!(error = %e, "failed to close report on stop"),
            }
        }
        Ok(())
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<Ingest> for TrackerActor {
    type Reply = Result<(), CoreError>;

    async fn handle(&mut self, msg: Ingest, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        self.tracker.process(&msg.event)
    }
}

impl Message<GetCounts> for TrackerActor {
    type Reply = StatusCounts;

    async fn handle(
        &mut self,
        _msg: GetCounts,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.tracker.counts()
    }
}

impl Message<GetSnapshot> for TrackerActor {
    type Reply = RunSnapshot;

    async fn handle(
        &mut self,
        _msg: GetSnapshot,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.tracker.snapshot()
    }
}

impl Message<Finish> for TrackerActor {
    type Reply = Result<RunOutcome, CoreError>;

    async fn handle(&mut self, _msg: Finish, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        self.tracker.finish()
    }
}

// ============================================================================
// Tailer seam
// ============================================================================

#[async_trait]
impl EventSink for ActorRef<TrackerActor> {
    async fn ingest(&mut self, event: DeployEvent) -> Result<(), CoreError> {
        match self.ask(Ingest { event }).await {
            Ok(()) => Ok(()),
            Err(SendError::HandlerError(e)) => Err(e),
            Err(e) => Err(CoreError::ActorError(e.to_string())),
        }
    }
}
