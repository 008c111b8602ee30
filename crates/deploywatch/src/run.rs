//! Driving one run: tracker actor, tailer, interrupt handling and output

use std::path::PathBuf;

use eyre::{eyre, WrapErr};
use kameo::actor::Spawn;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use deploywatch_api::MonitorEvent;
use deploywatch_core::{
    create_log_path, AuditLog, DeploymentManifest, EventTailer, Finish, RunAggregate, RunOutcome,
    TailMode, TailStats, TrackerActor, TrackerActorArgs, WatchConfig,
};

/// Everything needed to track one run
#[derive(Debug)]
pub struct RunPlan {
    pub manifest: DeploymentManifest,
    pub run_name: String,
    pub events: PathBuf,
    pub mode: TailMode,
}

/// Track a run to completion and close its report
///
/// The report is closed even when the event stream fails, so a partial run
/// still leaves a complete audit log behind.
///
/// # Errors
/// Returns error if the audit log cannot be opened, the event stream fails,
/// or the tracker stops responding
pub async fn track(plan: RunPlan, config: &WatchConfig) -> eyre::Result<(RunOutcome, TailStats)> {
    let log_path = create_log_path(&config.logs_dir, &plan.run_name);
    let audit = AuditLog::open(&log_path, &plan.run_name).wrap_err("failed to open audit log")?;

    let (event_tx, event_rx) = broadcast::channel(config.notification_capacity.max(1));
    let printer = spawn_printer(event_rx);

    let mut tracker = TrackerActor::spawn(TrackerActorArgs {
        run_name: plan.run_name.clone(),
        aggregate: RunAggregate::from_manifest(&plan.manifest),
        audit: Some(audit),
        event_tx,
    });

    let (stop_tx, stop_rx) = watch::channel(false);
    let interrupt = spawn_interrupt(stop_tx);

    info!(
        run = %plan.run_name,
        events = %plan.events.display(),
        log = %log_path.display(),
        "tracking run"
    );

    let tailed = EventTailer::from_config(&plan.events, config)
        .with_mode(plan.mode)
        .run(&mut tracker, stop_rx)
        .await;
    interrupt.abort();

    let outcome = tracker
        .ask(Finish)
        .await
        .map_err(|e| eyre!("failed to finish run: {e}"))?;

    if let Err(e) = tracker.stop_gracefully().await {
        warn!(error = %e, "tracker did not stop cleanly");
    }
    tracker.wait_for_shutdown().await;
    // the printer drains what is buffered, then sees the channel close
    if let Err(e) = printer.await {
        warn!(error = %e, "state change printer failed");
    }

    let stats = tailed.wrap_err("event stream aborted")?;
    Ok((outcome, stats))
}

/// Set the stop flag on Ctrl-C
fn spawn_interrupt(stop_tx: watch::Sender<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, finishing run");
                let _ = stop_tx.send(true);
            }
            Err(e) => warn!(error = %e, "cannot listen for Ctrl-C"),
        }
    })
}

/// Print state changes as they happen
fn spawn_printer(mut rx: broadcast::Receiver<MonitorEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => println!("{}", describe(&event)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "state change output fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn describe(event: &MonitorEvent) -> String {
    match event {
        MonitorEvent::VmStateChanged { vm, from, to } => format!("{vm:<28} {from} -> {to}"),
        MonitorEvent::ResourceStateChanged {
            id,
            resource_type,
            from,
            to,
        } => format!("{resource_type} {id:<21} {from} -> {to}"),
        MonitorEvent::PhaseChanged { from, to } => format!("== phase {from} -> {to} =="),
    }
}

/// Final summary on stdout
pub fn print_outcome(run_name: &str, outcome: &RunOutcome, stats: &TailStats) {
    let counts = &outcome.counts;
    println!();
    println!("Run:      {run_name}");
    println!("Verdict:  {}", outcome.verdict);
    if counts.total > 0 {
        println!(
            "VMs:      {}/{} completed, {} failed, {} provisioned, {} in progress",
            counts.completed,
            counts.total,
            counts.failed,
            counts.provisioned,
            counts.pending + counts.creating + counts.installing
        );
    }
    let resources = &outcome.resources;
    if !resources.is_empty() {
        println!(
            "Teardown: {}/{} servers, {}/{} volumes deleted, {} failed",
            resources.servers.deleted,
            resources.servers.total,
            resources.volumes.deleted,
            resources.volumes.total,
            resources.servers.failed + resources.volumes.failed
        );
    }
    println!(
        "Events:   {} applied, {} malformed lines skipped",
        outcome.events, stats.skipped
    );
    if let Some(path) = &outcome.audit_path {
        println!("Log:      {}", path.display());
    }
}

/// Planned VMs as a table
pub fn print_plan(manifest: &DeploymentManifest, run_name: &str) {
    let vms = manifest.planned_vms();
    println!("Run: {run_name} ({} VMs)", vms.len());
    if vms.is_empty() {
        return;
    }

    println!();
    println!("{:<28} {:<20} FLAVOR", "NAME", "BEHAVIOR");
    for vm in &vms {
        println!("{:<28} {:<20} {}", vm.name(), vm.behavior(), vm.flavor());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        let line = describe(&MonitorEvent::PhaseChanged {
            from: "idle".to_string(),
            to: "provisioning".to_string(),
        });
        assert_eq!(line, "== phase idle -> provisioning ==");

        let line = describe(&MonitorEvent::VmStateChanged {
            vm: "sup-a".to_string(),
            from: "pending".to_string(),
            to: "creating".to_string(),
        });
        assert!(line.starts_with("sup-a "));
        assert!(line.ends_with("pending -> creating"));
    }
}
