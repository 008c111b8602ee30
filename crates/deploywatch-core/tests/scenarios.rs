//! End-to-end runs through the tracker and the replay tailer

use std::path::Path;

use serde_json::json;
use tokio::sync::watch;

use deploywatch_api::DeployEvent;
use deploywatch_core::*;

fn fleet(names: &[&str]) -> Tracker {
    Tracker::new(RunAggregate::new(
        names.iter().map(|n| VmState::new(*n, "M1", "v1.14vcpu.28g")),
    ))
}

fn feed(tracker: &mut Tracker, events: impl IntoIterator<Item = DeployEvent>) {
    for event in events {
        tracker.process(&event).unwrap();
    }
}

fn step(kind: &str, at: f64) -> DeployEvent {
    let ts = chrono::DateTime::from_timestamp(1_700_000_000 + at as i64, 0)
        .unwrap()
        .naive_utc();
    DeployEvent::new(kind).at(ts, at)
}

#[test]
fn scenario_full_install_completes() {
    let mut tracker = fleet(&["sup-a"]);
    feed(
        &mut tracker,
        [
            step("vm_creating", 1.0).with_data("vm_name", "sup-a"),
            step("vm_provisioned", 60.0).with_data("vm_name", "sup-a"),
            step("playbook_start", 70.0).with_data("playbook", "install-sups.yaml"),
            step("install_stage1", 80.0).with_host("sup-a"),
            step("reboot_start", 200.0).with_host("sup-a"),
            step("reboot_complete", 260.0).with_host("sup-a"),
            step("install_stage2", 270.0).with_host("sup-a"),
            step("recap", 900.0).with_host("sup-a").with_data("ok", 40),
        ],
    );

    let vm = tracker.aggregate().vm("sup-a").unwrap();
    assert_eq!(vm.status(), VmStatus::Completed);
    assert_eq!(vm.provision_ended_at(), Some(60.0));
    assert_eq!(vm.install_ended_at(), Some(900.0));
    assert_eq!(vm.install_duration(), Some(830.0));
}

#[test]
fn scenario_quota_failure_gets_quota_fix() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.md");
    let mut tracker = fleet(&["sup-b"]).with_audit(AuditLog::open(&path, "quota").unwrap());

    feed(
        &mut tracker,
        [step("vm_failed", 5.0)
            .with_data("vm_name", "sup-b")
            .with_data("error", "quota exceeded")],
    );

    let vm = tracker.aggregate().vm("sup-b").unwrap();
    assert_eq!(vm.status(), VmStatus::Failed);
    assert!(vm.error_text().contains("quota exceeded"));

    let outcome = tracker.finish().unwrap();
    assert_eq!(outcome.verdict, RunVerdict::CompletedWithErrors);

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("**Type**: vm_failed"));
    assert!(text.contains("Check project quota limits"));
}

#[test]
fn scenario_ignored_task_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.md");
    let mut tracker = fleet(&["sup-a"]).with_audit(AuditLog::open(&path, "ignored").unwrap());

    feed(
        &mut tracker,
        [
            step("playbook_start", 1.0).with_data("playbook", "install-sups.yaml"),
            step("task_failed", 2.0)
                .with_task("Probe GPU")
                .with_host("sup-a")
                .with_data("error", "nvidia-smi: not found")
                .with_data("ignored", true),
        ],
    );

    assert_eq!(
        tracker.aggregate().vm("sup-a").unwrap().status(),
        VmStatus::Installing
    );
    tracker.finish().unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("[WARN] **sup-a**: nvidia-smi: not found (ignored)"));
    assert!(!text.contains("## Errors"));
}

#[test]
fn scenario_overlapping_volume_discovery() {
    let mut tracker = fleet(&[]);
    feed(
        &mut tracker,
        [
            step("discovery_volumes", 1.0).with_data("volumes", json!(["vol-1", "vol-2"])),
            step("discovery_volumes", 2.0)
                .with_data("volumes", json!(["vol-2", {"id": "vol-3"}])),
        ],
    );

    let ids: Vec<&str> = tracker
        .aggregate()
        .volumes()
        .iter()
        .map(ResourceState::id)
        .collect();
    assert_eq!(ids, vec!["vol-1", "vol-2", "vol-3"]);
}

#[test]
fn scenario_clean_recap_while_provisioning() {
    let mut tracker = fleet(&["sup-a", "sup-b"]);
    feed(
        &mut tracker,
        [
            step("playbook_start", 1.0).with_data("playbook", "provision-vms.yaml"),
            step("recap", 120.0).with_host("sup-a").with_data("ok", 7),
        ],
    );

    let vm = tracker.aggregate().vm("sup-a").unwrap();
    assert_eq!(vm.status(), VmStatus::Provisioned);
    assert_eq!(vm.provision_ended_at(), Some(120.0));
    assert_eq!(
        tracker.aggregate().vm("sup-b").unwrap().status(),
        VmStatus::Creating
    );
}

#[test]
fn scenario_malformed_lines_leave_state_alone() {
    let mut tracker = fleet(&["sup-a"]);
    let before = tracker.snapshot();

    for line in ["", "   ", "{\"type\": \"vm_fai", "[1, 2]", "plain text"] {
        if let Some(event) = deploywatch_api::decode(line) {
            tracker.process(&event).unwrap();
        }
    }

    assert_eq!(tracker.snapshot().vms, before.vms);
    assert_eq!(tracker.events(), 0);
}

#[test]
fn scenario_lines_without_unix_ts_leave_times_unknown() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("untimed.md");
    let mut tracker = fleet(&["sup-a"]).with_audit(AuditLog::open(&path, "untimed").unwrap());

    for line in [
        r#"{"type": "vm_creating", "data": {"vm_name": "sup-a"}}"#,
        r#"{"type": "vm_provisioned", "data": {"vm_name": "sup-a"}}"#,
    ] {
        tracker.process(&deploywatch_api::decode(line).unwrap()).unwrap();
    }

    let vm = tracker.aggregate().vm("sup-a").unwrap();
    assert_eq!(vm.status(), VmStatus::Provisioned);
    assert_eq!(vm.provision_started_at(), None);
    assert_eq!(vm.provision_duration(), None);
    assert_eq!(vm.provision_time(), None);

    tracker.finish().unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("| sup-a | M1 | [PROVISIONED] | - | - |"));
}

async fn replay(path: &Path, tracker: &mut Tracker) -> TailStats {
    let (_tx, rx) = watch::channel(false);
    EventTailer::new(path)
        .with_mode(TailMode::Replay)
        .run(tracker, rx)
        .await
        .unwrap()
}

#[tokio::test]
async fn scenario_teardown_replay() {
    let dir = tempfile::tempdir().unwrap();
    let events = dir.path().join("events.jsonl");
    let lines = [
        json!({"type": "playbook_start", "data": {"playbook": "teardown.yaml"}}),
        json!({"type": "discovery_servers", "data": {"servers": [
            {"id": "4b1c9e2a-0000-0000-0000-000000000001", "name": "sup-M1-0"}
        ]}}),
        json!({"type": "discovery_volumes", "data": {"volumes": [
            "9f3e1d7c-0000-0000-0000-000000000001"
        ]}}),
        json!({"type": "resource_deleting", "data": {"name": "sup-M1-0", "type": "server"}}),
        json!({"type": "resource_deleted", "data": {"name": "sup-M1-0", "type": "server"}}),
        json!({"type": "resource_deleted", "data": {"name": "9f3e1d7c", "type": "volume"}}),
        json!({"type": "playbook_end", "data": {"playbook": "teardown.yaml", "elapsed": 12.5}}),
    ];
    let body: String = lines.iter().map(|l| format!("{l}\n")).collect();
    std::fs::write(&events, body).unwrap();

    let report = dir.path().join("logs/teardown.md");
    let mut tracker = fleet(&[]).with_audit(AuditLog::open(&report, "teardown").unwrap());

    let stats = replay(&events, &mut tracker).await;
    assert_eq!(stats.events, 7);
    assert_eq!(stats.stopped_by, StopReason::EndOfFile);
    assert_eq!(tracker.aggregate().phase(), Phase::Teardown);

    let outcome = tracker.finish().unwrap();
    assert_eq!(outcome.verdict, RunVerdict::Success);
    assert_eq!(outcome.resources.servers.deleted, 1);
    assert_eq!(outcome.resources.volumes.deleted, 1);

    let text = std::fs::read_to_string(&report).unwrap();
    assert!(text.contains("Completed: teardown.yaml (12.5s)"));
    assert!(text.contains("- **Servers**: 1/1 deleted"));
}
