//! Properties that hold for any event sequence

use proptest::prelude::*;

use deploywatch_api::DeployEvent;
use deploywatch_core::*;

const HOSTS: [&str; 3] = ["sup-a", "sup-b", "sup-c"];

/// One event from a small vocabulary, aimed at one of the hosts
fn event_strategy() -> impl Strategy<Value = DeployEvent> {
    let kinds = prop::sample::select(vec![
        "playbook_start:provision",
        "playbook_start:install",
        "vm_creating",
        "vm_provisioned",
        "vm_failed",
        "install_stage1",
        "install_stage1:sweep",
        "reboot_start",
        "reboot_complete",
        "install_stage2",
        "install_stage2:sweep",
        "install_complete",
        "install_failed",
        "task_failed",
        "host_unreachable",
        "task_start",
        "recap:clean",
        "recap:failed",
        "bogus_kind",
    ]);
    (kinds, 0..HOSTS.len(), any::<bool>()).prop_map(|(spec, host, ignored)| {
        let host = HOSTS[host];
        let (kind, variant) = spec.split_once(':').unwrap_or((spec, ""));
        let mut event = DeployEvent::new(kind);
        match (kind, variant) {
            ("playbook_start", "provision") => {
                event = event.with_data("playbook", "provision-vms.yaml");
            }
            ("playbook_start", _) => event = event.with_data("playbook", "install-sups.yaml"),
            (_, "sweep") | ("task_start", _) => {}
            ("vm_creating" | "vm_provisioned" | "vm_failed", _) => {
                event = event.with_data("vm_name", host);
            }
            ("recap", "failed") => event = event.with_host(host).with_data("failures", 1),
            ("recap", _) => event = event.with_host(host).with_data("ok", 3),
            _ => event = event.with_host(host),
        }
        if ignored {
            event = event.with_data("ignored", true);
        }
        event
    })
}

fn fleet() -> RunAggregate {
    RunAggregate::new(HOSTS.iter().map(|n| VmState::new(*n, "M1", "cpu")))
}

proptest! {
    #[test]
    fn counts_always_sum_to_total(events in prop::collection::vec(event_strategy(), 0..60)) {
        let mut agg = fleet();
        for event in &events {
            agg.apply(event);
            let counts = agg.counts();
            prop_assert_eq!(counts.bucket_sum(), counts.total);
            prop_assert_eq!(counts.total, HOSTS.len());
        }
    }

    #[test]
    fn terminal_states_absorb(events in prop::collection::vec(event_strategy(), 0..60)) {
        let mut agg = fleet();
        let mut terminal: Vec<Option<VmStatus>> = vec![None; HOSTS.len()];
        for event in &events {
            agg.apply(event);
            for (i, name) in HOSTS.iter().enumerate() {
                let status = agg.vm(name).unwrap().status();
                if let Some(fixed) = terminal[i] {
                    prop_assert_eq!(status, fixed);
                } else if status.is_terminal() {
                    terminal[i] = Some(status);
                }
            }
        }
    }

    #[test]
    fn ignored_failures_never_change_status(
        events in prop::collection::vec(event_strategy(), 0..40),
        host in 0..HOSTS.len(),
    ) {
        let mut agg = fleet();
        for event in &events {
            agg.apply(event);
        }
        let name = HOSTS[host];
        let before = agg.vm(name).unwrap().clone();

        for kind in ["task_failed", "host_unreachable", "install_failed"] {
            agg.apply(&DeployEvent::new(kind).with_host(name).with_data("ignored", true));
        }
        agg.apply(
            &DeployEvent::new("vm_failed")
                .with_data("vm_name", name)
                .with_data("ignored", true),
        );

        prop_assert_eq!(agg.vm(name).unwrap(), &before);
    }

    #[test]
    fn discovery_is_idempotent(ids in prop::collection::vec("[a-f0-9]{8}", 0..10), repeats in 1usize..4) {
        let mut agg = RunAggregate::new([]);
        let volumes: Vec<serde_json::Value> = ids.iter().map(|id| serde_json::json!(id)).collect();
        for _ in 0..repeats {
            agg.apply(&DeployEvent::new("discovery_volumes").with_data("volumes", volumes.clone()));
        }

        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        prop_assert_eq!(agg.volumes().len(), unique.len());
    }
}
