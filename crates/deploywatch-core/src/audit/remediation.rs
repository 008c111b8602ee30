//! Suggested fixes for recorded failures
//!
//! Rules are checked in table order and the first match wins. Text matching
//! is case-insensitive.

use super::record::{ErrorRecord, FailureKind};

/// A canned suggestion and the rule that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Remediation {
    /// Stable rule name
    pub rule: &'static str,
    /// Suggestion shown in the report
    pub text: &'static str,
}

/// Lower-cased view of a record, built once per lookup
struct Facts<'a> {
    kind: &'a FailureKind,
    error: String,
    task: String,
}

impl Facts<'_> {
    fn error_mentions(&self, needles: &[&str]) -> bool {
        needles.iter().any(|n| self.error.contains(n))
    }

    fn in_stage(&self, stage: &str) -> bool {
        self.task.contains(&format!("stage {stage}")) || self.kind.install_stage() == Some(stage)
    }
}

struct Rule {
    remediation: Remediation,
    applies: fn(&Facts<'_>) -> bool,
}

const RULES: &[Rule] = &[
    Rule {
        remediation: Remediation {
            rule: "unreachable",
            text: "Check if the VM is running and SSH is accessible. Verify security groups allow SSH (port 22).",
        },
        applies: is_unreachable,
    },
    Rule {
        remediation: Remediation {
            rule: "timeout",
            text: "Increase the timeout value or check for resource constraints on the cloud.",
        },
        applies: mentions_timeout,
    },
    Rule {
        remediation: Remediation {
            rule: "quota",
            text: "Check project quota limits. Reduce the deployment size or request a quota increase.",
        },
        applies: mentions_quota,
    },
    Rule {
        remediation: Remediation {
            rule: "scheduling",
            text: "The cloud cannot schedule the VM. Check compute node capacity and flavor availability.",
        },
        applies: mentions_scheduling,
    },
    Rule {
        remediation: Remediation {
            rule: "stage1",
            text: "Stage 1 (system deps/drivers) failed. Check cloud-init logs on the VM: /var/log/cloud-init-output.log",
        },
        applies: in_stage1,
    },
    Rule {
        remediation: Remediation {
            rule: "stage2",
            text: "Stage 2 (SUP installation) failed. Check the install script logs on the VM and the model server availability.",
        },
        applies: in_stage2,
    },
    Rule {
        remediation: Remediation {
            rule: "gpu-driver",
            text: "GPU driver installation failed. Verify the flavor has a GPU attached and check driver compatibility.",
        },
        applies: mentions_gpu,
    },
    Rule {
        remediation: Remediation {
            rule: "packages",
            text: "Package installation failed. Check network connectivity and the apt cache: apt update",
        },
        applies: mentions_packages,
    },
    Rule {
        remediation: Remediation {
            rule: "git",
            text: "Git clone failed. Check network access to the repository host and that the repository exists.",
        },
        applies: mentions_git,
    },
];

fn is_unreachable(facts: &Facts<'_>) -> bool {
    *facts.kind == FailureKind::Unreachable
}

fn mentions_timeout(facts: &Facts<'_>) -> bool {
    facts.error_mentions(&["timeout"])
}

fn mentions_quota(facts: &Facts<'_>) -> bool {
    facts.error_mentions(&["quota", "exceeded"])
}

fn mentions_scheduling(facts: &Facts<'_>) -> bool {
    facts.error_mentions(&["no valid host"])
}

fn in_stage1(facts: &Facts<'_>) -> bool {
    facts.in_stage("1")
}

fn in_stage2(facts: &Facts<'_>) -> bool {
    facts.in_stage("2")
}

fn mentions_gpu(facts: &Facts<'_>) -> bool {
    facts.error_mentions(&["nvidia", "cuda"])
}

fn mentions_packages(facts: &Facts<'_>) -> bool {
    facts.error_mentions(&["apt", "package"])
}

fn mentions_git(facts: &Facts<'_>) -> bool {
    facts.error_mentions(&["git", "clone"])
}

/// First rule matching the record
#[must_use]
pub fn suggest(record: &ErrorRecord) -> Option<&'static Remediation> {
    let facts = Facts {
        kind: &record.kind,
        error: record.error.to_lowercase(),
        task: record.task.to_lowercase(),
    };
    RULES
        .iter()
        .find(|rule| (rule.applies)(&facts))
        .map(|rule| &rule.remediation)
}

/// Suggestion text, empty when no rule matches
#[must_use]
pub fn suggest_fix(record: &ErrorRecord) -> &'static str {
    suggest(record).map_or("", |r| r.text)
}

/// Rule names in evaluation order
pub fn rule_names() -> impl Iterator<Item = &'static str> {
    RULES.iter().map(|rule| rule.remediation.rule)
}
