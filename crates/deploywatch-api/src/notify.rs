//! State-change notifications for presentation layers

use serde::{Deserialize, Serialize};

/// Published by the tracker whenever an entity or the run phase changes.
///
/// Subscribers receive these over a broadcast channel so they can redraw
/// without polling the aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    VmStateChanged {
        vm: String,
        from: String,
        to: String,
    },
    ResourceStateChanged {
        id: String,
        resource_type: String,
        from: String,
        to: String,
    },
    PhaseChanged {
        from: String,
        to: String,
    },
}

impl MonitorEvent {
    /// Name of the entity this notification concerns, if any
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        match self {
            MonitorEvent::VmStateChanged { vm, .. } => Some(vm),
            MonitorEvent::ResourceStateChanged { id, .. } => Some(id),
            MonitorEvent::PhaseChanged { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_with_type_tag() {
        let event = MonitorEvent::VmStateChanged {
            vm: "sup-a-0".to_string(),
            from: "creating".to_string(),
            to: "provisioned".to_string(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "vm_state_changed");
        assert_eq!(json["vm"], "sup-a-0");
        assert_eq!(event.subject(), Some("sup-a-0"));
    }
}
