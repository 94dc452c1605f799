//! State Publisher: emits a diff of what changed since the last
//! tick rather than a full snapshot, so a long-running restoration
//! doesn't drown its log in unchanged rows.

use bsr_core::{ActionStatus, GenPhase, Seconds, SwitchStatus};
use bsr_registry::DeviceRegistry;
use std::collections::HashMap;
use tracing::info;

/// One field that changed between two ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub device_name: String,
    pub field: &'static str,
    pub from: String,
    pub to: String,
}

/// Everything that changed during one tick, timestamped at the tick's
/// end time.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub time_s: f64,
    pub changes: Vec<Change>,
}

#[derive(Debug, Default)]
struct LastSeen {
    bus_status: HashMap<String, SwitchStatus>,
    branch_status: HashMap<String, SwitchStatus>,
    transformer_status: HashMap<String, SwitchStatus>,
    gen_phase: HashMap<String, GenPhase>,
}

/// Tracks the last-published value of every watched field so
/// [`StatePublisher::publish`] can emit only what moved.
#[derive(Debug, Default)]
pub struct StatePublisher {
    last: LastSeen,
}

impl StatePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&mut self, registry: &DeviceRegistry, now: Seconds) -> Snapshot {
        let mut snapshot = Snapshot {
            time_s: now.value(),
            changes: Vec::new(),
        };

        for bus in registry.buses.values() {
            diff_status(&mut snapshot, &mut self.last.bus_status, &bus.name, "status", bus.status);
        }
        for branch in registry.branches.values() {
            diff_status(
                &mut snapshot,
                &mut self.last.branch_status,
                &branch.name,
                "status",
                branch.status,
            );
        }
        for xfmr in registry.transformers.values() {
            diff_status(
                &mut snapshot,
                &mut self.last.transformer_status,
                &xfmr.name,
                "status",
                xfmr.status,
            );
        }
        for gen in registry.generators.values() {
            let prev = self.last.gen_phase.insert(gen.name.clone(), gen.phase);
            if prev != Some(gen.phase) {
                snapshot.changes.push(Change {
                    device_name: gen.name.clone(),
                    field: "phase",
                    from: prev.map(|p| p.to_string()).unwrap_or_else(|| "unknown".into()),
                    to: gen.phase.to_string(),
                });
            }
        }

        if !snapshot.changes.is_empty() {
            info!(time_s = snapshot.time_s, count = snapshot.changes.len(), "state changed");
        }
        snapshot
    }
}

fn diff_status(
    snapshot: &mut Snapshot,
    last: &mut HashMap<String, SwitchStatus>,
    name: &str,
    field: &'static str,
    current: SwitchStatus,
) {
    let prev = last.insert(name.to_string(), current);
    if prev != Some(current) {
        snapshot.changes.push(Change {
            device_name: name.to_string(),
            field,
            from: prev.map(status_label).unwrap_or("unknown").to_string(),
            to: status_label(current).to_string(),
        });
    }
}

fn status_label(status: SwitchStatus) -> &'static str {
    match status {
        SwitchStatus::Closed => "Closed",
        SwitchStatus::Tripped => "Tripped",
        SwitchStatus::Initialized => "Initialized",
    }
}

/// Action-status changes are published separately since they come from
/// the dispatcher's own bookkeeping, not the registry.
pub fn diff_action_status(
    snapshot: &mut Snapshot,
    seq: u64,
    name: &str,
    from: ActionStatus,
    to: ActionStatus,
) {
    if from != to {
        snapshot.changes.push(Change {
            device_name: format!("action#{seq} ({name})"),
            field: "action_status",
            from: from.to_string(),
            to: to.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bsr_core::Bus;

    #[test]
    fn first_publish_reports_every_initialized_device() {
        let mut reg = DeviceRegistry::new();
        reg.insert_bus(Bus::new(1, "Bus 1", 1));
        let mut publisher = StatePublisher::new();
        let snap = publisher.publish(&reg, Seconds::new(0.0));
        assert_eq!(snap.changes.len(), 1);
    }

    #[test]
    fn unchanged_state_produces_no_changes_on_second_publish() {
        let mut reg = DeviceRegistry::new();
        reg.insert_bus(Bus::new(1, "Bus 1", 1));
        let mut publisher = StatePublisher::new();
        publisher.publish(&reg, Seconds::new(0.0));
        let snap = publisher.publish(&reg, Seconds::new(1.0));
        assert!(snap.changes.is_empty());
    }

    #[test]
    fn bus_trip_is_reported_as_a_change() {
        let mut reg = DeviceRegistry::new();
        reg.insert_bus(Bus::new(1, "Bus 1", 1));
        let mut publisher = StatePublisher::new();
        publisher.publish(&reg, Seconds::new(0.0));
        reg.buses.get_mut(&bsr_core::BusId::new(1)).unwrap().trip(Seconds::new(1.0));
        let snap = publisher.publish(&reg, Seconds::new(1.0));
        assert_eq!(snap.changes.len(), 1);
        assert_eq!(snap.changes[0].to, "Tripped");
    }
}
