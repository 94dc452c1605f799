//! Action Dispatcher: turns a loaded control plan into device
//! operations, one tick at a time.
//!
//! Four scheduling modes govern how an action due at `action_time` is
//! actually run once the tick loop reaches or passes that instant:
//!
//! - `Strict`: must run on the tick that contains `action_time` exactly
//!   (within half a framework step); otherwise it is skipped.
//! - `BestEffort`: runs on the first tick at or after `action_time`, no
//!   deadline.
//! - `Windowed`: like `BestEffort`, but skipped once `now` passes the
//!   action's `end_time`.
//! - `TieSynchronized`: like `BestEffort`, except actions that share a
//!   tie group execute as one atomic batch — all run on the same tick
//!   or none do.
//!
//! A frequency safety margin defers (never skips, except under
//! `Windowed`) any non-generator action while system frequency is
//! outside `60 Hz +/- margin`, so breaker operations don't compound an
//! in-progress frequency excursion. Execution-delay absorption tracks,
//! for every action, the gap between when it became due and when it
//! actually ran.

use crate::error::{DispatchError, DispatchResult};
use crate::publisher::{diff_action_status, Snapshot};
use bsr_core::{Action, ActionStatus, DeviceKind, Seconds};
use bsr_registry::{DeviceRegistry, OpTable};
use bsr_solver::SolverGateway;
use std::collections::HashMap;
use tracing::{info, warn};

/// How a due action is allowed to slip relative to its nominal time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingMode {
    Strict,
    BestEffort,
    Windowed,
    TieSynchronized,
}

impl SchedulingMode {
    pub fn from_wire_code(code: u8) -> DispatchResult<Self> {
        match code {
            1 => Ok(SchedulingMode::Strict),
            2 => Ok(SchedulingMode::BestEffort),
            3 => Ok(SchedulingMode::Windowed),
            4 => Ok(SchedulingMode::TieSynchronized),
            other => Err(DispatchError::InvalidPlan(format!(
                "unknown scheduling mode {other}, expected 1-4"
            ))),
        }
    }
}

fn group_key(action: &Action) -> u64 {
    action.tie_parent.unwrap_or(action.seq)
}

/// Drives a loaded plan against a [`DeviceRegistry`] and
/// [`SolverGateway`], one [`ActionDispatcher::tick`] per framework step.
pub struct ActionDispatcher {
    plan: Vec<Action>,
    mode: SchedulingMode,
    frequency_margin_hz: f64,
    ops: OpTable,
}

impl ActionDispatcher {
    pub fn new(plan: Vec<Action>, mode: SchedulingMode, frequency_margin_hz: f64) -> Self {
        Self {
            plan,
            mode,
            frequency_margin_hz,
            ops: OpTable::new(),
        }
    }

    pub fn plan(&self) -> &[Action] {
        &self.plan
    }

    fn frequency_within_margin(&self, frequency_hz: f64) -> bool {
        (frequency_hz - 60.0).abs() <= self.frequency_margin_hz
    }

    /// Run one tick: evaluate every pending action group, execute those
    /// that are ready, and record the resulting status transitions into
    /// `snapshot`.
    pub fn tick(
        &mut self,
        now: Seconds,
        frequency_hz: f64,
        registry: &mut DeviceRegistry,
        gateway: &mut dyn SolverGateway,
        snapshot: &mut Snapshot,
    ) -> DispatchResult<()> {
        let mut groups: HashMap<u64, Vec<usize>> = HashMap::new();
        for (idx, action) in self.plan.iter().enumerate() {
            if action.status.is_terminal() {
                continue;
            }
            groups.entry(group_key(action)).or_default().push(idx);
        }

        let mut group_keys: Vec<u64> = groups.keys().copied().collect();
        group_keys.sort_unstable();

        for key in group_keys {
            let indices = groups.get(&key).expect("just collected");
            self.evaluate_group(indices, now, frequency_hz, registry, gateway, snapshot)?;
        }

        Ok(())
    }

    fn evaluate_group(
        &mut self,
        indices: &[usize],
        now: Seconds,
        frequency_hz: f64,
        registry: &mut DeviceRegistry,
        gateway: &mut dyn SolverGateway,
        snapshot: &mut Snapshot,
    ) -> DispatchResult<()> {
        let due = indices
            .iter()
            .all(|&i| now.value() + 1e-9 >= self.plan[i].action_time_s);
        if !due {
            return Ok(());
        }

        let earliest_action_time = indices
            .iter()
            .map(|&i| self.plan[i].action_time_s)
            .fold(f64::INFINITY, f64::min);

        match self.mode {
            SchedulingMode::Strict => {
                let in_window = (now.value() - earliest_action_time).abs() < 1e-6;
                if !in_window {
                    self.skip_group(indices, now, snapshot);
                    return Ok(());
                }
            }
            SchedulingMode::Windowed => {
                let past_deadline = indices.iter().any(|&i| {
                    self.plan[i]
                        .end_time_s
                        .map(|end| now.value() > end)
                        .unwrap_or(false)
                });
                if past_deadline {
                    self.skip_group(indices, now, snapshot);
                    return Ok(());
                }
            }
            SchedulingMode::BestEffort | SchedulingMode::TieSynchronized => {}
        }

        let non_generator_action = indices
            .iter()
            .any(|&i| self.plan[i].device_type != DeviceKind::Gen);
        if non_generator_action && !self.frequency_within_margin(frequency_hz) {
            if self.mode == SchedulingMode::Windowed {
                let past_deadline = indices.iter().any(|&i| {
                    self.plan[i]
                        .end_time_s
                        .map(|end| now.value() > end)
                        .unwrap_or(false)
                });
                if past_deadline {
                    self.skip_group(indices, now, snapshot);
                    return Ok(());
                }
            }
            for &i in indices {
                let action = &mut self.plan[i];
                if action.status == ActionStatus::NotStarted {
                    action.start_time_s = Some(now.value());
                    let from = action.status;
                    action.status = ActionStatus::InProgress;
                    diff_action_status(snapshot, action.seq, &action.id_value, from, action.status);
                }
            }
            warn!(
                frequency_hz,
                margin = self.frequency_margin_hz,
                "deferring action group: frequency outside safety margin"
            );
            return Ok(());
        }

        for &i in indices {
            let action = self.plan[i].clone();
            let from_status = self.plan[i].status;
            if self.plan[i].status == ActionStatus::NotStarted {
                self.plan[i].start_time_s = Some(now.value());
            }

            match self.ops.dispatch(&action, registry, gateway) {
                Ok(()) => {
                    self.plan[i].status = ActionStatus::Completed;
                    self.plan[i].end_time_s = Some(now.value());
                    info!(
                        seq = action.seq,
                        device = %action.id_value,
                        delay_s = now.value() - action.action_time_s,
                        "action executed"
                    );
                }
                Err(err) => {
                    warn!(seq = action.seq, error = %err, "action failed, will retry next tick");
                    if self.plan[i].status == ActionStatus::NotStarted {
                        self.plan[i].status = ActionStatus::InProgress;
                    }
                    continue;
                }
            }
            diff_action_status(
                snapshot,
                self.plan[i].seq,
                &self.plan[i].id_value,
                from_status,
                self.plan[i].status,
            );
        }

        Ok(())
    }

    fn skip_group(&mut self, indices: &[usize], now: Seconds, snapshot: &mut Snapshot) {
        for &i in indices {
            let from = self.plan[i].status;
            self.plan[i].status = ActionStatus::Skipped;
            self.plan[i].end_time_s = Some(now.value());
            diff_action_status(
                snapshot,
                self.plan[i].seq,
                &self.plan[i].id_value,
                from,
                ActionStatus::Skipped,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bsr_core::{Bus, BusId, Branch, BranchId, IdType, ActionKind};
    use bsr_registry::DeviceRegistry;
    use bsr_solver::SimulatedGateway;

    fn registry_with_branch() -> DeviceRegistry {
        let mut reg = DeviceRegistry::new();
        reg.insert_bus(Bus::new(1, "Bus 1", 1));
        reg.insert_bus(Bus::new(2, "Bus 2", 1));
        reg.insert_branch(Branch::new(BranchId::new(1), "L1-2", BusId::new(1), BusId::new(2)));
        reg
    }

    #[test]
    fn best_effort_action_runs_once_due() {
        let mut reg = registry_with_branch();
        let mut gw = SimulatedGateway::new();
        let action = Action::new(1, DeviceKind::Branch, IdType::Name, "L1-2", ActionKind::On, 10.0);
        let mut dispatcher = ActionDispatcher::new(vec![action], SchedulingMode::BestEffort, 1.0);
        let mut snap = Snapshot::default();
        dispatcher.tick(Seconds::new(5.0), 60.0, &mut reg, &mut gw, &mut snap).unwrap();
        assert_eq!(dispatcher.plan()[0].status, ActionStatus::NotStarted);
        dispatcher.tick(Seconds::new(10.0), 60.0, &mut reg, &mut gw, &mut snap).unwrap();
        assert_eq!(dispatcher.plan()[0].status, ActionStatus::Completed);
    }

    #[test]
    fn strict_mode_skips_once_the_exact_tick_has_passed() {
        let mut reg = registry_with_branch();
        let mut gw = SimulatedGateway::new();
        let action = Action::new(1, DeviceKind::Branch, IdType::Name, "L1-2", ActionKind::On, 10.0);
        let mut dispatcher = ActionDispatcher::new(vec![action], SchedulingMode::Strict, 1.0);
        let mut snap = Snapshot::default();
        dispatcher.tick(Seconds::new(11.0), 60.0, &mut reg, &mut gw, &mut snap).unwrap();
        assert_eq!(dispatcher.plan()[0].status, ActionStatus::Skipped);
    }

    #[test]
    fn windowed_mode_skips_past_end_time() {
        let mut reg = registry_with_branch();
        let mut gw = SimulatedGateway::new();
        let mut action = Action::new(1, DeviceKind::Branch, IdType::Name, "L1-2", ActionKind::On, 10.0);
        action.end_time_s = Some(12.0);
        let mut dispatcher = ActionDispatcher::new(vec![action], SchedulingMode::Windowed, 1.0);
        let mut snap = Snapshot::default();
        dispatcher.tick(Seconds::new(13.0), 60.0, &mut reg, &mut gw, &mut snap).unwrap();
        assert_eq!(dispatcher.plan()[0].status, ActionStatus::Skipped);
    }

    #[test]
    fn frequency_outside_margin_defers_non_generator_action() {
        let mut reg = registry_with_branch();
        let mut gw = SimulatedGateway::new();
        let action = Action::new(1, DeviceKind::Branch, IdType::Name, "L1-2", ActionKind::On, 10.0);
        let mut dispatcher = ActionDispatcher::new(vec![action], SchedulingMode::BestEffort, 0.05);
        let mut snap = Snapshot::default();
        dispatcher.tick(Seconds::new(10.0), 59.5, &mut reg, &mut gw, &mut snap).unwrap();
        assert_eq!(dispatcher.plan()[0].status, ActionStatus::InProgress);
        dispatcher.tick(Seconds::new(11.0), 60.0, &mut reg, &mut gw, &mut snap).unwrap();
        assert_eq!(dispatcher.plan()[0].status, ActionStatus::Completed);
    }

    #[test]
    fn tied_actions_execute_together() {
        let mut reg = registry_with_branch();
        reg.insert_bus(Bus::new(3, "Bus 3", 1));
        reg.insert_branch(Branch::new(BranchId::new(2), "L2-3", BusId::new(2), BusId::new(3)));
        let mut gw = SimulatedGateway::new();
        let mut a = Action::new(1, DeviceKind::Branch, IdType::Name, "L1-2", ActionKind::On, 10.0);
        let mut b = Action::new(2, DeviceKind::Branch, IdType::Name, "L2-3", ActionKind::On, 10.0);
        a.tie_parent = Some(1);
        b.tie_parent = Some(1);
        let mut dispatcher =
            ActionDispatcher::new(vec![a, b], SchedulingMode::TieSynchronized, 1.0);
        let mut snap = Snapshot::default();
        dispatcher.tick(Seconds::new(10.0), 60.0, &mut reg, &mut gw, &mut snap).unwrap();
        assert_eq!(dispatcher.plan()[0].status, ActionStatus::Completed);
        assert_eq!(dispatcher.plan()[1].status, ActionStatus::Completed);
    }
}
