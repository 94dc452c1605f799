//! # bsr-solver: the Solver Gateway
//!
//! Abstracts over the external electrical solver (a PSS/E-class
//! co-simulator process): a narrow trait the rest of the crate
//! programs against, plus one concrete in-process implementation for
//! testing and dry runs.
//!
//! The gateway is deliberately **not** `Sync` and every mutating call
//! takes `&mut self`: only one in-flight call is ever allowed, enforced
//! here at the type level rather than with a runtime lock. A caller
//! that needs to share a gateway across tasks must serialize access
//! itself (and shouldn't — the dispatcher tick loop is strictly
//! sequential).

use bsr_core::{Hertz, PerUnit, Seconds};
use std::collections::HashMap;
use thiserror::Error;
use tracing::trace;

/// Errors a gateway implementation can report.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    #[error("device {0} already in requested state")]
    AlreadyInState(String),

    #[error("channel {0} was never registered")]
    UnknownChannel(usize),

    #[error("solver communication failed: {0}")]
    Communication(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// The narrow surface the dispatcher, generator lifecycle, and AGC
/// controller need from the electrical solver: device queries, status
/// mutations, channel reads, and time advance. Every method name here
/// corresponds 1:1 to the restoration loop's per-tick vocabulary.
pub trait SolverGateway {
    /// Close a branch identified by its PSS/E-style from/to/circuit key.
    fn close_branch(&mut self, from_bus: i64, to_bus: i64, ckt: &str) -> GatewayResult<()>;

    /// Trip a branch.
    fn trip_branch(&mut self, from_bus: i64, to_bus: i64, ckt: &str) -> GatewayResult<()>;

    /// Close (restore) a bus: sets its type back to its pre-trip value.
    fn close_bus(&mut self, bus_number: i64) -> GatewayResult<()>;

    /// Trip a bus: sets its type to 4 (isolated).
    fn trip_bus(&mut self, bus_number: i64) -> GatewayResult<()>;

    /// Enable a load.
    fn enable_load(&mut self, bus_number: i64, load_id: &str) -> GatewayResult<()>;

    /// Disable a load.
    fn disable_load(&mut self, bus_number: i64, load_id: &str) -> GatewayResult<()>;

    /// Push a new governor/voltage reference pair to a generator.
    fn set_gen_ref(
        &mut self,
        bus_number: i64,
        gen_id: &str,
        gref: PerUnit,
        vref: PerUnit,
    ) -> GatewayResult<()>;

    /// Read the current value of a previously registered channel.
    fn read_channel(&self, index: usize) -> GatewayResult<f64>;

    /// Register a new channel and return its index. Indices are
    /// assigned in registration order and never reused.
    fn register_channel(&mut self, base_value: f64) -> usize;

    /// Advance the solver's internal clock by `dt` and return the new
    /// absolute simulated time. This is the single point at which
    /// device dynamics (frequency, cranking loads, etc.) evolve.
    fn advance_time(&mut self, dt: Seconds) -> GatewayResult<Seconds>;

    /// The solver's current absolute simulated time.
    fn current_time(&self) -> Seconds;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BranchKey {
    from_bus: i64,
    to_bus: i64,
    ckt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LoadKey {
    bus_number: i64,
    load_id: String,
}

/// An in-process stand-in for the electrical solver, used by
/// integration tests and by `bsr-cli --dry-run`. Frequency response is
/// a simple first-order relaxation toward 60 Hz driven by a settable
/// system imbalance — enough to drive the AGC and lifecycle state
/// machines through realistic transitions without an external process.
#[derive(Debug)]
pub struct SimulatedGateway {
    time: Seconds,
    channels: Vec<f64>,
    branch_closed: HashMap<BranchKey, bool>,
    bus_tripped: HashMap<i64, bool>,
    load_enabled: HashMap<LoadKey, bool>,
    gen_refs: HashMap<LoadKey, (PerUnit, PerUnit)>,
    frequency_hz: f64,
    imbalance_mw: f64,
    system_inertia_mw_s_per_hz: f64,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self {
            time: Seconds::new(0.0),
            channels: Vec::new(),
            branch_closed: HashMap::new(),
            bus_tripped: HashMap::new(),
            load_enabled: HashMap::new(),
            gen_refs: HashMap::new(),
            frequency_hz: 60.0,
            imbalance_mw: 0.0,
            system_inertia_mw_s_per_hz: 400.0,
        }
    }

    /// Test/CLI hook: inject a generation-minus-load imbalance in MW so
    /// the simulated frequency drifts away from nominal, giving the AGC
    /// controller something to correct.
    pub fn set_imbalance(&mut self, mw: f64) {
        self.imbalance_mw = mw;
    }

    pub fn frequency(&self) -> Hertz {
        Hertz::new(self.frequency_hz)
    }

    fn branch_key(from_bus: i64, to_bus: i64, ckt: &str) -> BranchKey {
        BranchKey {
            from_bus,
            to_bus,
            ckt: ckt.to_string(),
        }
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl SolverGateway for SimulatedGateway {
    fn close_branch(&mut self, from_bus: i64, to_bus: i64, ckt: &str) -> GatewayResult<()> {
        let key = Self::branch_key(from_bus, to_bus, ckt);
        if self.branch_closed.get(&key) == Some(&true) {
            return Err(GatewayError::AlreadyInState(format!(
                "branch {from_bus}-{to_bus}:{ckt}"
            )));
        }
        self.branch_closed.insert(key, true);
        Ok(())
    }

    fn trip_branch(&mut self, from_bus: i64, to_bus: i64, ckt: &str) -> GatewayResult<()> {
        let key = Self::branch_key(from_bus, to_bus, ckt);
        self.branch_closed.insert(key, false);
        Ok(())
    }

    fn close_bus(&mut self, bus_number: i64) -> GatewayResult<()> {
        self.bus_tripped.insert(bus_number, false);
        Ok(())
    }

    fn trip_bus(&mut self, bus_number: i64) -> GatewayResult<()> {
        self.bus_tripped.insert(bus_number, true);
        Ok(())
    }

    fn enable_load(&mut self, bus_number: i64, load_id: &str) -> GatewayResult<()> {
        self.load_enabled.insert(
            LoadKey {
                bus_number,
                load_id: load_id.to_string(),
            },
            true,
        );
        Ok(())
    }

    fn disable_load(&mut self, bus_number: i64, load_id: &str) -> GatewayResult<()> {
        self.load_enabled.insert(
            LoadKey {
                bus_number,
                load_id: load_id.to_string(),
            },
            false,
        );
        Ok(())
    }

    fn set_gen_ref(
        &mut self,
        bus_number: i64,
        gen_id: &str,
        gref: PerUnit,
        vref: PerUnit,
    ) -> GatewayResult<()> {
        self.gen_refs.insert(
            LoadKey {
                bus_number,
                load_id: gen_id.to_string(),
            },
            (gref, vref),
        );
        Ok(())
    }

    fn read_channel(&self, index: usize) -> GatewayResult<f64> {
        self.channels
            .get(index)
            .copied()
            .ok_or(GatewayError::UnknownChannel(index))
    }

    fn register_channel(&mut self, base_value: f64) -> usize {
        self.channels.push(base_value);
        self.channels.len() - 1
    }

    fn advance_time(&mut self, dt: Seconds) -> GatewayResult<Seconds> {
        if !dt.is_finite() || dt.value() < 0.0 {
            return Err(GatewayError::Communication(format!(
                "invalid step size {}",
                dt.value()
            )));
        }
        let dhz = -(self.imbalance_mw / self.system_inertia_mw_s_per_hz) * dt.value();
        self.frequency_hz += dhz;
        self.time = self.time + dt;
        trace!(time_s = self.time.value(), frequency_hz = self.frequency_hz, "advanced simulated time");
        Ok(self.time)
    }

    fn current_time(&self) -> Seconds {
        self.time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closing_an_already_closed_branch_errors() {
        let mut gw = SimulatedGateway::new();
        gw.close_branch(1, 2, "1").unwrap();
        let err = gw.close_branch(1, 2, "1").unwrap_err();
        assert!(matches!(err, GatewayError::AlreadyInState(_)));
    }

    #[test]
    fn imbalance_drives_frequency_away_from_nominal() {
        let mut gw = SimulatedGateway::new();
        gw.set_imbalance(100.0);
        gw.advance_time(Seconds::new(10.0)).unwrap();
        assert!(gw.frequency().value() < 60.0);
    }

    #[test]
    fn zero_imbalance_holds_nominal_frequency() {
        let mut gw = SimulatedGateway::new();
        gw.advance_time(Seconds::new(100.0)).unwrap();
        assert!((gw.frequency().value() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn channel_registration_and_readback() {
        let mut gw = SimulatedGateway::new();
        let idx = gw.register_channel(59.95);
        assert_eq!(gw.read_channel(idx).unwrap(), 59.95);
        assert!(matches!(
            gw.read_channel(idx + 1),
            Err(GatewayError::UnknownChannel(_))
        ));
    }

    #[test]
    fn negative_step_is_rejected() {
        let mut gw = SimulatedGateway::new();
        let err = gw.advance_time(Seconds::new(-1.0)).unwrap_err();
        assert!(matches!(err, GatewayError::Communication(_)));
    }
}
