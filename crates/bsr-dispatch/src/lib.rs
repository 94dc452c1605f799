//! # bsr-dispatch: the restoration tick loop
//!
//! Ties the Action Dispatcher, Generator Lifecycle, AGC Controller, and
//! State Publisher together into a fixed tick order: evaluate the
//! plan, advance generator lifecycles, run AGC, then publish whatever
//! changed. [`SimRunner`] is the one entry point `bsr-cli` drives.

pub mod agc;
pub mod dispatcher;
pub mod error;
pub mod lifecycle;
pub mod publisher;

pub use dispatcher::{ActionDispatcher, SchedulingMode};
pub use error::{DispatchError, DispatchResult};
pub use publisher::{Snapshot, StatePublisher};

use bsr_core::{AgcRow, Hertz, Seconds};
use bsr_registry::DeviceRegistry;
use bsr_solver::SolverGateway;
use tracing::debug;

/// Owns a tick loop: a dispatcher, a registry, a gateway, and a state
/// publisher, advanced one framework step at a time.
pub struct SimRunner {
    pub registry: DeviceRegistry,
    pub dispatcher: ActionDispatcher,
    pub publisher: StatePublisher,
    dt_fw: Seconds,
    frequency_channel: Option<usize>,
}

/// What one tick produced, for the caller to log or archive.
pub struct TickReport {
    pub now: Seconds,
    pub snapshot: Snapshot,
    pub agc_rows: Option<Vec<AgcRow>>,
}

impl SimRunner {
    pub fn new(
        registry: DeviceRegistry,
        dispatcher: ActionDispatcher,
        dt_fw: Seconds,
        frequency_channel: Option<usize>,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            publisher: StatePublisher::new(),
            dt_fw,
            frequency_channel,
        }
    }

    /// Run one framework tick: evaluatePlan -> advanceLifecycles ->
    /// runAGC -> publishSnapshot, in that fixed order.
    pub fn tick(
        &mut self,
        now: Seconds,
        gateway: &mut dyn SolverGateway,
    ) -> DispatchResult<TickReport> {
        let frequency_hz = match self.frequency_channel {
            Some(idx) => gateway.read_channel(idx)?,
            None => 60.0,
        };

        let mut snapshot = Snapshot {
            time_s: now.value(),
            changes: Vec::new(),
        };

        self.dispatcher
            .tick(now, frequency_hz, &mut self.registry, gateway, &mut snapshot)?;

        lifecycle::advance_lifecycles(&mut self.registry, now, self.dt_fw);

        let agc_rows = agc::run_agc(&mut self.registry, gateway, Hertz::new(frequency_hz), now)?;

        let published = self.publisher.publish(&self.registry, now);
        snapshot.changes.extend(published.changes);

        debug!(time_s = now.value(), frequency_hz, "tick complete");

        Ok(TickReport {
            now,
            snapshot,
            agc_rows,
        })
    }
}
