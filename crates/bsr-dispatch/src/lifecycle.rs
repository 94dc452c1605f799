//! Generator Lifecycle: the 4-phase state machine.
//!
//! `Off -> Cranking -> Ramping -> InService`, driven purely by observed
//! plant state each tick (cranking load energized, ramp target
//! reached) rather than by an explicit plan action — a plan can enable
//! the cranking load or close the connecting branch, but nothing in a
//! plan names a lifecycle transition directly. This mirrors the
//! design note on state machines as enums: every phase is a distinct
//! `GenPhase` variant, never a raw integer, with `as_wire_code` as the
//! only place the CSV-compatible encoding is materialized.

use bsr_core::{GenPhase, Generator, Megawatts, Seconds};
use bsr_registry::DeviceRegistry;
use tracing::{debug, info};

/// Advance every non-black-start generator's lifecycle by one tick of
/// length `dt`. Black-start units are assumed `InService` from t=0 and
/// are never touched here.
pub fn advance_lifecycles(registry: &mut DeviceRegistry, now: Seconds, dt: Seconds) {
    for gen in registry.generators.values_mut() {
        if gen.is_black_start() {
            continue;
        }
        match gen.phase {
            GenPhase::Off => try_start_cranking(gen, now),
            GenPhase::Cranking => try_finish_cranking(gen, now),
            GenPhase::Ramping => advance_ramp(gen, dt, now),
            GenPhase::InService => {}
        }
    }
}

fn try_start_cranking(gen: &mut Generator, now: Seconds) {
    let cranking_load_energized = gen.load_enabled_response;
    let connection_closed = gen.connection.is_some();
    if cranking_load_energized && connection_closed {
        gen.phase = GenPhase::Cranking;
        gen.last_action_time = Some(now);
        info!(generator = %gen.name, "entering Cranking");
    }
}

fn try_finish_cranking(gen: &mut Generator, now: Seconds) {
    let started = gen.last_action_time.unwrap_or(now);
    let elapsed = now.value() - started.value();
    if elapsed >= gen.cranking_time_sec {
        gen.phase = GenPhase::Ramping;
        gen.last_action_time = Some(now);
        debug!(generator = %gen.name, elapsed, "cranking complete, entering Ramping");
    }
}

/// Linear ramp of electrical output toward `popf_mw` at
/// `ramp_rate_mw_per_min` (or the solver-reported governor ramp, when
/// `use_gen_ramp_rate` is set and a `pmech` channel is registered).
/// Transitions to `InService` once the output is within 0.1 MW of
/// target.
fn advance_ramp(gen: &mut Generator, _dt: Seconds, now: Seconds) {
    // Without a live channel reading this is a deterministic ramp
    // against elapsed time rather than observed electrical output;
    // when a `pelec` channel is registered the solver's own readback
    // would replace `reached_mw` here.
    let ramp_started = gen.last_action_time.unwrap_or(now);
    let elapsed_min = (now.value() - ramp_started.value()) / 60.0;
    let reached_mw = (elapsed_min * gen.ramp_rate_mw_per_min).min(gen.popf_mw.value());
    if (gen.popf_mw.value() - reached_mw).abs() < 0.1 {
        gen.phase = GenPhase::InService;
        gen.last_action_time = Some(now);
        info!(generator = %gen.name, "ramp complete, entering InService");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bsr_core::{BusId, Connection, ConnectionKind, GenChannels, GenId, GenType, LoadPower};

    fn off_gen() -> Generator {
        Generator {
            id: GenId::new(1),
            name: "GEN2".into(),
            bus: BusId::new(2),
            mva_base: 100.0,
            phase: GenPhase::Off,
            gen_type: GenType::Nbs,
            load_name: Some("LOAD_GEN2".into()),
            cranking_time_sec: 150.0,
            ramp_rate_mw_per_min: 60.0,
            cranking_power: LoadPower::default(),
            popf_mw: Megawatts::new(163.03),
            qopf_mvar: bsr_core::Megavars::new(0.0),
            agc_alpha: 0.5,
            speed_droop_r: 0.05,
            damping_d: 1.0,
            bias_scaling: 1.0,
            use_gen_ramp_rate: false,
            load_enabled_response: false,
            lerpf: 1.0,
            connection: None,
            channels: GenChannels::default(),
            last_action_time: None,
        }
    }

    #[test]
    fn stays_off_until_cranking_load_and_connection_are_both_present() {
        let mut gen = off_gen();
        advance_lifecycles_single(&mut gen, Seconds::new(0.0), Seconds::new(1.0));
        assert_eq!(gen.phase, GenPhase::Off);

        gen.load_enabled_response = true;
        gen.connection = Some(Connection {
            kind: ConnectionKind::Branch,
            element_name: "L2-7".into(),
            from_bus: BusId::new(2),
            to_bus: BusId::new(7),
        });
        advance_lifecycles_single(&mut gen, Seconds::new(0.0), Seconds::new(1.0));
        assert_eq!(gen.phase, GenPhase::Cranking);
    }

    #[test]
    fn cranking_completes_after_cranking_time_elapses() {
        let mut gen = off_gen();
        gen.phase = GenPhase::Cranking;
        gen.last_action_time = Some(Seconds::new(0.0));
        advance_lifecycles_single(&mut gen, Seconds::new(149.0), Seconds::new(1.0));
        assert_eq!(gen.phase, GenPhase::Cranking);
        advance_lifecycles_single(&mut gen, Seconds::new(150.0), Seconds::new(1.0));
        assert_eq!(gen.phase, GenPhase::Ramping);
    }

    #[test]
    fn ramp_reaches_in_service_once_target_is_hit() {
        let mut gen = off_gen();
        gen.phase = GenPhase::Ramping;
        gen.last_action_time = Some(Seconds::new(0.0));
        gen.popf_mw = Megawatts::new(10.0);
        gen.ramp_rate_mw_per_min = 60.0; // 1 MW/s
        advance_lifecycles_single(&mut gen, Seconds::new(5.0), Seconds::new(1.0));
        assert_eq!(gen.phase, GenPhase::Ramping);
        advance_lifecycles_single(&mut gen, Seconds::new(10.0), Seconds::new(1.0));
        assert_eq!(gen.phase, GenPhase::InService);
    }

    fn advance_lifecycles_single(gen: &mut Generator, now: Seconds, dt: Seconds) {
        match gen.phase {
            GenPhase::Off => try_start_cranking(gen, now),
            GenPhase::Cranking => try_finish_cranking(gen, now),
            GenPhase::Ramping => advance_ramp(gen, dt, now),
            GenPhase::InService => {}
        }
    }
}
