//! AGC Controller: the automatic generation control loop.
//!
//! Ported from `AGCControl()` in the original simulator: for every
//! `InService` generator with a non-zero participation factor, compute
//! the system frequency deviation, skip the tick entirely on a NaN
//! reading or a deviation inside the deadband, otherwise rescale the
//! active participation set to sum to 1 and push a proportional
//! setpoint adjustment to each generator.

use bsr_core::{AgcRow, Hertz, Seconds};
use bsr_registry::DeviceRegistry;
use bsr_solver::{GatewayError, SolverGateway};
use tracing::{debug, warn};

const NOMINAL_FREQUENCY_HZ: f64 = 60.0;
const DEADBAND_HZ: f64 = 0.01;
const PROPORTIONAL_GAIN: f64 = 1.0;

/// One AGC evaluation. Returns the per-generator rows it computed (for
/// the State Publisher and for tests), or `None` if AGC took no action
/// this tick (NaN frequency or inside the deadband).
pub fn run_agc(
    registry: &mut DeviceRegistry,
    gateway: &mut dyn SolverGateway,
    frequency: Hertz,
    now: Seconds,
) -> Result<Option<Vec<AgcRow>>, GatewayError> {
    if frequency.is_nan() {
        warn!("AGC skipped: frequency reading is NaN");
        return Ok(None);
    }

    let delta_f = frequency.value() - NOMINAL_FREQUENCY_HZ;
    if delta_f.abs() < DEADBAND_HZ {
        debug!(delta_f, "AGC skipped: within deadband");
        return Ok(None);
    }

    let active_alpha_sum: f64 = registry
        .generators
        .values()
        .filter(|g| g.in_service() && g.agc_alpha > 0.0)
        .map(|g| g.agc_alpha)
        .sum();

    if active_alpha_sum <= 0.0 {
        debug!("AGC skipped: no active generators in the participation set");
        return Ok(None);
    }

    let mut rows = Vec::new();
    let active_ids: Vec<_> = registry
        .generators
        .values()
        .filter(|g| g.in_service() && g.agc_alpha > 0.0)
        .map(|g| g.id)
        .collect();

    for id in active_ids {
        let gen = registry.generators.get_mut(&id).expect("collected above");
        let alpha_rescaled = gen.agc_alpha / active_alpha_sum;
        let bias = gen.effective_bias();
        let delta_p_g = -bias * delta_f * alpha_rescaled * PROPORTIONAL_GAIN;
        let new_gref = (gen.popf_mw.value() + delta_p_g) / gen.mva_base;

        gateway.set_gen_ref(
            gen.bus.value() as i64,
            &gen.name,
            bsr_core::PerUnit::new(new_gref),
            bsr_core::PerUnit::new(1.0),
        )?;

        rows.push(AgcRow {
            gen_name: gen.name.clone(),
            alpha: alpha_rescaled,
            delta_p_g_mw: delta_p_g,
            delta_f_hz: delta_f,
            delta_f_rate_hz_per_s: 0.0,
        });
    }

    Ok(Some(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bsr_core::{BusId, GenChannels, GenId, GenPhase, GenType, LoadPower, Megavars, Megawatts};

    fn in_service_gen(id: u64, alpha: f64) -> bsr_core::Generator {
        bsr_core::Generator {
            id: GenId::new(id),
            name: format!("GEN{id}"),
            bus: BusId::new(id),
            mva_base: 100.0,
            phase: GenPhase::InService,
            gen_type: GenType::Nbs,
            load_name: None,
            cranking_time_sec: 0.0,
            ramp_rate_mw_per_min: 0.0,
            cranking_power: LoadPower::default(),
            popf_mw: Megawatts::new(50.0),
            qopf_mvar: Megavars::new(0.0),
            agc_alpha: alpha,
            speed_droop_r: 0.05,
            damping_d: 1.0,
            bias_scaling: 1.0,
            use_gen_ramp_rate: false,
            load_enabled_response: true,
            lerpf: 1.0,
            connection: None,
            channels: GenChannels::default(),
            last_action_time: None,
        }
    }

    #[test]
    fn nan_frequency_skips_agc() {
        let mut reg = DeviceRegistry::new();
        reg.insert_generator(in_service_gen(1, 0.5));
        let mut gw = bsr_solver::SimulatedGateway::new();
        let result = run_agc(&mut reg, &mut gw, Hertz::new(f64::NAN), Seconds::new(0.0)).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn within_deadband_skips_agc() {
        let mut reg = DeviceRegistry::new();
        reg.insert_generator(in_service_gen(1, 0.5));
        let mut gw = bsr_solver::SimulatedGateway::new();
        let result = run_agc(&mut reg, &mut gw, Hertz::new(60.005), Seconds::new(0.0)).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn alphas_rescale_to_sum_to_one() {
        let mut reg = DeviceRegistry::new();
        reg.insert_generator(in_service_gen(1, 0.3));
        reg.insert_generator(in_service_gen(2, 0.3));
        let mut gw = bsr_solver::SimulatedGateway::new();
        let rows = run_agc(&mut reg, &mut gw, Hertz::new(59.9), Seconds::new(0.0))
            .unwrap()
            .unwrap();
        let total: f64 = rows.iter().map(|r| r.alpha).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn underfrequency_increases_setpoint() {
        let mut reg = DeviceRegistry::new();
        reg.insert_generator(in_service_gen(1, 1.0));
        let mut gw = bsr_solver::SimulatedGateway::new();
        let rows = run_agc(&mut reg, &mut gw, Hertz::new(59.9), Seconds::new(0.0))
            .unwrap()
            .unwrap();
        assert!(rows[0].delta_p_g_mw > 0.0);
    }
}
