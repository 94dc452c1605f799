//! Device Operations: one [`Op`] per `(DeviceKind, ActionKind)`.
//!
//! An object-safe trait with `&self` methods, implemented by unit
//! structs, looked up through a table rather than a big match in the
//! caller.

use crate::{DeviceRegistry, OpError};
use bsr_core::Action;
use bsr_solver::SolverGateway;

/// A single device action. Implementations run the solver-gateway call
/// and the registry-local bookkeeping (status flags, last-action
/// stamps) that corresponds to one plan action.
///
/// Object-safe and `Send + Sync` so the global registry behind
/// [`crate::OpTable`] can hold `Arc<dyn Op>` and share one instance per
/// `(DeviceKind, ActionKind)` across every dispatch call.
pub trait Op: Send + Sync {
    fn run(
        &self,
        action: &Action,
        registry: &mut DeviceRegistry,
        gateway: &mut dyn SolverGateway,
    ) -> Result<(), OpError>;
}

fn precondition(cond: bool, msg: impl Into<String>) -> Result<(), OpError> {
    if cond {
        Ok(())
    } else {
        Err(OpError::PreconditionFailed(msg.into()))
    }
}

pub struct BranchOn;
impl Op for BranchOn {
    fn run(
        &self,
        action: &Action,
        registry: &mut DeviceRegistry,
        gateway: &mut dyn SolverGateway,
    ) -> Result<(), OpError> {
        let branch = registry.branch_by_name_mut(&action.id_value)?;
        precondition(
            !branch.gen_controlled,
            format!(
                "{} is owned by the generator lifecycle and cannot be closed directly",
                branch.name
            ),
        )?;
        gateway.close_branch(branch.from_bus.value() as i64, branch.to_bus.value() as i64, "1")?;
        branch.close(bsr_core::Seconds::new(action.action_time_s));
        Ok(())
    }
}

pub struct BranchOff;
impl Op for BranchOff {
    fn run(
        &self,
        action: &Action,
        registry: &mut DeviceRegistry,
        gateway: &mut dyn SolverGateway,
    ) -> Result<(), OpError> {
        let branch = registry.branch_by_name_mut(&action.id_value)?;
        precondition(
            !branch.gen_controlled,
            format!(
                "{} is owned by the generator lifecycle and cannot be tripped directly",
                branch.name
            ),
        )?;
        gateway.trip_branch(branch.from_bus.value() as i64, branch.to_bus.value() as i64, "1")?;
        branch.trip(bsr_core::Seconds::new(action.action_time_s));
        Ok(())
    }
}

pub struct TransformerOn;
impl Op for TransformerOn {
    fn run(
        &self,
        action: &Action,
        registry: &mut DeviceRegistry,
        gateway: &mut dyn SolverGateway,
    ) -> Result<(), OpError> {
        let xfmr = registry.transformer_by_name_mut(&action.id_value)?;
        precondition(
            !xfmr.gen_controlled,
            format!(
                "{} is owned by the generator lifecycle and cannot be closed directly",
                xfmr.name
            ),
        )?;
        gateway.close_branch(xfmr.from_bus.value() as i64, xfmr.to_bus.value() as i64, "1")?;
        xfmr.close(bsr_core::Seconds::new(action.action_time_s));
        Ok(())
    }
}

pub struct TransformerOff;
impl Op for TransformerOff {
    fn run(
        &self,
        action: &Action,
        registry: &mut DeviceRegistry,
        gateway: &mut dyn SolverGateway,
    ) -> Result<(), OpError> {
        let xfmr = registry.transformer_by_name_mut(&action.id_value)?;
        precondition(
            !xfmr.gen_controlled,
            format!(
                "{} is owned by the generator lifecycle and cannot be tripped directly",
                xfmr.name
            ),
        )?;
        gateway.trip_branch(xfmr.from_bus.value() as i64, xfmr.to_bus.value() as i64, "1")?;
        xfmr.trip(bsr_core::Seconds::new(action.action_time_s));
        Ok(())
    }
}

/// Closing a bus that sits on a live island without the generator
/// lifecycle's say-so is the premature-energization hazard the design
/// doc calls out explicitly; this is the one precondition that reaches
/// across from the bus to its incident branches/transformers.
pub struct BusOn;
impl Op for BusOn {
    fn run(
        &self,
        action: &Action,
        registry: &mut DeviceRegistry,
        gateway: &mut dyn SolverGateway,
    ) -> Result<(), OpError> {
        let bus = registry.bus_by_name(&action.id_value)?;
        let bus_id = bsr_core::BusId::new(bus.number as u64);
        let bus_number = bus.number;
        precondition(
            !registry.bus_has_closed_incident_element(bus_id)
                || registry.generators_at_bus(bus_id).any(|g| g.in_service()),
            format!(
                "Bus {bus_number} would be energized onto a live island with no in-service generator"
            ),
        )?;
        gateway.close_bus(bus_number)?;
        let bus = registry
            .buses
            .get_mut(&bus_id)
            .expect("resolved by bus_by_name above");
        bus.close(bsr_core::Seconds::new(action.action_time_s));
        Ok(())
    }
}

pub struct BusOff;
impl Op for BusOff {
    fn run(
        &self,
        action: &Action,
        registry: &mut DeviceRegistry,
        gateway: &mut dyn SolverGateway,
    ) -> Result<(), OpError> {
        let bus = registry.bus_by_name(&action.id_value)?;
        let bus_number = bus.number;
        let bus_id = bsr_core::BusId::new(bus.number as u64);
        gateway.trip_bus(bus_number)?;
        let bus = registry
            .buses
            .get_mut(&bus_id)
            .expect("resolved by bus_by_name above");
        bus.trip(bsr_core::Seconds::new(action.action_time_s));
        Ok(())
    }
}

pub struct LoadOn;
impl Op for LoadOn {
    fn run(
        &self,
        action: &Action,
        registry: &mut DeviceRegistry,
        gateway: &mut dyn SolverGateway,
    ) -> Result<(), OpError> {
        let load = registry.load_by_name_mut(&action.id_value)?;
        gateway.enable_load(load.bus.value() as i64, &load.name)?;
        load.enable();
        Ok(())
    }
}

pub struct LoadOff;
impl Op for LoadOff {
    fn run(
        &self,
        action: &Action,
        registry: &mut DeviceRegistry,
        gateway: &mut dyn SolverGateway,
    ) -> Result<(), OpError> {
        let load = registry.load_by_name_mut(&action.id_value)?;
        gateway.disable_load(load.bus.value() as i64, &load.name)?;
        load.disable();
        Ok(())
    }
}

/// Updates a generator's governor/voltage reference from the action's
/// `Values` cell (`Gref=...;Vref=...`), the only generator action a
/// plan row may request directly — lifecycle transitions are driven by
/// the Generator Lifecycle subsystem, never by a plan action.
pub struct GenUpdate;
impl Op for GenUpdate {
    fn run(
        &self,
        action: &Action,
        registry: &mut DeviceRegistry,
        gateway: &mut dyn SolverGateway,
    ) -> Result<(), OpError> {
        let gen = registry.gen_by_name_mut(&action.id_value)?;
        precondition(
            gen.in_service(),
            format!("{} cannot accept a setpoint update before InService", gen.name),
        )?;
        let gref = action.values.get("Gref").copied().unwrap_or(0.0);
        let vref = action.values.get("Vref").copied().unwrap_or(1.0);
        gateway.set_gen_ref(
            gen.bus.value() as i64,
            &gen.name,
            bsr_core::PerUnit::new(gref),
            bsr_core::PerUnit::new(vref),
        )?;
        gen.last_action_time = Some(bsr_core::Seconds::new(action.action_time_s));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bsr_core::{ActionKind, Bus, BusId, DeviceKind, Generator, GenChannels, GenId, GenPhase, GenType, IdType, LoadPower};

    fn sample_registry() -> DeviceRegistry {
        let mut reg = DeviceRegistry::new();
        reg.insert_bus(Bus::new(1, "Bus 1", 1));
        reg.insert_bus(Bus::new(2, "Bus 2", 4));
        reg.insert_branch(
            bsr_core::Branch::new(bsr_core::BranchId::new(1), "L1-2", BusId::new(1), BusId::new(2))
                .as_gen_controlled(),
        );
        reg
    }

    #[test]
    fn branch_on_rejects_generator_owned_branch() {
        let mut reg = sample_registry();
        let mut gw = bsr_solver::SimulatedGateway::new();
        let action = Action::new(1, DeviceKind::Branch, IdType::Name, "L1-2", ActionKind::On, 0.0);
        let err = BranchOn.run(&action, &mut reg, &mut gw).unwrap_err();
        assert!(matches!(err, OpError::PreconditionFailed(_)));
    }

    #[test]
    fn load_on_enables_load_and_reflects_on_gateway() {
        let mut reg = DeviceRegistry::new();
        reg.insert_bus(Bus::new(1, "Bus 1", 1));
        reg.insert_load(bsr_core::Load::new(
            bsr_core::LoadId::new(1),
            "LOAD1",
            BusId::new(1),
            LoadPower::default(),
        ));
        let mut gw = bsr_solver::SimulatedGateway::new();
        let action = Action::new(1, DeviceKind::Load, IdType::Name, "LOAD1", ActionKind::On, 5.0);
        LoadOn.run(&action, &mut reg, &mut gw).unwrap();
        assert!(reg.load_by_name_mut("LOAD1").unwrap().is_enabled());
    }

    #[test]
    fn gen_update_rejects_before_in_service() {
        let mut reg = DeviceRegistry::new();
        reg.insert_bus(Bus::new(2, "Bus 2", 1));
        reg.insert_generator(Generator {
            id: GenId::new(1),
            name: "GEN2".into(),
            bus: BusId::new(2),
            mva_base: 100.0,
            phase: GenPhase::Cranking,
            gen_type: GenType::Nbs,
            load_name: None,
            cranking_time_sec: 150.0,
            ramp_rate_mw_per_min: 6.0,
            cranking_power: LoadPower::default(),
            popf_mw: bsr_core::Megawatts::new(0.0),
            qopf_mvar: bsr_core::Megavars::new(0.0),
            agc_alpha: 0.0,
            speed_droop_r: 0.05,
            damping_d: 1.0,
            bias_scaling: 1.0,
            use_gen_ramp_rate: true,
            load_enabled_response: true,
            lerpf: 1.0,
            connection: None,
            channels: GenChannels::default(),
            last_action_time: None,
        });
        let mut gw = bsr_solver::SimulatedGateway::new();
        let mut action = Action::new(1, DeviceKind::Gen, IdType::Name, "GEN2", ActionKind::Update, 5.0);
        action.values.insert("Gref".into(), 0.8);
        let err = GenUpdate.run(&action, &mut reg, &mut gw).unwrap_err();
        assert!(matches!(err, OpError::PreconditionFailed(_)));
    }
}
