//! # bsr-registry: Device Registry and Device Operations
//!
//! The registry indexes every entity by name and by bus. The index key
//! is the device name the plan CSV and config use, not a graph node
//! handle, since restoration plans address devices by PSS/E-style
//! name/number, never by topology.
//!
//! Device Operations is the strategy-pattern half: one [`Op`] impl per
//! `(DeviceKind, ActionKind)` pair, registered into a static table and
//! looked up by [`OpTable::dispatch`] — an object-safe, `Send + Sync`
//! trait object behind a registry lookup, applied to device actions.

pub mod ops;

use bsr_core::{
    Action, ActionKind, Branch, BranchId, Bus, BusId, CoreError, DeviceKind, Generator, GenId,
    Load, LoadId, Transformer, TransformerId,
};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while looking devices up or running an operation.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("no operation registered for {device:?}/{action:?}")]
    NoSuchOp { device: DeviceKind, action: ActionKind },

    #[error(transparent)]
    Op(#[from] OpError),
}

/// Errors an [`Op`] implementation raises while running a device action.
#[derive(Error, Debug)]
pub enum OpError {
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error(transparent)]
    Gateway(#[from] bsr_solver::GatewayError),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Indexes every device by name and by owning bus. Field access is
/// direct (`pub`) rather than behind getters, since this is an
/// in-process data owner, not a network-facing API.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    pub buses: HashMap<BusId, Bus>,
    pub branches: HashMap<BranchId, Branch>,
    pub transformers: HashMap<TransformerId, Transformer>,
    pub loads: HashMap<LoadId, Load>,
    pub generators: HashMap<GenId, Generator>,

    bus_by_name: HashMap<String, BusId>,
    branch_by_name: HashMap<String, BranchId>,
    transformer_by_name: HashMap<String, TransformerId>,
    load_by_name: HashMap<String, LoadId>,
    gen_by_name: HashMap<String, GenId>,
    gen_by_bus: HashMap<BusId, Vec<GenId>>,
    load_by_bus: HashMap<BusId, Vec<LoadId>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_bus(&mut self, bus: Bus) {
        self.bus_by_name.insert(bus.name.clone(), BusId::new(bus.number as u64));
        self.buses.insert(BusId::new(bus.number as u64), bus);
    }

    pub fn insert_branch(&mut self, branch: Branch) {
        self.branch_by_name.insert(branch.name.clone(), branch.id);
        self.branches.insert(branch.id, branch);
    }

    pub fn insert_transformer(&mut self, transformer: Transformer) {
        self.transformer_by_name
            .insert(transformer.name.clone(), transformer.id);
        self.transformers.insert(transformer.id, transformer);
    }

    pub fn insert_load(&mut self, load: Load) {
        self.load_by_name.insert(load.name.clone(), load.id);
        self.load_by_bus.entry(load.bus).or_default().push(load.id);
        self.loads.insert(load.id, load);
    }

    pub fn insert_generator(&mut self, gen: Generator) {
        self.gen_by_name.insert(gen.name.clone(), gen.id);
        self.gen_by_bus.entry(gen.bus).or_default().push(gen.id);
        self.generators.insert(gen.id, gen);
    }

    pub fn bus_by_name(&self, name: &str) -> RegistryResult<&Bus> {
        let id = self
            .bus_by_name
            .get(name)
            .ok_or_else(|| CoreError::UnknownDevice(name.to_string()))?;
        Ok(&self.buses[id])
    }

    pub fn branch_by_name(&self, name: &str) -> RegistryResult<&Branch> {
        let id = self
            .branch_by_name
            .get(name)
            .ok_or_else(|| CoreError::UnknownDevice(name.to_string()))?;
        Ok(&self.branches[id])
    }

    pub fn branch_by_name_mut(&mut self, name: &str) -> RegistryResult<&mut Branch> {
        let id = *self
            .branch_by_name
            .get(name)
            .ok_or_else(|| CoreError::UnknownDevice(name.to_string()))?;
        Ok(self.branches.get_mut(&id).expect("index/table out of sync"))
    }

    pub fn transformer_by_name_mut(&mut self, name: &str) -> RegistryResult<&mut Transformer> {
        let id = *self
            .transformer_by_name
            .get(name)
            .ok_or_else(|| CoreError::UnknownDevice(name.to_string()))?;
        Ok(self
            .transformers
            .get_mut(&id)
            .expect("index/table out of sync"))
    }

    pub fn load_by_name_mut(&mut self, name: &str) -> RegistryResult<&mut Load> {
        let id = *self
            .load_by_name
            .get(name)
            .ok_or_else(|| CoreError::UnknownDevice(name.to_string()))?;
        Ok(self.loads.get_mut(&id).expect("index/table out of sync"))
    }

    pub fn gen_by_name(&self, name: &str) -> RegistryResult<&Generator> {
        let id = self
            .gen_by_name
            .get(name)
            .ok_or_else(|| CoreError::UnknownDevice(name.to_string()))?;
        Ok(&self.generators[id])
    }

    pub fn gen_by_name_mut(&mut self, name: &str) -> RegistryResult<&mut Generator> {
        let id = *self
            .gen_by_name
            .get(name)
            .ok_or_else(|| CoreError::UnknownDevice(name.to_string()))?;
        Ok(self.generators.get_mut(&id).expect("index/table out of sync"))
    }

    /// Generators whose `loadName` names a cranking load on this bus,
    /// used by [`PrematureEnergization`](OpError::PreconditionFailed)
    /// checks before a non-generator-owned branch/transformer close.
    pub fn generators_at_bus(&self, bus: BusId) -> impl Iterator<Item = &Generator> {
        self.gen_by_bus
            .get(&bus)
            .into_iter()
            .flatten()
            .map(move |id| &self.generators[id])
    }

    pub fn loads_at_bus(&self, bus: BusId) -> impl Iterator<Item = &Load> {
        self.load_by_bus
            .get(&bus)
            .into_iter()
            .flatten()
            .map(move |id| &self.loads[id])
    }

    /// True if any branch or transformer incident on `bus` is currently
    /// closed. Used by the premature-energization precondition: a bus
    /// cannot be closed onto a live island before its owning generator
    /// says so.
    pub fn bus_has_closed_incident_element(&self, bus: BusId) -> bool {
        self.branches
            .values()
            .any(|b| (b.from_bus == bus || b.to_bus == bus) && b.is_closed())
            || self
                .transformers
                .values()
                .any(|t| (t.from_bus == bus || t.to_bus == bus) && t.is_closed())
    }
}

type OpKey = (DeviceKind, ActionKind);

/// The process-wide default Op registry, a `Lazy<RwLock<_>>` seeded
/// with the built-in `(DeviceKind, ActionKind)` combinations and open
/// to [`register_op`] for a caller that needs to extend it (a custom
/// Gen action, say) without forking this crate.
static GLOBAL_OP_REGISTRY: once_cell::sync::Lazy<std::sync::RwLock<HashMap<OpKey, std::sync::Arc<dyn ops::Op>>>> =
    once_cell::sync::Lazy::new(|| {
        let mut table: HashMap<OpKey, std::sync::Arc<dyn ops::Op>> = HashMap::new();
        table.insert((DeviceKind::Branch, ActionKind::On), std::sync::Arc::new(ops::BranchOn));
        table.insert((DeviceKind::Branch, ActionKind::Off), std::sync::Arc::new(ops::BranchOff));
        table.insert(
            (DeviceKind::Transformer, ActionKind::On),
            std::sync::Arc::new(ops::TransformerOn),
        );
        table.insert(
            (DeviceKind::Transformer, ActionKind::Off),
            std::sync::Arc::new(ops::TransformerOff),
        );
        table.insert((DeviceKind::Bus, ActionKind::On), std::sync::Arc::new(ops::BusOn));
        table.insert((DeviceKind::Bus, ActionKind::Off), std::sync::Arc::new(ops::BusOff));
        table.insert((DeviceKind::Load, ActionKind::On), std::sync::Arc::new(ops::LoadOn));
        table.insert((DeviceKind::Load, ActionKind::Off), std::sync::Arc::new(ops::LoadOff));
        table.insert((DeviceKind::Gen, ActionKind::Update), std::sync::Arc::new(ops::GenUpdate));
        std::sync::RwLock::new(table)
    });

/// Register (or replace) the [`Op`](ops::Op) used for a `(device, action)`
/// pair in the global registry.
pub fn register_op(device: DeviceKind, action: ActionKind, op: std::sync::Arc<dyn ops::Op>) {
    GLOBAL_OP_REGISTRY
        .write()
        .expect("op registry lock poisoned")
        .insert((device, action), op);
}

/// Resolves an [`Action`]'s `(device_type, action_type)` pair to the
/// concrete device operation that executes it, then runs it against a
/// registry and gateway.
#[derive(Debug, Default)]
pub struct OpTable;

impl OpTable {
    pub fn new() -> Self {
        Self
    }

    /// Dispatch `action` against `registry`/`gateway`, looking up its
    /// `(device_type, action_type)` pair in the global Op registry. An
    /// action naming a combination that isn't registered fails with
    /// [`RegistryError::NoSuchOp`] rather than silently doing nothing.
    pub fn dispatch(
        &self,
        action: &Action,
        registry: &mut DeviceRegistry,
        gateway: &mut dyn bsr_solver::SolverGateway,
    ) -> RegistryResult<()> {
        let key = (action.device_type, action.action_type);
        let op = {
            let table = GLOBAL_OP_REGISTRY.read().expect("op registry lock poisoned");
            table.get(&key).cloned()
        };
        let op = match op {
            Some(op) => op,
            None => {
                tracing::warn!(
                    device = ?action.device_type,
                    action_kind = ?action.action_type,
                    "no operation registered for this combination"
                );
                return Err(RegistryError::NoSuchOp {
                    device: action.device_type,
                    action: action.action_type,
                });
            }
        };
        tracing::debug!(seq = action.seq, device = %action.id_value, "dispatching action");
        op.run(action, registry, gateway).map_err(RegistryError::from)
    }
}
