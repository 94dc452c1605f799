//! Case/network definition (the `[[network.bus]]`-style tables of the
//! same TOML config the source's `*_Config.py` case files describe):
//! buses, branches, transformers, loads, and generators, converted
//! into a populated [`DeviceRegistry`].

use bsr_core::{
    Branch, BranchId, Bus, BusId, Connection, ConnectionKind, GenChannels, GenId, GenPhase,
    GenType, Generator, Load, LoadId, LoadPower, Transformer, TransformerId,
};
use bsr_registry::DeviceRegistry;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct NetworkSpec {
    #[serde(default)]
    pub bus: Vec<BusSpec>,
    #[serde(default)]
    pub branch: Vec<BranchSpec>,
    #[serde(default)]
    pub transformer: Vec<TransformerSpec>,
    #[serde(default)]
    pub load: Vec<LoadSpec>,
    #[serde(default)]
    pub generator: Vec<GeneratorSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BusSpec {
    pub number: i64,
    pub name: String,
    #[serde(default = "default_bus_type")]
    pub initial_type: u8,
}

fn default_bus_type() -> u8 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct BranchSpec {
    pub id: u64,
    pub name: String,
    pub from_bus: i64,
    pub to_bus: i64,
    #[serde(default)]
    pub gen_controlled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransformerSpec {
    pub id: u64,
    pub name: String,
    pub from_bus: i64,
    pub to_bus: i64,
    #[serde(default)]
    pub gen_controlled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoadSpec {
    pub id: u64,
    pub name: String,
    pub bus: i64,
    #[serde(default)]
    pub pl_mw: f64,
    #[serde(default)]
    pub ql_mvar: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorSpec {
    pub id: u64,
    pub name: String,
    pub bus: i64,
    pub mva_base: f64,
    #[serde(default)]
    pub is_black_start: bool,
    #[serde(default)]
    pub load_name: Option<String>,
    #[serde(default)]
    pub cranking_time_sec: f64,
    #[serde(default)]
    pub ramp_rate_mw_per_min: f64,
    #[serde(default)]
    pub popf_mw: f64,
    #[serde(default)]
    pub qopf_mvar: f64,
    #[serde(default)]
    pub agc_alpha: f64,
    #[serde(default = "default_droop")]
    pub speed_droop_r: f64,
    #[serde(default = "default_damping")]
    pub damping_d: f64,
    #[serde(default)]
    pub connection_branch_name: Option<String>,
    #[serde(default)]
    pub connection_from_bus: i64,
    #[serde(default)]
    pub connection_to_bus: i64,
}

fn default_droop() -> f64 {
    0.05
}

fn default_damping() -> f64 {
    1.0
}

impl NetworkSpec {
    pub fn build_registry(&self) -> DeviceRegistry {
        let mut registry = DeviceRegistry::new();

        for bus in &self.bus {
            registry.insert_bus(Bus::new(bus.number, bus.name.clone(), bus.initial_type));
        }
        for branch in &self.branch {
            let mut b = Branch::new(
                BranchId::new(branch.id),
                branch.name.clone(),
                BusId::new(branch.from_bus as u64),
                BusId::new(branch.to_bus as u64),
            );
            if branch.gen_controlled {
                b = b.as_gen_controlled();
            }
            registry.insert_branch(b);
        }
        for transformer in &self.transformer {
            let mut t = Transformer::new(
                TransformerId::new(transformer.id),
                transformer.name.clone(),
                BusId::new(transformer.from_bus as u64),
                BusId::new(transformer.to_bus as u64),
            );
            if transformer.gen_controlled {
                t = t.as_gen_controlled();
            }
            registry.insert_transformer(t);
        }
        for load in &self.load {
            let power = LoadPower {
                pl: bsr_core::Megawatts::new(load.pl_mw),
                ql: bsr_core::Megavars::new(load.ql_mvar),
                ip: 0.0,
                iq: 0.0,
                yp: 0.0,
                yq: 0.0,
            };
            registry.insert_load(Load::new(
                LoadId::new(load.id),
                load.name.clone(),
                BusId::new(load.bus as u64),
                power,
            ));
        }
        for gen in &self.generator {
            let connection = gen.connection_branch_name.as_ref().map(|name| Connection {
                kind: ConnectionKind::Branch,
                element_name: name.clone(),
                from_bus: BusId::new(gen.connection_from_bus as u64),
                to_bus: BusId::new(gen.connection_to_bus as u64),
            });
            registry.insert_generator(Generator {
                id: GenId::new(gen.id),
                name: gen.name.clone(),
                bus: BusId::new(gen.bus as u64),
                mva_base: gen.mva_base,
                phase: if gen.is_black_start {
                    GenPhase::InService
                } else {
                    GenPhase::Off
                },
                gen_type: if gen.is_black_start {
                    GenType::Bs
                } else {
                    GenType::Nbs
                },
                load_name: gen.load_name.clone(),
                cranking_time_sec: gen.cranking_time_sec,
                ramp_rate_mw_per_min: gen.ramp_rate_mw_per_min,
                cranking_power: LoadPower::default(),
                popf_mw: bsr_core::Megawatts::new(gen.popf_mw),
                qopf_mvar: bsr_core::Megavars::new(gen.qopf_mvar),
                agc_alpha: gen.agc_alpha,
                speed_droop_r: gen.speed_droop_r,
                damping_d: gen.damping_d,
                bias_scaling: 1.0,
                use_gen_ramp_rate: true,
                load_enabled_response: false,
                lerpf: 1.0,
                connection,
                channels: GenChannels::default(),
                last_action_time: None,
            });
        }

        registry
    }
}
