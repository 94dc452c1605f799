//! Error taxonomy for the dispatch layer. Wraps the layers below it
//! with `#[from]` so a core, registry, or gateway failure propagates
//! through the dispatcher without losing its source.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Core(#[from] bsr_core::CoreError),

    #[error(transparent)]
    Registry(#[from] bsr_registry::RegistryError),

    #[error(transparent)]
    Gateway(#[from] bsr_solver::GatewayError),

    #[error("action {seq} missed its window: now={now_s:.3}s, deadline={deadline_s:.3}s")]
    MissedWindow { seq: u64, now_s: f64, deadline_s: f64 },

    #[error("invalid plan: {0}")]
    InvalidPlan(String),
}

pub type DispatchResult<T> = Result<T, DispatchError>;
