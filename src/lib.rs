//! resilsim - disturbance-driven resilience time-series simulation
//!
//! Simulates one population (or N coupled community variables) relaxing
//! toward equilibrium between discrete disturbance pulses, sampled on a
//! fixed observation grid. The output tables feed downstream recovery-rate
//! estimation and plotting tooling.

pub mod config;
pub mod disturbance;
pub mod draws;
pub mod dynamics;
pub mod interaction;
pub mod monte_carlo;
pub mod sim;
pub mod table;

use thiserror::Error;

pub use config::{CommunityConfig, DynamicsKind, PopulationConfig};
pub use disturbance::{generate_magnitudes, generate_schedule, PulseGenerator};
pub use dynamics::{build_vector_field, decay_to, integrate, Competition, Dispersal, VectorField};
pub use interaction::build_interaction_matrix;
pub use monte_carlo::{
    ensemble_quantiles, run_replicates, summarize_batch, trajectory_rows, BatchSummary,
    QuantileRow, ReplicateBatch, ReplicateConfig, ReplicateRecord, TrajectoryRow,
    DEFAULT_REPLICATES,
};
pub use sim::{simulate_community, simulate_population, CommunityRun};
pub use table::OutputTable;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("interaction coefficients never satisfied their bounds after {attempts} resampling passes")]
    UnsatisfiableBound { attempts: usize },
    #[error("disturbance schedule failed to cover the horizon after {attempts} regeneration attempts")]
    ScheduleUnderflow { attempts: usize },
    #[error("integration from t={t0} to t={t1} failed: {detail}")]
    Integration { t0: f64, t1: f64, detail: String },
}
