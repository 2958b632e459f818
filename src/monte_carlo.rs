//! Replicate harness for Monte Carlo ensembles of single-population runs.
//!
//! Each replicate gets its own seeded rng derived from the batch seed, so a
//! batch is reproducible as a whole while replicates stay independent and
//! side-effect free; callers may fan them out across threads by deriving the
//! per-replicate seeds the same way.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::config::PopulationConfig;
use crate::sim::simulate_population;
use crate::table::OutputTable;
use crate::SimError;

pub const DEFAULT_REPLICATES: usize = 200;

#[derive(Clone, Debug)]
pub struct ReplicateConfig {
    pub n_runs: usize,
    pub seed: u64,
    pub base: PopulationConfig,
}

impl Default for ReplicateConfig {
    fn default() -> Self {
        Self {
            n_runs: DEFAULT_REPLICATES,
            seed: 17,
            base: PopulationConfig::default(),
        }
    }
}

/// Per-replicate summary row.
#[derive(Clone, Debug, Serialize)]
pub struct ReplicateRecord {
    pub run_id: usize,
    pub seed: u64,
    pub final_state: f64,
    pub min_state: f64,
    pub max_deviation: f64,
    pub total_pulses: u64,
}

#[derive(Clone, Debug)]
pub struct ReplicateBatch {
    pub records: Vec<ReplicateRecord>,
    pub tables: Vec<OutputTable>,
}

/// Ensemble quantiles of the state at one sample time, the shape the
/// plotting collaborator consumes.
#[derive(Clone, Debug, Serialize)]
pub struct QuantileRow {
    pub t: f64,
    pub q05: f64,
    pub median: f64,
    pub q95: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct BatchSummary {
    pub n_runs: usize,
    pub seed: u64,
    pub nobs: usize,
    pub mean_final_state: f64,
    pub mean_pulses_per_run: f64,
    pub min_state_observed: f64,
}

/// One row of a single-replicate trajectory, for CSV emission.
#[derive(Clone, Debug, Serialize)]
pub struct TrajectoryRow {
    pub t: f64,
    pub disturbances: u32,
    pub x: f64,
}

pub fn run_replicates(config: &ReplicateConfig) -> Result<ReplicateBatch, SimError> {
    if config.n_runs == 0 {
        return Err(SimError::InvalidConfig("n_runs must be > 0".to_string()));
    }
    config.base.validate()?;

    let mut master = ChaCha8Rng::seed_from_u64(config.seed);
    let mut records = Vec::with_capacity(config.n_runs);
    let mut tables = Vec::with_capacity(config.n_runs);

    for run_id in 0..config.n_runs {
        let seed: u64 = master.gen();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let table = simulate_population(&config.base, &mut rng)?;

        let states = table.state_column(0);
        records.push(ReplicateRecord {
            run_id,
            seed,
            final_state: *states.last().unwrap_or(&0.0),
            min_state: states.iter().copied().fold(f64::INFINITY, f64::min),
            max_deviation: states.iter().map(|v| v.abs()).fold(0.0, f64::max),
            total_pulses: table.total_pulses(),
        });
        tables.push(table);
    }

    Ok(ReplicateBatch { records, tables })
}

pub fn summarize_batch(config: &ReplicateConfig, batch: &ReplicateBatch) -> BatchSummary {
    let n = batch.records.len().max(1) as f64;
    BatchSummary {
        n_runs: batch.records.len(),
        seed: config.seed,
        nobs: batch.tables.first().map_or(0, OutputTable::nrows),
        mean_final_state: batch.records.iter().map(|r| r.final_state).sum::<f64>() / n,
        mean_pulses_per_run: batch.records.iter().map(|r| r.total_pulses as f64).sum::<f64>() / n,
        min_state_observed: batch
            .records
            .iter()
            .map(|r| r.min_state)
            .fold(f64::INFINITY, f64::min),
    }
}

/// Nearest-rank 5%/50%/95% state quantiles per sample time across replicate
/// tables (all tables share the grid of the batch configuration).
pub fn ensemble_quantiles(tables: &[OutputTable]) -> Vec<QuantileRow> {
    let Some(first) = tables.first() else {
        return Vec::new();
    };

    first
        .times()
        .iter()
        .enumerate()
        .map(|(row, &t)| {
            let mut states: Vec<f64> = tables.iter().map(|table| table.state(row, 0)).collect();
            states.sort_by(|a, b| a.total_cmp(b));
            QuantileRow {
                t,
                q05: quantile(&states, 0.05),
                median: quantile(&states, 0.5),
                q95: quantile(&states, 0.95),
            }
        })
        .collect()
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    let idx = ((sorted.len() - 1) as f64 * q).round() as usize;
    sorted[idx]
}

pub fn trajectory_rows(table: &OutputTable) -> Vec<TrajectoryRow> {
    (0..table.nrows())
        .map(|row| TrajectoryRow {
            t: table.times()[row],
            disturbances: table.pulse_counts()[row],
            x: table.state(row, 0),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{ensemble_quantiles, run_replicates, summarize_batch, ReplicateConfig};

    fn small_batch() -> ReplicateConfig {
        ReplicateConfig {
            n_runs: 12,
            ..ReplicateConfig::default()
        }
    }

    #[test]
    fn batches_are_reproducible() {
        let config = small_batch();
        let a = run_replicates(&config).unwrap();
        let b = run_replicates(&config).unwrap();

        assert_eq!(a.tables, b.tables);
        assert_eq!(a.records[3].seed, b.records[3].seed);
        assert_eq!(a.records[3].final_state, b.records[3].final_state);
    }

    #[test]
    fn quantiles_are_ordered_per_sample_time() {
        let batch = run_replicates(&small_batch()).unwrap();
        let rows = ensemble_quantiles(&batch.tables);

        assert_eq!(rows.len(), batch.tables[0].nrows());
        for row in &rows {
            assert!(row.q05 <= row.median && row.median <= row.q95);
        }
    }

    #[test]
    fn summary_reflects_every_replicate() {
        let config = small_batch();
        let batch = run_replicates(&config).unwrap();
        let summary = summarize_batch(&config, &batch);

        assert_eq!(summary.n_runs, 12);
        assert_eq!(summary.nobs, config.base.nobs());
        assert!(summary.min_state_observed <= summary.mean_final_state);
    }

    #[test]
    fn empty_batch_is_rejected() {
        let config = ReplicateConfig {
            n_runs: 0,
            ..ReplicateConfig::default()
        };
        assert!(run_replicates(&config).is_err());
    }
}
