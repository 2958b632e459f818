//! Sampled simulation output.

use serde::Serialize;

/// One row per sample time: the time itself, how many disturbance pulses
/// landed in the inter-sample interval ending at that row, and one state
/// value per variable.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OutputTable {
    times: Vec<f64>,
    pulses: Vec<u32>,
    states: Vec<Vec<f64>>,
}

impl OutputTable {
    pub fn with_capacity(nobs: usize) -> Self {
        Self {
            times: Vec::with_capacity(nobs),
            pulses: Vec::with_capacity(nobs),
            states: Vec::with_capacity(nobs),
        }
    }

    pub(crate) fn push_row(&mut self, time: f64, pulses: u32, state: &[f64]) {
        self.times.push(time);
        self.pulses.push(pulses);
        self.states.push(state.to_vec());
    }

    pub fn nrows(&self) -> usize {
        self.times.len()
    }

    pub fn nvars(&self) -> usize {
        self.states.first().map_or(0, Vec::len)
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn pulse_counts(&self) -> &[u32] {
        &self.pulses
    }

    /// Total number of pulses attributed across the whole run.
    pub fn total_pulses(&self) -> u64 {
        self.pulses.iter().map(|&c| u64::from(c)).sum()
    }

    pub fn state(&self, row: usize, var: usize) -> f64 {
        self.states[row][var]
    }

    pub fn state_row(&self, row: usize) -> &[f64] {
        &self.states[row]
    }

    /// Per-variable state column, for ensemble aggregation.
    pub fn state_column(&self, var: usize) -> Vec<f64> {
        self.states.iter().map(|row| row[var]).collect()
    }

    /// CSV header: `time, disturbances, x1, .., xN`.
    pub fn csv_header(&self) -> Vec<String> {
        let mut header = vec!["time".to_string(), "disturbances".to_string()];
        for v in 0..self.nvars() {
            header.push(format!("x{}", v + 1));
        }
        header
    }

    /// CSV body records matching [`csv_header`](Self::csv_header).
    pub fn csv_records(&self) -> impl Iterator<Item = Vec<String>> + '_ {
        (0..self.nrows()).map(|row| {
            let mut record = vec![self.times[row].to_string(), self.pulses[row].to_string()];
            record.extend(self.states[row].iter().map(f64::to_string));
            record
        })
    }
}
