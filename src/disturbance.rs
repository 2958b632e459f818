//! Disturbance timing and magnitude generation.
//!
//! The single-population engine draws pulses lazily through
//! [`PulseGenerator`]; the community engine materializes the whole schedule
//! and magnitude sequence up front via [`generate_schedule`] and
//! [`generate_magnitudes`].

use nalgebra::{DMatrix, DVector};
use rand::Rng;

use crate::config::PopulationConfig;
use crate::draws::{exponential_wait, normal_draw, CorrelatedNormal};
use crate::SimError;

/// Regeneration attempts before an under-covering schedule is fatal.
pub const SCHEDULE_RETRY_CAP: usize = 64;

/// On-demand pulse source for the single-population engine.
#[derive(Clone, Debug)]
pub struct PulseGenerator {
    interval: f64,
    magnitude: f64,
    spread: f64,
    stochastic_timing: bool,
    stochastic_magnitude: bool,
    oscillate: bool,
    emitted: usize,
}

impl PulseGenerator {
    pub fn from_config(config: &PopulationConfig) -> Self {
        Self {
            interval: config.f,
            magnitude: config.d,
            spread: config.d_sd,
            stochastic_timing: config.stochastic_timing,
            stochastic_magnitude: config.stochastic_magnitude,
            oscillate: config.oscillate,
            emitted: 0,
        }
    }

    /// Time of the next pulse after the current clock `tm`.
    pub fn next_time(&self, rng: &mut impl Rng, tm: f64) -> Result<f64, SimError> {
        if self.stochastic_timing {
            Ok(tm + exponential_wait(rng, self.interval)?)
        } else {
            Ok(tm + self.interval)
        }
    }

    /// Magnitude of the next pulse. Counts emitted pulses so that the
    /// oscillating mode alternates `+d, -d, +d, ...`.
    pub fn next_magnitude(&mut self, rng: &mut impl Rng) -> Result<f64, SimError> {
        self.emitted += 1;
        if self.stochastic_magnitude {
            return normal_draw(rng, self.magnitude, self.spread);
        }
        if self.oscillate && self.emitted % 2 == 0 {
            Ok(-self.magnitude)
        } else {
            Ok(self.magnitude)
        }
    }
}

/// Builds the full pulse-time sequence covering `[0, tmax]`.
///
/// Stochastic timing cumulates exponential waits; the draw count starts at
/// twice the expected number of pulses and grows by one multiple per retry
/// until the cumulative series overshoots `tmax`, then truncates. The fixed
/// case is simply `f, 2f, 3f, ...`.
pub fn generate_schedule(
    rng: &mut impl Rng,
    interval: f64,
    tmax: f64,
    stochastic: bool,
) -> Result<Vec<f64>, SimError> {
    if !stochastic {
        let times = (1..)
            .map(|k| k as f64 * interval)
            .take_while(|&t| t <= tmax)
            .collect();
        return Ok(times);
    }

    let expected = (tmax / interval).ceil().max(1.0) as usize;
    for attempt in 0..SCHEDULE_RETRY_CAP {
        let count = expected * (2 + attempt);
        let mut times = Vec::with_capacity(count);
        let mut cum = 0.0;
        for _ in 0..count {
            cum += exponential_wait(rng, interval)?;
            times.push(cum);
        }
        if cum > tmax {
            times.retain(|&t| t <= tmax);
            return Ok(times);
        }
    }
    Err(SimError::ScheduleUnderflow {
        attempts: SCHEDULE_RETRY_CAP,
    })
}

/// Draws one magnitude vector per scheduled pulse.
///
/// Stochastic magnitudes come from a multivariate normal with mean `d` in
/// every component, variance `d_sd^2`, and cross-variable covariance
/// `d_cov`; otherwise every pulse is the constant vector `d`.
pub fn generate_magnitudes(
    rng: &mut impl Rng,
    count: usize,
    dims: usize,
    d: f64,
    d_sd: f64,
    d_cov: f64,
    stochastic: bool,
) -> Result<Vec<DVector<f64>>, SimError> {
    if !stochastic {
        return Ok(vec![DVector::from_element(dims, d); count]);
    }

    let mean = DVector::from_element(dims, d);
    let cov = DMatrix::from_fn(dims, dims, |i, j| if i == j { d_sd * d_sd } else { d_cov });
    let mvn = CorrelatedNormal::new(mean, cov)?;
    Ok((0..count).map(|_| mvn.sample(rng)).collect())
}
