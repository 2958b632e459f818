use serde::{Deserialize, Serialize};

use crate::SimError;

/// Which right-hand side the community integrator advances between pulses.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DynamicsKind {
    /// Linear interaction dynamics `dx/dt = x' A`.
    Competition,
    /// Self-regulation plus dispersal through a shared pool.
    Dispersal { ifrac: f64 },
}

/// Single-population run configuration.
///
/// State is the standardized deviation from equilibrium; between pulses it
/// relaxes as `x(t) = x0 exp(-r t)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PopulationConfig {
    /// Recovery rate of the undisturbed dynamics
    pub r: f64,
    /// Mean (stochastic timing) or fixed disturbance interval
    pub f: f64,
    /// Mean disturbance magnitude
    pub d: f64,
    /// Disturbance magnitude spread
    pub d_sd: f64,
    /// Sampling interval of the observation grid
    pub sf: f64,
    /// Simulation horizon
    pub tmax: f64,
    /// Draw magnitudes from Normal(d, d_sd) instead of the constant d
    pub stochastic_magnitude: bool,
    /// Exponential inter-arrival times instead of the fixed interval f
    pub stochastic_timing: bool,
    /// Alternate the sign of successive constant-magnitude pulses.
    /// Ignored when `stochastic_magnitude` is set.
    pub oscillate: bool,
    /// Initial deviation from equilibrium
    pub x0: f64,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            r: 1.0,
            f: 1.0,
            d: -1.0,
            d_sd: 0.5,
            sf: 0.1,
            tmax: 100.0,
            stochastic_magnitude: true,
            stochastic_timing: true,
            oscillate: false,
            x0: 0.0,
        }
    }
}

impl PopulationConfig {
    pub fn validate(&self) -> Result<(), SimError> {
        validate_common(self.r, self.f, self.d_sd, self.sf, self.tmax)?;
        if !self.x0.is_finite() {
            return Err(SimError::InvalidConfig("x0 must be finite".to_string()));
        }
        Ok(())
    }

    /// Number of rows of the resulting output table.
    pub fn nobs(&self) -> usize {
        (self.tmax / self.sf).floor() as usize + 1
    }
}

/// Coupled-community run configuration (N interacting variables).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommunityConfig {
    /// Number of community variables
    pub n: usize,
    /// Self-regulation rate; the interaction-matrix diagonal is -r
    pub r: f64,
    /// Mean (stochastic timing) or fixed disturbance interval
    pub f: f64,
    /// Mean disturbance magnitude, replicated across variables
    pub d: f64,
    /// Per-variable disturbance magnitude spread
    pub d_sd: f64,
    /// Cross-variable disturbance covariance
    pub d_cov: f64,
    /// Sampling interval of the observation grid
    pub sf: f64,
    /// Simulation horizon
    pub tmax: f64,
    /// Draw correlated magnitude vectors instead of the constant d
    pub stochastic_magnitude: bool,
    /// Exponential inter-arrival times instead of the fixed interval f
    pub stochastic_timing: bool,
    /// Mean of the off-diagonal interaction coefficients
    pub amu: f64,
    /// Spread of the off-diagonal interaction coefficients
    pub asd: f64,
    /// Lower acceptance bound for off-diagonal coefficients
    pub amin: f64,
    /// Upper acceptance bound for off-diagonal coefficients
    pub amax: f64,
    /// Right-hand side integrated between pulses
    pub dynamics: DynamicsKind,
    /// Also return the realized interaction matrix and pulse magnitudes
    pub full_output: bool,
    /// Initial state; zeros when absent
    pub x0: Option<Vec<f64>>,
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            n: 5,
            r: 1.0,
            f: 1.0,
            d: -1.0,
            d_sd: 0.5,
            d_cov: 0.0,
            sf: 0.1,
            tmax: 100.0,
            stochastic_magnitude: true,
            stochastic_timing: true,
            amu: 0.0,
            asd: 0.1,
            amin: -0.5,
            amax: 0.5,
            dynamics: DynamicsKind::Competition,
            full_output: false,
            x0: None,
        }
    }
}

impl CommunityConfig {
    pub fn validate(&self) -> Result<(), SimError> {
        validate_common(self.r, self.f, self.d_sd, self.sf, self.tmax)?;
        if self.n == 0 {
            return Err(SimError::InvalidConfig("n must be > 0".to_string()));
        }
        if !(self.amu.is_finite() && self.asd.is_finite()) {
            return Err(SimError::InvalidConfig(
                "amu and asd must be finite".to_string(),
            ));
        }
        if self.asd < 0.0 {
            return Err(SimError::InvalidConfig("asd must be >= 0".to_string()));
        }
        if self.amin >= self.amax {
            return Err(SimError::InvalidConfig(
                "amin must be strictly less than amax".to_string(),
            ));
        }
        if !self.d_cov.is_finite() {
            return Err(SimError::InvalidConfig("d_cov must be finite".to_string()));
        }
        if let DynamicsKind::Dispersal { ifrac } = self.dynamics {
            if !(ifrac.is_finite() && ifrac >= 0.0) {
                return Err(SimError::InvalidConfig(
                    "ifrac must be finite and >= 0".to_string(),
                ));
            }
        }
        if let Some(x0) = &self.x0 {
            if x0.len() != self.n {
                return Err(SimError::InvalidConfig(format!(
                    "x0 length {} does not match n = {}",
                    x0.len(),
                    self.n
                )));
            }
            if x0.iter().any(|v| !v.is_finite()) {
                return Err(SimError::InvalidConfig("x0 must be finite".to_string()));
            }
        }
        Ok(())
    }

    /// Number of rows of the resulting output table.
    pub fn nobs(&self) -> usize {
        (self.tmax / self.sf).floor() as usize + 1
    }
}

fn validate_common(r: f64, f: f64, d_sd: f64, sf: f64, tmax: f64) -> Result<(), SimError> {
    if !(r.is_finite() && r >= 0.0) {
        return Err(SimError::InvalidConfig(
            "r must be finite and >= 0".to_string(),
        ));
    }
    if !(f.is_finite() && f > 0.0) {
        return Err(SimError::InvalidConfig(
            "f must be finite and > 0".to_string(),
        ));
    }
    if !(d_sd.is_finite() && d_sd >= 0.0) {
        return Err(SimError::InvalidConfig(
            "d_sd must be finite and >= 0".to_string(),
        ));
    }
    if !(sf.is_finite() && sf > 0.0) {
        return Err(SimError::InvalidConfig(
            "sf must be finite and > 0".to_string(),
        ));
    }
    if !(tmax.is_finite() && tmax > 0.0) {
        return Err(SimError::InvalidConfig(
            "tmax must be finite and > 0".to_string(),
        ));
    }
    if sf > tmax {
        return Err(SimError::InvalidConfig(
            "sf must not exceed tmax".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{CommunityConfig, PopulationConfig};

    #[test]
    fn default_population_config_is_valid() {
        PopulationConfig::default().validate().unwrap();
    }

    #[test]
    fn non_positive_horizon_is_rejected() {
        let config = PopulationConfig {
            tmax: 0.0,
            ..PopulationConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_coefficient_bounds_are_rejected() {
        let config = CommunityConfig {
            amin: 0.5,
            amax: -0.5,
            ..CommunityConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn mismatched_initial_state_is_rejected() {
        let config = CommunityConfig {
            n: 3,
            x0: Some(vec![0.0, 0.0]),
            ..CommunityConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn nobs_counts_the_seeded_row() {
        let config = PopulationConfig {
            sf: 1.0,
            tmax: 3.0,
            ..PopulationConfig::default()
        };
        assert_eq!(config.nobs(), 4);
    }
}
