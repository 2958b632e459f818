//! Stochastic primitives for the simulation engines.
//!
//! Every draw goes through a caller-supplied `Rng`, so seeding one
//! `ChaCha8Rng`/`StdRng` per run makes the whole draw stream reproducible.

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use rand::Rng;
use rand_distr::{Distribution, Exp, Normal, StandardNormal};

use crate::SimError;

/// Exponential waiting time with the given mean.
pub fn exponential_wait(rng: &mut impl Rng, mean: f64) -> Result<f64, SimError> {
    let exp = Exp::new(1.0 / mean)
        .map_err(|_| SimError::InvalidConfig("exponential mean must be > 0".to_string()))?;
    Ok(exp.sample(rng))
}

/// Univariate normal draw. A zero spread collapses to the mean.
pub fn normal_draw(rng: &mut impl Rng, mean: f64, sd: f64) -> Result<f64, SimError> {
    let normal = Normal::new(mean, sd)
        .map_err(|_| SimError::InvalidConfig("normal spread must be finite and >= 0".to_string()))?;
    Ok(normal.sample(rng))
}

/// Correlated multivariate normal sampler.
///
/// The covariance is factored once; each sample costs one standard-normal
/// vector and a triangular multiply. The all-zero covariance is accepted as
/// the degenerate point mass at the mean.
pub struct CorrelatedNormal {
    mean: DVector<f64>,
    chol: Option<Cholesky<f64, Dyn>>,
}

impl CorrelatedNormal {
    pub fn new(mean: DVector<f64>, cov: DMatrix<f64>) -> Result<Self, SimError> {
        if cov.nrows() != mean.len() || cov.ncols() != mean.len() {
            return Err(SimError::InvalidConfig(format!(
                "covariance shape {}x{} does not match mean length {}",
                cov.nrows(),
                cov.ncols(),
                mean.len()
            )));
        }
        if cov.iter().all(|&v| v == 0.0) {
            return Ok(Self { mean, chol: None });
        }
        let chol = cov.cholesky().ok_or_else(|| {
            SimError::InvalidConfig(
                "disturbance covariance is not positive definite".to_string(),
            )
        })?;
        Ok(Self {
            mean,
            chol: Some(chol),
        })
    }

    pub fn sample(&self, rng: &mut impl Rng) -> DVector<f64> {
        let Some(chol) = &self.chol else {
            return self.mean.clone();
        };
        let z = DVector::from_fn(self.mean.len(), |_, _| rng.sample(StandardNormal));
        &self.mean + chol.l() * z
    }
}
