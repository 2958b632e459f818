//! Interaction-matrix construction for the community engine.

use nalgebra::DMatrix;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::SimError;

/// Resampling passes before out-of-bound coefficients are fatal.
pub const BOUND_RETRY_CAP: usize = 10_000;

/// Builds the N x N interaction matrix: diagonal fixed at `-r`, off-diagonal
/// entries drawn from `Normal(amu, asd)` and resampled entry-by-entry until
/// all of them lie within `[amin, amax]`.
///
/// Only violating entries are redrawn each pass, so accepted coefficients
/// keep their original draw. Bounds the distribution cannot reach trip the
/// retry cap instead of looping forever.
pub fn build_interaction_matrix(
    rng: &mut impl Rng,
    n: usize,
    r: f64,
    amu: f64,
    asd: f64,
    amin: f64,
    amax: f64,
) -> Result<DMatrix<f64>, SimError> {
    if amin >= amax {
        return Err(SimError::InvalidConfig(
            "amin must be strictly less than amax".to_string(),
        ));
    }
    let normal = Normal::new(amu, asd)
        .map_err(|_| SimError::InvalidConfig("asd must be finite and >= 0".to_string()))?;

    let mut a = DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            -r
        } else {
            normal.sample(rng)
        }
    });

    for _ in 0..BOUND_RETRY_CAP {
        let mut all_within = true;
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let v = a[(i, j)];
                if v < amin || v > amax {
                    a[(i, j)] = normal.sample(rng);
                    all_within = false;
                }
            }
        }
        if all_within {
            return Ok(a);
        }
    }
    Err(SimError::UnsatisfiableBound {
        attempts: BOUND_RETRY_CAP,
    })
}
