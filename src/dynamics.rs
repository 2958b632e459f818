//! Continuous dynamics between disturbance pulses.
//!
//! The single-population engine uses the closed-form relaxation law; the
//! community engine integrates a `VectorField` with an adaptive Cash-Karp
//! Runge-Kutta 4(5) stepper.

use nalgebra::{DMatrix, DVector};

use crate::config::DynamicsKind;
use crate::SimError;

/// Carrying capacity of the dispersal pool, fixed by the model.
const DISPERSAL_CAPACITY: f64 = 1.0;

const RTOL: f64 = 1e-8;
const ATOL: f64 = 1e-10;
const MAX_STEPS: usize = 200_000;

/// Exact solution of `dx/dt = -r x` over a span of length `dt`.
pub fn decay_to(x0: f64, r: f64, dt: f64) -> f64 {
    x0 * (-r * dt).exp()
}

/// Right-hand side of the community dynamics.
///
/// Implementations beyond the two built-ins can be passed straight to
/// [`integrate`]; the scheduler only sees this trait.
pub trait VectorField {
    fn derivative(&self, t: f64, x: &DVector<f64>) -> DVector<f64>;
}

/// Linear interaction dynamics `dx/dt = x' A`.
pub struct Competition {
    a: DMatrix<f64>,
}

impl Competition {
    pub fn new(a: DMatrix<f64>) -> Self {
        Self { a }
    }
}

impl VectorField for Competition {
    fn derivative(&self, _t: f64, x: &DVector<f64>) -> DVector<f64> {
        // Row-vector convention: component i receives sum_j x_j A(j, i).
        self.a.tr_mul(x)
    }
}

/// Self-regulation with emigration loss and immigration from a shared pool.
///
/// `dx_i/dt = A_ii x_i - max(ifrac (x_i + K), 0) + ifrac mean_j max(x_j + K, 0)`
/// with K = 1. Negative-biomass patches contribute nothing to the pool.
pub struct Dispersal {
    a: DMatrix<f64>,
    ifrac: f64,
}

impl Dispersal {
    pub fn new(a: DMatrix<f64>, ifrac: f64) -> Self {
        Self { a, ifrac }
    }
}

impl VectorField for Dispersal {
    fn derivative(&self, _t: f64, x: &DVector<f64>) -> DVector<f64> {
        let k = DISPERSAL_CAPACITY;
        let pool = x.iter().map(|&xi| (xi + k).max(0.0)).sum::<f64>() / x.len() as f64;
        DVector::from_fn(x.len(), |i, _| {
            let xi = x[i];
            self.a[(i, i)] * xi - (self.ifrac * (xi + k)).max(0.0) + self.ifrac * pool
        })
    }
}

/// Builds the right-hand side selected by the configuration tag.
pub fn build_vector_field(kind: &DynamicsKind, a: DMatrix<f64>) -> Box<dyn VectorField> {
    match kind {
        DynamicsKind::Competition => Box::new(Competition::new(a)),
        DynamicsKind::Dispersal { ifrac } => Box::new(Dispersal::new(a, *ifrac)),
    }
}

// Cash-Karp tableau.
const C: [f64; 6] = [0.0, 0.2, 0.3, 0.6, 1.0, 0.875];
const A21: f64 = 0.2;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 0.3;
const A42: f64 = -0.9;
const A43: f64 = 1.2;
const A51: f64 = -11.0 / 54.0;
const A52: f64 = 2.5;
const A53: f64 = -70.0 / 27.0;
const A54: f64 = 35.0 / 27.0;
const A61: f64 = 1631.0 / 55296.0;
const A62: f64 = 175.0 / 512.0;
const A63: f64 = 575.0 / 13824.0;
const A64: f64 = 44275.0 / 110592.0;
const A65: f64 = 253.0 / 4096.0;
const B5: [f64; 6] = [
    37.0 / 378.0,
    0.0,
    250.0 / 621.0,
    125.0 / 594.0,
    0.0,
    512.0 / 1771.0,
];
const B4: [f64; 6] = [
    2825.0 / 27648.0,
    0.0,
    18575.0 / 48384.0,
    13525.0 / 55296.0,
    277.0 / 14336.0,
    0.25,
];

/// Integrates `field` from `t0` to `t1` starting at `x0`.
///
/// Step sizes adapt to the local truncation error; a step that underflows
/// the representable span, a non-finite state, or exhausting the step budget
/// all surface as [`SimError::Integration`].
pub fn integrate(
    field: &dyn VectorField,
    t0: f64,
    t1: f64,
    x0: &DVector<f64>,
) -> Result<DVector<f64>, SimError> {
    let span = t1 - t0;
    if span <= 0.0 {
        return Ok(x0.clone());
    }

    let mut t = t0;
    let mut x = x0.clone();
    let mut h = span;
    let h_min = span * 1e-12;

    for _ in 0..MAX_STEPS {
        if t >= t1 {
            return Ok(x);
        }
        h = h.min(t1 - t);

        let k1 = field.derivative(t, &x);
        let k2 = field.derivative(t + C[1] * h, &(&x + &k1 * (A21 * h)));
        let k3 = field.derivative(t + C[2] * h, &(&x + &k1 * (A31 * h) + &k2 * (A32 * h)));
        let k4 = field.derivative(
            t + C[3] * h,
            &(&x + &k1 * (A41 * h) + &k2 * (A42 * h) + &k3 * (A43 * h)),
        );
        let k5 = field.derivative(
            t + C[4] * h,
            &(&x + &k1 * (A51 * h) + &k2 * (A52 * h) + &k3 * (A53 * h) + &k4 * (A54 * h)),
        );
        let k6 = field.derivative(
            t + C[5] * h,
            &(&x
                + &k1 * (A61 * h)
                + &k2 * (A62 * h)
                + &k3 * (A63 * h)
                + &k4 * (A64 * h)
                + &k5 * (A65 * h)),
        );

        let x5 = &x
            + &k1 * (B5[0] * h)
            + &k3 * (B5[2] * h)
            + &k4 * (B5[3] * h)
            + &k6 * (B5[5] * h);
        let x4 = &x
            + &k1 * (B4[0] * h)
            + &k3 * (B4[2] * h)
            + &k4 * (B4[3] * h)
            + &k5 * (B4[4] * h)
            + &k6 * (B4[5] * h);

        if x5.iter().any(|v| !v.is_finite()) {
            return Err(SimError::Integration {
                t0,
                t1,
                detail: format!("state became non-finite near t = {t}"),
            });
        }

        let mut err: f64 = 0.0;
        for i in 0..x.len() {
            let scale = ATOL + RTOL * x[i].abs().max(x5[i].abs());
            err = err.max((x5[i] - x4[i]).abs() / scale);
        }

        if err <= 1.0 {
            t += h;
            x = x5;
            h *= (0.9 * err.max(1e-10).powf(-0.2)).min(5.0);
        } else {
            h *= (0.9 * err.powf(-0.25)).max(0.2);
        }

        if h < h_min {
            return Err(SimError::Integration {
                t0,
                t1,
                detail: format!("step size underflow near t = {t}"),
            });
        }
    }

    Err(SimError::Integration {
        t0,
        t1,
        detail: format!("step budget of {MAX_STEPS} exhausted"),
    })
}

#[cfg(test)]
mod tests {
    use nalgebra::{DMatrix, DVector};

    use super::{build_vector_field, decay_to, integrate, Dispersal, VectorField};
    use crate::config::DynamicsKind;

    #[test]
    fn closed_form_matches_the_decay_law() {
        let x = decay_to(2.0, 0.5, 3.0);
        assert!((x - 2.0 * (-1.5_f64).exp()).abs() < 1e-15);
    }

    #[test]
    fn linear_decay_integrates_to_the_closed_form() {
        let a = DMatrix::from_element(1, 1, -0.7);
        let field = build_vector_field(&DynamicsKind::Competition, a);
        let x0 = DVector::from_element(1, 3.0);

        let x = integrate(field.as_ref(), 0.0, 4.0, &x0).unwrap();
        assert!((x[0] - decay_to(3.0, 0.7, 4.0)).abs() < 1e-6);
    }

    #[test]
    fn competition_uses_the_row_vector_convention() {
        // A = [[-1, 0.3], [0.1, -1]]: component 0 receives 0.1 from x_1.
        let a = DMatrix::from_row_slice(2, 2, &[-1.0, 0.3, 0.1, -1.0]);
        let field = build_vector_field(&DynamicsKind::Competition, a);
        let dx = field.derivative(0.0, &DVector::from_vec(vec![0.0, 1.0]));
        assert!((dx[0] - 0.1).abs() < 1e-15);
        assert!((dx[1] + 1.0).abs() < 1e-15);
    }

    #[test]
    fn dispersal_pool_ignores_negative_biomass() {
        let a = DMatrix::from_diagonal(&DVector::from_element(2, -1.0));
        let field = Dispersal::new(a, 0.4);

        // Patch 0 sits below -K, so only patch 1 feeds the pool.
        let x = DVector::from_vec(vec![-1.5, 0.5]);
        let dx = field.derivative(0.0, &x);
        let pool = 0.4 * (0.5 + 1.0) / 2.0;
        assert!((dx[0] - (1.5 + pool)).abs() < 1e-12);
        assert!((dx[1] - (-0.5 - 0.4 * 1.5 + pool)).abs() < 1e-12);
    }

    #[test]
    fn zero_span_returns_the_initial_state() {
        let a = DMatrix::from_element(1, 1, -1.0);
        let field = build_vector_field(&DynamicsKind::Competition, a);
        let x0 = DVector::from_element(1, 2.0);
        assert_eq!(integrate(field.as_ref(), 1.0, 1.0, &x0).unwrap(), x0);
    }

    #[test]
    fn non_finite_derivative_surfaces_as_integration_failure() {
        struct Diverging;
        impl VectorField for Diverging {
            fn derivative(&self, _t: f64, x: &DVector<f64>) -> DVector<f64> {
                DVector::from_element(x.len(), f64::NAN)
            }
        }

        let err = integrate(&Diverging, 0.0, 1.0, &DVector::from_element(1, 1.0));
        assert!(err.is_err());
    }
}
