use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use stereo_core::Real;

/// Generic non-linear least squares problem with dense parameter/residual vectors.
///
/// Only the residuals are mandatory; the default Jacobian uses central
/// finite differences over the full residual vector. Problems with block
/// structure override it to perturb only the residual rows a parameter
/// touches.
pub trait NllsProblem {
    /// Number of parameters in the optimization vector.
    fn num_params(&self) -> usize;
    /// Number of residual rows in the problem.
    fn num_residuals(&self) -> usize;

    /// Residuals for the current parameters.
    fn residuals(&self, x: &DVector<Real>) -> DVector<Real>;

    /// Jacobian of [`NllsProblem::residuals`] at `x`.
    fn jacobian(&self, x: &DVector<Real>) -> DMatrix<Real> {
        let mut j = DMatrix::zeros(self.num_residuals(), x.len());
        let mut xp = x.clone();
        for k in 0..x.len() {
            let h = fd_step(x[k]);
            xp[k] = x[k] + h;
            let r_plus = self.residuals(&xp);
            xp[k] = x[k] - h;
            let r_minus = self.residuals(&xp);
            xp[k] = x[k];
            j.set_column(k, &((r_plus - r_minus) / (2.0 * h)));
        }
        j
    }
}

/// Central-difference step for a parameter of magnitude `|v|`.
pub(crate) fn fd_step(v: Real) -> Real {
    1e-6 * v.abs().max(1.0)
}

/// Stopping criteria shared by every solve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    /// Maximum number of solver iterations before termination.
    ///
    /// The LM backend follows the MINPACK convention and caps function
    /// evaluations at `max_iters * (n + 1)`.
    pub max_iters: usize,
    /// Relative tolerance on the objective (cost) reduction.
    pub ftol: Real,
    /// Orthogonality/gradient tolerance.
    pub gtol: Real,
    /// Relative tolerance on parameter updates.
    pub xtol: Real,
    /// Log the solver report at `info` level instead of `debug`.
    pub verbose: bool,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 100,
            ftol: 1e-12,
            gtol: 1e-12,
            xtol: 1e-12,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    pub iterations: usize,
    /// `0.5 * ‖r‖²` at the returned parameters.
    pub final_cost: Real,
    pub converged: bool,
}

/// Outcome flag carried by calibration results.
///
/// Hitting the iteration cap is not an error: the best parameters found so
/// far are returned together with [`SolveStatus::DidNotConverge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    Converged,
    DidNotConverge,
}

impl From<&SolveReport> for SolveStatus {
    fn from(report: &SolveReport) -> Self {
        if report.converged {
            SolveStatus::Converged
        } else {
            SolveStatus::DidNotConverge
        }
    }
}

pub trait NllsSolverBackend {
    fn solve<P: NllsProblem>(
        &self,
        problem: &P,
        x0: DVector<Real>,
        opts: &SolveOptions,
    ) -> (DVector<Real>, SolveReport);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quadratic;

    impl NllsProblem for Quadratic {
        fn num_params(&self) -> usize {
            2
        }
        fn num_residuals(&self) -> usize {
            2
        }
        fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
            DVector::from_vec(vec![x[0] * x[0], x[0] * x[1]])
        }
    }

    #[test]
    fn finite_difference_jacobian_matches_analytic() {
        let x = DVector::from_vec(vec![1.5, -2.0]);
        let j = Quadratic.jacobian(&x);
        assert!((j[(0, 0)] - 3.0).abs() < 1e-8);
        assert!(j[(0, 1)].abs() < 1e-8);
        assert!((j[(1, 0)] + 2.0).abs() < 1e-8);
        assert!((j[(1, 1)] - 1.5).abs() < 1e-8);
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: SolveOptions = serde_json::from_str(r#"{"max_iters": 7}"#).unwrap();
        assert_eq!(opts.max_iters, 7);
        assert_eq!(opts.ftol, SolveOptions::default().ftol);
    }
}
