use crate::{NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};
use stereo_core::Real;

struct LmWrapper<'a, P: NllsProblem> {
    problem: &'a P,
    params: DVector<Real>,
}

impl<P: NllsProblem> LeastSquaresProblem<Real, Dyn, Dyn> for LmWrapper<'_, P> {
    type ResidualStorage = Owned<Real, Dyn>;
    type JacobianStorage = Owned<Real, Dyn, Dyn>;
    type ParameterStorage = Owned<Real, Dyn>;

    fn set_params(&mut self, x: &DVector<Real>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<Real> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<Real>> {
        let r = self.problem.residuals(&self.params);
        r.iter().all(|v| v.is_finite()).then_some(r)
    }

    fn jacobian(&self) -> Option<DMatrix<Real>> {
        let j = self.problem.jacobian(&self.params);
        j.iter().all(|v| v.is_finite()).then_some(j)
    }
}

/// Levenberg–Marquardt backend (MINPACK port from the `levenberg-marquardt` crate).
#[derive(Debug, Default, Clone)]
pub struct LmBackend;

impl NllsSolverBackend for LmBackend {
    fn solve<P: NllsProblem>(
        &self,
        problem: &P,
        x0: DVector<Real>,
        opts: &SolveOptions,
    ) -> (DVector<Real>, SolveReport) {
        let lm = LevenbergMarquardt::new()
            .with_ftol(opts.ftol)
            .with_xtol(opts.xtol)
            .with_gtol(opts.gtol)
            .with_patience(opts.max_iters.max(1));

        let wrapper = LmWrapper {
            problem,
            params: x0,
        };

        let (wrapper, report) = lm.minimize(wrapper);
        // At machine precision no further reduction is possible; the
        // parameters are as good as the tolerances allow.
        let converged = report.termination.was_successful()
            || matches!(
                report.termination,
                TerminationReason::NoImprovementPossible(_)
            );

        let summary = SolveReport {
            iterations: report.number_of_evaluations,
            final_cost: report.objective_function,
            converged,
        };
        if opts.verbose {
            log::info!("lm: {:?} after {} evaluations", report.termination, summary.iterations);
        } else {
            log::debug!("lm: {:?} after {} evaluations", report.termination, summary.iterations);
        }
        if !converged {
            log::warn!("lm did not converge: {:?}", report.termination);
        }

        (wrapper.params(), summary)
    }
}
