//! Levenberg-Marquardt refinement on top of the `levenberg-marquardt` crate.
//!
//! Problems implement the small [`NllsProblem`] trait; an adapter exposes them
//! to the MINPACK-style solver and the outcome is folded into a
//! [`SolveReport`].

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use log::trace;
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};

/// Non-linear least-squares problem `min ½‖r(x)‖²`.
pub trait NllsProblem {
    fn num_params(&self) -> usize;
    fn num_residuals(&self) -> usize;
    fn residuals(&self, x: &DVector<f64>) -> DVector<f64>;
    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64>;
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    /// Patience: the solver stops after `max_iters · (n + 1)` evaluations.
    pub max_iters: usize,
    /// Relative tolerance on the cost reduction.
    pub ftol: f64,
    /// Orthogonality tolerance between residuals and Jacobian columns.
    pub gtol: f64,
    /// Relative tolerance on the step length.
    pub xtol: f64,
    /// Initial trust-region radius factor.
    pub stepbound: f64,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 100,
            ftol: 1e-10,
            gtol: 1e-10,
            xtol: 1e-10,
            stepbound: 100.0,
        }
    }
}

/// Why the solver stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Residuals vanished or became orthogonal to the Jacobian.
    Gradient,
    /// Step fell below `xtol`.
    SmallStep,
    /// Cost reduction fell below `ftol`.
    SmallCostReduction,
    /// Evaluation budget used up.
    MaxIterations,
    /// The solver gave up without meeting a tolerance.
    Stagnated,
    /// Residuals were not finite at the starting point.
    NonFinite,
}

impl Termination {
    /// Whether the stop is a regular convergence criterion.
    pub fn is_converged(self) -> bool {
        matches!(
            self,
            Termination::Gradient | Termination::SmallStep | Termination::SmallCostReduction
        )
    }
}

impl From<&TerminationReason> for Termination {
    fn from(reason: &TerminationReason) -> Self {
        match reason {
            TerminationReason::ResidualsZero | TerminationReason::Orthogonal => {
                Termination::Gradient
            }
            TerminationReason::Converged { xtol: true, .. } => Termination::SmallStep,
            TerminationReason::Converged { .. } => Termination::SmallCostReduction,
            TerminationReason::LostPatience => Termination::MaxIterations,
            _ => Termination::Stagnated,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    /// Residual evaluations spent by the solver.
    pub iterations: usize,
    /// `½‖r‖²` at the start.
    pub initial_cost: f64,
    /// `½‖r‖²` at the returned parameters.
    pub final_cost: f64,
    pub termination: Termination,
}

impl SolveReport {
    /// Whether the returned parameters are strictly better than the start.
    pub fn improved(&self) -> bool {
        self.final_cost < self.initial_cost
    }
}

/// Residual substituted for non-finite entries during a solve.
///
/// Trial steps that push points behind the camera then read as a large cost
/// increase and are rejected, instead of aborting the whole solve.
const REJECT_RESIDUAL: f64 = 1e6;

/// Presents an [`NllsProblem`] to the `levenberg-marquardt` solver.
struct LmAdapter<'a, P: NllsProblem> {
    problem: &'a P,
    params: DVector<f64>,
}

impl<P: NllsProblem> LeastSquaresProblem<f64, Dyn, Dyn> for LmAdapter<'_, P> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.copy_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let r = self.problem.residuals(&self.params);
        Some(r.map(|v| if v.is_finite() { v } else { REJECT_RESIDUAL }))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let j = self.problem.jacobian(&self.params);
        j.iter().all(|v| v.is_finite()).then_some(j)
    }
}

fn cost(r: &DVector<f64>) -> f64 {
    0.5 * r.norm_squared()
}

/// Minimise `problem` from `x0`.
///
/// The returned parameters are never worse than `x0`: if the solver ends on a
/// higher or non-finite cost, `x0` is returned with `initial_cost` as the
/// final cost.
pub fn levenberg_marquardt<P: NllsProblem>(
    problem: &P,
    x0: DVector<f64>,
    opts: &SolveOptions,
) -> (DVector<f64>, SolveReport) {
    let initial_cost = cost(&problem.residuals(&x0));
    if !initial_cost.is_finite() {
        let report = SolveReport {
            iterations: 0,
            initial_cost,
            final_cost: initial_cost,
            termination: Termination::NonFinite,
        };
        return (x0, report);
    }

    let adapter = LmAdapter {
        problem,
        params: x0.clone(),
    };
    let (adapter, lm_report) = LevenbergMarquardt::new()
        .with_ftol(opts.ftol)
        .with_xtol(opts.xtol)
        .with_gtol(opts.gtol)
        .with_stepbound(opts.stepbound)
        .with_patience(opts.max_iters.max(1))
        .minimize(adapter);

    let termination = Termination::from(&lm_report.termination);
    trace!(
        "lm: {:?} after {} evaluations, objective {:.6e}",
        lm_report.termination,
        lm_report.number_of_evaluations,
        lm_report.objective_function
    );

    let x = adapter.params;
    let final_cost = cost(&problem.residuals(&x));
    let (x, final_cost) = if final_cost.is_finite() && final_cost <= initial_cost {
        (x, final_cost)
    } else {
        (x0, initial_cost)
    };

    let report = SolveReport {
        iterations: lm_report.number_of_evaluations,
        initial_cost,
        final_cost,
        termination,
    };
    (x, report)
}

/// Central-difference step for parameter value `v`.
#[inline]
pub(crate) fn diff_step(v: f64) -> f64 {
    1e-6 * v.abs().max(1.0)
}
