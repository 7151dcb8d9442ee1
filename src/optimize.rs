//! Derivative-free minimisation
//!
//! Wraps the `argmin` Nelder–Mead solver for any [`Objective`]. The kinetic
//! models have no cheap analytic gradient and are evaluated in a few
//! microseconds, so a simplex search is sufficient for parameter vectors of up
//! to seven elements.
//!
//! NaN objective values are reported to the solver as +inf, which keeps the
//! simplex out of regions where the model divides by zero.
//!
//! The evaluation count is argmin's `"cost_count"` plus the one check of the
//! initial guess.

use crate::errors::{Error, Result};
use argmin::core::{CostFunction, Executor, State, TerminationReason, TerminationStatus};
use argmin::solver::neldermead::NelderMead;
use log::debug;
use rsboron_core::cost::Objective;
use rsboron_core::errors::BoronError;
use rsboron_core::FloatValue;
use serde::{Deserialize, Serialize};

/// Initial simplex step for parameters that start at zero
const ZERO_STEP: FloatValue = 0.00025;

/// Stopping criteria and initial simplex size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NelderMeadOptions {
    /// default: 5000
    pub max_iterations: u64,
    /// Converged once the standard deviation of the objective over the
    /// simplex vertices falls below this
    /// default: 1e-14
    pub sd_tolerance: FloatValue,
    /// Relative size of the initial simplex
    /// default: 0.05
    pub initial_step: FloatValue,
}

impl Default for NelderMeadOptions {
    fn default() -> Self {
        Self {
            max_iterations: 5000,
            sd_tolerance: 1e-14,
            initial_step: 0.05,
        }
    }
}

impl NelderMeadOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(Error::Config("max_iterations must be at least 1".to_string()));
        }
        for (name, value) in [
            ("sd_tolerance", self.sd_tolerance),
            ("initial_step", self.initial_step),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::Config(format!(
                    "{name} must be finite and positive, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Starting simplex: `x0` plus one vertex per parameter, each scaling a
    /// single coordinate by `1 + initial_step`
    fn initial_simplex(&self, x0: &[FloatValue]) -> Vec<Vec<FloatValue>> {
        let mut simplex = Vec::with_capacity(x0.len() + 1);
        simplex.push(x0.to_vec());
        for i in 0..x0.len() {
            let mut vertex = x0.to_vec();
            vertex[i] = if vertex[i] != 0.0 {
                (1.0 + self.initial_step) * vertex[i]
            } else {
                ZERO_STEP
            };
            simplex.push(vertex);
        }
        simplex
    }
}

/// Outcome of a minimisation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// Best parameter vector found
    pub parameters: Vec<FloatValue>,
    /// Objective value at `parameters`
    pub cost: FloatValue,
    pub iterations: u64,
    pub evaluations: u64,
    /// False if the iteration budget ran out before the tolerance was met
    pub converged: bool,
}

/// Presents an [`Objective`] to argmin, mapping NaN to +inf
struct ObjectiveProblem<'a, O: Objective + ?Sized> {
    objective: &'a O,
}

impl<O: Objective + ?Sized> CostFunction for ObjectiveProblem<'_, O> {
    type Param = Vec<FloatValue>;
    type Output = FloatValue;

    fn cost(&self, param: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        let value = self.objective.evaluate(param)?;
        Ok(if value.is_nan() {
            FloatValue::INFINITY
        } else {
            value
        })
    }
}

/// Failures raised inside the objective keep their type
fn solver_error(error: argmin::core::Error) -> Error {
    match error.downcast::<BoronError>() {
        Ok(core) => Error::Core(core),
        Err(other) => Error::Optimization(other.to_string()),
    }
}

/// Minimise `objective` starting from `x0`
///
/// # Errors
///
/// - [`Error::Config`] if `options` are invalid
/// - [`Error::Optimization`] if `x0` has the wrong length or the objective
///   is not finite at `x0`
/// - [`Error::Core`] if any evaluation fails
pub fn minimize<O: Objective + ?Sized>(
    objective: &O,
    x0: &[FloatValue],
    options: &NelderMeadOptions,
) -> Result<OptimizationResult> {
    options.validate()?;
    let n = objective.n_parameters();
    if x0.len() != n {
        return Err(Error::Optimization(format!(
            "initial guess has {} parameters, the objective takes {n}",
            x0.len()
        )));
    }

    let start = objective.evaluate(x0)?;
    if !start.is_finite() {
        return Err(Error::Optimization(format!(
            "objective is not finite at the initial guess {x0:?}"
        )));
    }

    let solver: NelderMead<Vec<FloatValue>, FloatValue> =
        NelderMead::new(options.initial_simplex(x0))
            .with_sd_tolerance(options.sd_tolerance)
            .map_err(|e| Error::Config(e.to_string()))?;

    let result = Executor::new(ObjectiveProblem { objective }, solver)
        .configure(|state| state.max_iters(options.max_iterations))
        .run()
        .map_err(solver_error)?;

    let state = result.state();
    let parameters = state
        .get_best_param()
        .cloned()
        .ok_or_else(|| Error::Optimization("solver returned no parameters".to_string()))?;
    let cost = state.get_best_cost();
    let iterations = state.get_iter();
    let evaluations = state
        .get_func_counts()
        .get("cost_count")
        .copied()
        .unwrap_or(0)
        + 1;
    let converged = matches!(
        state.get_termination_status(),
        TerminationStatus::Terminated(TerminationReason::SolverConverged)
    );

    debug!(
        "Nelder-Mead finished after {} iterations ({} evaluations), cost {:.6e}, converged={}",
        iterations, evaluations, cost, converged
    );

    Ok(OptimizationResult {
        parameters,
        cost,
        iterations,
        evaluations,
        converged,
    })
}
