//! Options, results and the convergence policy shared by every minimizer

use std::fmt;

use ndarray::prelude::*;
use ndarray::NdFloat;

use crate::error::OptimizeError;
use crate::problem::Problem;
use crate::vecops::lit;

/// Stopping thresholds common to all algorithms
///
/// Algorithm specific options embed this as their `base` field.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OptimizeOptions<A> {
    /// Gradient norm threshold (default `1e-8`)
    pub grad_tol: A,
    /// Step norm threshold (default `1e-8`)
    pub step_tol: A,
    /// Threshold on $`|f_k - f_{k+1}|`$ (default `1e-12`)
    pub func_tol: A,
    /// Iteration cap (default `1000`)
    pub max_iterations: usize,
}

impl<A: NdFloat> Default for OptimizeOptions<A> {
    fn default() -> Self {
        OptimizeOptions {
            grad_tol: lit(1e-8),
            step_tol: lit(1e-8),
            func_tol: lit(1e-12),
            max_iterations: 1000,
        }
    }
}

impl<A: NdFloat> OptimizeOptions<A> {
    pub fn with_grad_tol(mut self, tol: A) -> Self {
        self.grad_tol = tol;
        self
    }

    pub fn with_step_tol(mut self, tol: A) -> Self {
        self.step_tol = tol;
        self
    }

    pub fn with_func_tol(mut self, tol: A) -> Self {
        self.func_tol = tol;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// Why an iteration loop stopped
///
/// `Gradient`, `Step` and `Function` are convergence; `MaxIterations` and
/// `LineSearchFailed` are not. Only [`check_convergence`] yields the first
/// four, and `LineSearchFailed` is reported when a line search gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConvergenceReason {
    Gradient,
    Step,
    Function,
    MaxIterations,
    LineSearchFailed,
}

/// Is `reason` a true convergence?
pub fn is_converged(reason: ConvergenceReason) -> bool {
    matches!(
        reason,
        ConvergenceReason::Gradient | ConvergenceReason::Step | ConvergenceReason::Function
    )
}

/// Fixed human readable text for `reason`
pub fn convergence_message(reason: ConvergenceReason) -> &'static str {
    match reason {
        ConvergenceReason::Gradient => "Converged: gradient norm below tolerance",
        ConvergenceReason::Step => "Converged: step size below tolerance",
        ConvergenceReason::Function => "Converged: function change below tolerance",
        ConvergenceReason::MaxIterations => "Stopped: reached maximum iterations",
        ConvergenceReason::LineSearchFailed => "Stopped: line search failed",
    }
}

impl ConvergenceReason {
    pub fn is_converged(self) -> bool {
        is_converged(self)
    }
}

impl fmt::Display for ConvergenceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(convergence_message(*self))
    }
}

/// Check the stopping criteria in priority order
///
/// gradient, then step, then function change, then iteration count. The
/// first satisfied criterion wins, so a point meeting both the gradient and
/// step thresholds always reports `Gradient`.
pub fn check_convergence<A: NdFloat>(
    grad_norm: A,
    step_norm: A,
    func_change: A,
    iteration: usize,
    opts: &OptimizeOptions<A>,
) -> Option<ConvergenceReason> {
    if grad_norm < opts.grad_tol {
        Some(ConvergenceReason::Gradient)
    } else if step_norm < opts.step_tol {
        Some(ConvergenceReason::Step)
    } else if func_change < opts.func_tol {
        Some(ConvergenceReason::Function)
    } else if iteration >= opts.max_iterations {
        Some(ConvergenceReason::MaxIterations)
    } else {
        None
    }
}

/// How a run ended, including terminals specific to some algorithms
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Termination {
    /// One of the shared criteria
    Criterion(ConvergenceReason),
    /// Newton: Hessian stayed indefinite after every diagonal shift
    RegularizationFailed,
    /// Trust region radius shrank below `1e-15`
    RadiusCollapsed,
    /// Box wrapper: projected gradient below the outer tolerance
    ProjectedGradient,
    /// Box wrapper: some `lower[i] >= upper[i]`
    InvalidBounds,
    /// Simulated annealing: every scheduled proposal was made
    ScheduleCompleted,
    /// Options failed validation
    InvalidOptions(String),
}

impl Termination {
    pub fn is_converged(&self) -> bool {
        match self {
            Termination::Criterion(reason) => reason.is_converged(),
            Termination::ProjectedGradient | Termination::ScheduleCompleted => true,
            _ => false,
        }
    }
}

impl From<ConvergenceReason> for Termination {
    fn from(reason: ConvergenceReason) -> Self {
        Termination::Criterion(reason)
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Criterion(reason) => fmt::Display::fmt(reason, f),
            Termination::RegularizationFailed => f.write_str("Stopped: Hessian regularization failed"),
            Termination::RadiusCollapsed => f.write_str("Stopped: trust region radius below minimum"),
            Termination::ProjectedGradient => {
                f.write_str("Converged: projected gradient norm below tolerance")
            }
            Termination::ScheduleCompleted => f.write_str("Completed: annealing schedule finished"),
            Termination::InvalidBounds => {
                f.write_str("Invalid bounds: lower must be strictly less than upper")
            }
            Termination::InvalidOptions(why) => write!(f, "Invalid options: {}", why),
        }
    }
}

/// Outcome of a minimization run
///
/// `x`, `fun` and `gradient` always describe the same point.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct OptimizeResult<A> {
    pub x: Array1<A>,
    pub fun: A,
    /// `None` for derivative-free methods
    pub gradient: Option<Array1<A>>,
    pub iterations: usize,
    pub function_calls: usize,
    pub gradient_calls: usize,
    pub converged: bool,
    pub message: String,
    pub termination: Termination,
}

impl<A: NdFloat> OptimizeResult<A> {
    pub(crate) fn new(
        x: Array1<A>,
        fun: A,
        gradient: Option<Array1<A>>,
        iterations: usize,
        calls: (usize, usize),
        termination: Termination,
    ) -> Self {
        OptimizeResult {
            x,
            fun,
            gradient,
            iterations,
            function_calls: calls.0,
            gradient_calls: calls.1,
            converged: termination.is_converged(),
            message: termination.to_string(),
            termination,
        }
    }

    /// Result of a run refused because its options failed validation
    ///
    /// Evaluates the objective once at `x0` so that `fun` describes `x`.
    pub(crate) fn rejected(problem: &Problem<'_, A>, x0: ArrayView1<A>, err: OptimizeError) -> Self {
        log::warn!("refusing to run: {}", err);
        let start = problem.counts();
        let fun = problem.value(x0);
        let why = match err {
            OptimizeError::InvalidOption(why) => why,
            other => other.to_string(),
        };
        OptimizeResult::new(
            x0.to_owned(),
            fun,
            None,
            0,
            problem.calls_since(start),
            Termination::InvalidOptions(why),
        )
    }

    /// The shared criterion that ended the run, if any
    pub fn reason(&self) -> Option<ConvergenceReason> {
        match self.termination {
            Termination::Criterion(reason) => Some(reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = OptimizeOptions::<f64>::default();
        assert_eq!(opts.grad_tol, 1e-8);
        assert_eq!(opts.step_tol, 1e-8);
        assert_eq!(opts.func_tol, 1e-12);
        assert_eq!(opts.max_iterations, 1000);

        let opts = opts.with_grad_tol(1e-4).with_max_iterations(5);
        assert_eq!(opts.grad_tol, 1e-4);
        assert_eq!(opts.step_tol, 1e-8);
        assert_eq!(opts.max_iterations, 5);
    }

    #[test]
    fn each_criterion() {
        let opts = OptimizeOptions::default();
        assert_eq!(
            check_convergence(1e-9, 0.1, 0.1, 5, &opts),
            Some(ConvergenceReason::Gradient)
        );
        assert_eq!(
            check_convergence(0.1, 1e-9, 0.1, 5, &opts),
            Some(ConvergenceReason::Step)
        );
        assert_eq!(
            check_convergence(0.1, 0.1, 1e-13, 5, &opts),
            Some(ConvergenceReason::Function)
        );
        assert_eq!(
            check_convergence(0.1, 0.1, 0.1, 1000, &opts),
            Some(ConvergenceReason::MaxIterations)
        );
        assert_eq!(check_convergence(0.1, 0.1, 0.1, 5, &opts), None);
    }

    #[test]
    fn priority_order() {
        let opts = OptimizeOptions::default();
        // everything met at once
        assert_eq!(
            check_convergence(1e-9, 1e-9, 1e-13, 1000, &opts),
            Some(ConvergenceReason::Gradient)
        );
        assert_eq!(
            check_convergence(1e-9, 1e-9, 0.1, 5, &opts),
            Some(ConvergenceReason::Gradient)
        );
        assert_eq!(
            check_convergence(0.1, 1e-9, 1e-13, 5, &opts),
            Some(ConvergenceReason::Step)
        );
        assert_eq!(
            check_convergence(0.1, 0.1, 1e-13, 1000, &opts),
            Some(ConvergenceReason::Function)
        );
    }

    #[test]
    fn converged_taxonomy() {
        assert!(is_converged(ConvergenceReason::Gradient));
        assert!(is_converged(ConvergenceReason::Step));
        assert!(is_converged(ConvergenceReason::Function));
        assert!(!is_converged(ConvergenceReason::MaxIterations));
        assert!(!is_converged(ConvergenceReason::LineSearchFailed));

        assert!(Termination::ProjectedGradient.is_converged());
        assert!(!Termination::RegularizationFailed.is_converged());
        assert!(!Termination::RadiusCollapsed.is_converged());
        assert!(!Termination::InvalidBounds.is_converged());
    }

    #[test]
    fn messages_are_distinct() {
        let all = [
            Termination::from(ConvergenceReason::Gradient),
            ConvergenceReason::Step.into(),
            ConvergenceReason::Function.into(),
            ConvergenceReason::MaxIterations.into(),
            ConvergenceReason::LineSearchFailed.into(),
            Termination::RegularizationFailed,
            Termination::RadiusCollapsed,
            Termination::ProjectedGradient,
            Termination::InvalidBounds,
        ];
        let msgs: Vec<String> = all.iter().map(ToString::to_string).collect();
        for (i, a) in msgs.iter().enumerate() {
            for b in &msgs[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert!(msgs[3].contains("maximum iterations"));
        assert!(msgs[4].contains("line search"));
    }

    #[test]
    fn result_is_consistent() {
        let r = OptimizeResult::new(
            array![1.0],
            2.0,
            None,
            3,
            (4, 0),
            ConvergenceReason::MaxIterations.into(),
        );
        assert!(!r.converged);
        assert_eq!(r.message, "Stopped: reached maximum iterations");
        assert_eq!(r.reason(), Some(ConvergenceReason::MaxIterations));
        assert_eq!(r.function_calls, 4);
    }

    #[test]
    fn rejected_run_reports_options() {
        let f = |x: ArrayView1<f64>| x.sum();
        let p = Problem::new(&f);
        let err = OptimizeError::InvalidOption("memory must be positive".into());
        let r = OptimizeResult::rejected(&p, array![1.0, 2.0].view(), err);
        assert!(!r.converged);
        assert_eq!(r.fun, 3.0);
        assert_eq!(r.iterations, 0);
        assert_eq!(r.message, "Invalid options: memory must be positive");
    }
}
