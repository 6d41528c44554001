use ndarray::prelude::*;
use ndarray::NdFloat;
use num_traits::Float;

use crate::error::{OptimizeError, Result};
use crate::linesearch::WolfeSearch;
use crate::problem::Problem;
use crate::result::{check_convergence, ConvergenceReason, OptimizeOptions, OptimizeResult, Termination};
use crate::vecops::{cholesky_solve, lit, negate, norm, LinalgFloat};

/// Options for [`newton`]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NewtonOptions<A> {
    pub base: OptimizeOptions<A>,
    /// First diagonal shift tried on an indefinite Hessian (default `1e-8`)
    pub initial_tau: A,
    /// Growth of the shift between attempts (default `10`)
    pub tau_factor: A,
    /// Shifted factorizations tried before giving up (default `20`)
    pub max_regularize: usize,
    pub line_search: WolfeSearch<A>,
}

impl<A: NdFloat> Default for NewtonOptions<A> {
    fn default() -> Self {
        NewtonOptions::new(OptimizeOptions::default())
    }
}

impl<A: NdFloat> NewtonOptions<A> {
    pub fn new(base: OptimizeOptions<A>) -> Self {
        NewtonOptions {
            base,
            initial_tau: lit(1e-8),
            tau_factor: lit(10.),
            max_regularize: 20,
            line_search: WolfeSearch::default(),
        }
    }

    pub fn with_max_regularize(mut self, max_regularize: usize) -> Self {
        self.max_regularize = max_regularize;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.initial_tau > A::zero()) {
            return Err(OptimizeError::InvalidOption(format!(
                "Newton initial_tau must be positive, got {}",
                self.initial_tau
            )));
        }
        if !(self.tau_factor > A::one()) {
            return Err(OptimizeError::InvalidOption(format!(
                "Newton tau_factor must exceed 1, got {}",
                self.tau_factor
            )));
        }
        Ok(())
    }
}

/// Solve $`(H + \tau I)d = -g`$ with the smallest shift that factors
///
/// Tries $`\tau = 0`$ first, then `initial_tau` growing by `tau_factor`.
fn newton_direction<A: LinalgFloat>(h: &Array2<A>, g: &Array1<A>, opts: &NewtonOptions<A>) -> Option<Array1<A>> {
    let neg_g = negate(g);
    if let Some(d) = cholesky_solve(h, &neg_g) {
        return Some(d);
    }
    let mut tau = opts.initial_tau;
    for _ in 0..opts.max_regularize {
        let mut shifted = h.clone();
        shifted.diag_mut().mapv_inplace(|e| e + tau);
        if let Some(d) = cholesky_solve(&shifted, &neg_g) {
            log::debug!("newton: hessian shifted by {:e}", tau);
            return Some(d);
        }
        tau = tau * opts.tau_factor;
    }
    None
}

/// Damped Newton's method
///
/// Algorithm
/// ---------
/// ```math
/// \begin{aligned}
/// (\nabla^2 f(x_k) + \tau_k I)\,d_k &= -\nabla f(x_k) \\
/// x_{k+1} &= x_k + \alpha_k d_k \quad \text{(strong Wolfe)}
/// \end{aligned}
/// ```
/// where $`\tau_k = 0`$ whenever the Hessian is positive definite. Otherwise
/// the shift grows geometrically from `initial_tau` until the Cholesky
/// factorization succeeds; if `max_regularize` shifts all fail the run stops
/// with [`Termination::RegularizationFailed`]. Should the solution still not
/// be a descent direction, steepest descent is used for that iteration.
///
/// Without an analytic Hessian one is built by finite differences at a cost
/// of $`O(n^2)`$ objective evaluations per iteration.
pub fn newton<A: LinalgFloat>(problem: &Problem<'_, A>, x0: ArrayView1<A>, opts: &NewtonOptions<A>) -> OptimizeResult<A> {
    if let Err(err) = opts.validate() {
        return OptimizeResult::rejected(problem, x0, err);
    }
    let base = &opts.base;
    let start = problem.counts();
    let mut x = x0.to_owned();
    let mut fx = problem.value(x.view());
    let mut g = problem.gradient(x.view());

    if norm(&g) < base.grad_tol {
        return OptimizeResult::new(x, fx, Some(g), 0, problem.calls_since(start), ConvergenceReason::Gradient.into());
    }

    for iteration in 1..=base.max_iterations {
        let h = problem.hessian(x.view());
        let mut d = match newton_direction(&h, &g, opts) {
            Some(d) => d,
            None => {
                log::warn!("newton: hessian still indefinite after {} shifts", opts.max_regularize);
                return OptimizeResult::new(
                    x,
                    fx,
                    Some(g),
                    iteration,
                    problem.calls_since(start),
                    Termination::RegularizationFailed,
                );
            }
        };
        if !(d.dot(&g) < A::zero()) {
            log::debug!("newton: not a descent direction at iteration {}, using -g", iteration);
            d = negate(&g);
        }

        let ls = opts.line_search.search(problem, x.view(), d.view(), fx, g.view());
        if !ls.success {
            log::warn!("newton: line search failed at iteration {}", iteration);
            return OptimizeResult::new(
                x,
                fx,
                Some(g),
                iteration,
                problem.calls_since(start),
                ConvergenceReason::LineSearchFailed.into(),
            );
        }

        x.scaled_add(ls.alpha, &d);
        let step_norm = Float::abs(ls.alpha) * norm(&d);
        let func_change = Float::abs(fx - ls.f_new);
        fx = ls.f_new;
        g = match ls.g_new {
            Some(g_new) => g_new,
            None => problem.gradient(x.view()),
        };

        let grad_norm = norm(&g);
        log::trace!("newton: iter {} f = {:e} |g| = {:e}", iteration, fx, grad_norm);
        if let Some(reason) = check_convergence(grad_norm, step_norm, func_change, iteration, base) {
            return OptimizeResult::new(x, fx, Some(g), iteration, problem.calls_since(start), reason.into());
        }
    }

    OptimizeResult::new(
        x,
        fx,
        Some(g),
        0,
        problem.calls_since(start),
        ConvergenceReason::MaxIterations.into(),
    )
}
