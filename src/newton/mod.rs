//! Second Order Methods
//!
//! Methods built on a local quadratic model of the objective,
//! ```math
//! m_k(p) = f(x_k) + \nabla f(x_k)^Tp + \tfrac{1}{2}p^T\nabla^2 f(x_k)p
//! ```
//! [`newton`] minimizes the model outright and safeguards the step with a
//! line search. [`newton_trust_region`] and [`krylov_trust_region`] minimize
//! it inside a ball of radius $`\delta`$ and adapt $`\delta`$ by comparing
//! the decrease the model promised with the decrease actually achieved.
//! The Krylov variant never forms the Hessian, only products with it.

mod damped;
pub use damped::*;
mod trust_region;
pub use trust_region::*;
mod krylov;
pub use krylov::*;

use ndarray::prelude::*;
use ndarray::NdFloat;

use crate::problem::Problem;
use crate::result::{check_convergence, ConvergenceReason, OptimizeOptions, OptimizeResult, Termination};
use crate::vecops::{lit, norm};

/// Trust region step and what the model predicts for it
pub(crate) struct ModelStep<A> {
    pub step: Array1<A>,
    /// $`m_k(0) - m_k(p)`$
    pub predicted: A,
    pub on_boundary: bool,
}

/// Ratio of actual to predicted reduction, `0` when the prediction vanishes
pub(crate) fn reduction_ratio<A: NdFloat>(actual: A, predicted: A) -> A {
    if predicted.abs() < lit(1e-25) || actual.is_nan() {
        A::zero()
    } else {
        actual / predicted
    }
}

/// Whether a small step or function change may end a trust region run
///
/// Requires $`\|g\| \le \sqrt{\text{grad\_tol}}`$. A zero `grad_tol`
/// disables the check.
pub(crate) fn near_stationary<A: NdFloat>(grad_norm: A, opts: &OptimizeOptions<A>) -> bool {
    !(opts.grad_tol > A::zero()) || grad_norm <= opts.grad_tol.sqrt()
}

/// Shared outer loop of the trust region methods
///
/// `model_step(x, g, delta)` proposes a step, `resize(delta, rho, step)`
/// returns the next radius. The step is taken only when $`\rho > \eta`$.
/// Step and function change criteria are ignored until [`near_stationary`]
/// holds, so a tiny accepted step far from a stationary point does not
/// end the run.
pub(crate) fn trust_region_loop<A, S, R>(
    name: &str,
    problem: &Problem<'_, A>,
    x0: ArrayView1<A>,
    initial_delta: A,
    eta: A,
    mut model_step: S,
    resize: R,
    opts: &OptimizeOptions<A>,
) -> OptimizeResult<A>
where
    A: NdFloat,
    S: FnMut(ArrayView1<A>, ArrayView1<A>, A) -> ModelStep<A>,
    R: Fn(A, A, &ModelStep<A>) -> A,
{
    let start = problem.counts();
    let mut x = x0.to_owned();
    let mut fx = problem.value(x.view());
    let mut g = problem.gradient(x.view());
    let mut delta = initial_delta;

    if norm(&g) < opts.grad_tol {
        return OptimizeResult::new(x, fx, Some(g), 0, problem.calls_since(start), ConvergenceReason::Gradient.into());
    }

    for iteration in 1..=opts.max_iterations {
        let m = model_step(x.view(), g.view(), delta);
        let x_trial = &x + &m.step;
        let f_trial = problem.value(x_trial.view());
        let actual = fx - f_trial;
        let rho = reduction_ratio(actual, m.predicted);

        let resized = resize(delta, rho, &m);
        if resized != delta {
            log::debug!("{}: radius {:e} -> {:e} at iteration {} (rho = {:e})", name, delta, resized, iteration, rho);
        }
        delta = resized;

        if rho > eta {
            let step_norm = norm(&m.step);
            x = x_trial;
            fx = f_trial;
            g = problem.gradient(x.view());

            let grad_norm = norm(&g);
            log::trace!("{}: iter {} f = {:e} |g| = {:e} delta = {:e}", name, iteration, fx, grad_norm, delta);
            match check_convergence(grad_norm, step_norm, actual.abs(), iteration, opts) {
                Some(ConvergenceReason::Step | ConvergenceReason::Function) if !near_stationary(grad_norm, opts) => {
                    log::debug!(
                        "{}: small step at iteration {} with |g| = {:e}, continuing",
                        name,
                        iteration,
                        grad_norm
                    );
                }
                Some(reason) => {
                    return OptimizeResult::new(x, fx, Some(g), iteration, problem.calls_since(start), reason.into());
                }
                None => {}
            }
        } else if delta < lit(1e-15) {
            log::warn!("{}: trust region collapsed at iteration {}", name, iteration);
            return OptimizeResult::new(
                x,
                fx,
                Some(g),
                iteration,
                problem.calls_since(start),
                Termination::RadiusCollapsed,
            );
        }
    }

    OptimizeResult::new(
        x,
        fx,
        Some(g),
        opts.max_iterations,
        problem.calls_since(start),
        ConvergenceReason::MaxIterations.into(),
    )
}
