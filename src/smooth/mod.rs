//! First Order and Quasi-Newton Methods for Smooth Minimization
//!
//! For minimizing a differentiable objective $`f`$ using only $`f`$ and
//! $`\nabla f`$. Each iteration picks a descent direction and a step along
//! it by line search,
//! ```math
//! x_{k+1} = x_k + \alpha_k d_k, \qquad d_k = -H_k \nabla f(x_k)
//! ```
//! where $`H_k`$ ranges from the identity (gradient descent) to a full
//! inverse Hessian approximation (BFGS). Conjugate gradient instead mixes
//! the previous direction into the new one.
//!
//! When no analytic gradient is supplied the [`Problem`] falls back on
//! finite differences, which works but costs $`n`$ extra objective
//! evaluations per gradient.

mod gd;
pub use gd::*;
mod bfgs;
pub use bfgs::*;
mod ncg;
pub use ncg::*;

use ndarray::prelude::*;
use ndarray::NdFloat;
use num_traits::Float;

use crate::linesearch::LineSearchResult;
use crate::linop::InverseHessian;
use crate::problem::Problem;
use crate::result::{check_convergence, ConvergenceReason, OptimizeOptions, OptimizeResult};
use crate::vecops::{lit, norm};

/// Curvature condition guarding quasi-Newton updates
pub(crate) fn curvature_ok<A: NdFloat>(ys: A) -> bool {
    ys > lit(1e-10)
}

/// Shared outer loop of gradient descent, BFGS and L-BFGS
///
/// Directions come from `hess`, steps from `search`. An accepted step with
/// $`y^Ts \le 10^{-10}`$ still moves `x` but leaves `hess` untouched.
pub(crate) fn descend<A, H, L>(
    name: &str,
    problem: &Problem<'_, A>,
    x0: ArrayView1<A>,
    hess: &mut H,
    search: L,
    opts: &OptimizeOptions<A>,
) -> OptimizeResult<A>
where
    A: NdFloat,
    H: InverseHessian<Elem = A>,
    L: Fn(ArrayView1<A>, ArrayView1<A>, A, ArrayView1<A>) -> LineSearchResult<A>,
{
    let start = problem.counts();
    let mut x = x0.to_owned();
    let mut fx = problem.value(x.view());
    let mut g = problem.gradient(x.view());

    if norm(&g) < opts.grad_tol {
        return OptimizeResult::new(x, fx, Some(g), 0, problem.calls_since(start), ConvergenceReason::Gradient.into());
    }

    for iteration in 1..=opts.max_iterations {
        let d = -hess.apply(&g);
        let ls = search(x.view(), d.view(), fx, g.view());
        if !ls.success {
            log::warn!("{}: line search failed at iteration {}", name, iteration);
            return OptimizeResult::new(
                x,
                fx,
                Some(g),
                iteration,
                problem.calls_since(start),
                ConvergenceReason::LineSearchFailed.into(),
            );
        }

        let s = &d * ls.alpha;
        let x_new = &x + &s;
        let g_new = match ls.g_new {
            Some(g_new) => g_new,
            None => problem.gradient(x_new.view()),
        };
        let y = &g_new - &g;
        let ys = y.dot(&s);
        let step_norm = norm(&s);
        let func_change = Float::abs(fx - ls.f_new);

        x = x_new;
        fx = ls.f_new;
        g = g_new;

        if curvature_ok(ys) {
            hess.update(s, y);
        } else {
            log::debug!("{}: skipping update at iteration {}, y's = {:e}", name, iteration, ys);
        }

        let grad_norm = norm(&g);
        log::trace!("{}: iter {} f = {:e} |g| = {:e}", name, iteration, fx, grad_norm);
        if let Some(reason) = check_convergence(grad_norm, step_norm, func_change, iteration, opts) {
            return OptimizeResult::new(x, fx, Some(g), iteration, problem.calls_since(start), reason.into());
        }
    }

    // only reachable with max_iterations == 0
    OptimizeResult::new(
        x,
        fx,
        Some(g),
        0,
        problem.calls_since(start),
        ConvergenceReason::MaxIterations.into(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linop::LinearOperator;
    use approx::assert_abs_diff_eq;
    use ndarray::Data;
    use std::cell::Cell;

    /// Identity that records how often it was updated
    struct Counting {
        updates: Cell<usize>,
    }

    impl LinearOperator for Counting {
        type Elem = f64;

        fn apply<S>(&self, a: &ArrayBase<S, Ix1>) -> Array1<S::Elem>
        where
            S: Data<Elem = Self::Elem>,
        {
            a.to_owned()
        }
    }

    impl InverseHessian for Counting {
        fn update(&mut self, _s: Array1<f64>, _y: Array1<f64>) {
            self.updates.set(self.updates.get() + 1);
        }
    }

    fn unit_step(p: &Problem<'_, f64>, x: ArrayView1<f64>, d: ArrayView1<f64>) -> LineSearchResult<f64> {
        let f_new = p.value((&x + &d).view());
        LineSearchResult {
            alpha: 1.,
            f_new,
            g_new: None,
            function_calls: 1,
            gradient_calls: 0,
            success: true,
        }
    }

    #[test]
    fn curvature_guard_skips_update_but_moves() {
        // linear objective: y = 0 on every step
        let f = |x: ArrayView1<f64>| -x[0];
        let g = |_x: ArrayView1<f64>| array![-1.];
        let p = Problem::new(&f).with_gradient(&g);
        let mut hess = Counting { updates: Cell::new(0) };
        let opts = OptimizeOptions::default().with_max_iterations(3);
        let r = descend("test", &p, array![0.].view(), &mut hess, |x, d, _, _| unit_step(&p, x, d), &opts);
        assert_eq!(hess.updates.get(), 0);
        assert_eq!(r.iterations, 3);
        assert_abs_diff_eq!(r.x, array![3.]);
        assert_abs_diff_eq!(r.fun, -3.);
        assert_eq!(r.reason(), Some(ConvergenceReason::MaxIterations));
    }

    #[test]
    fn curved_step_updates() {
        let f = |x: ArrayView1<f64>| x[0] * x[0];
        let g = |x: ArrayView1<f64>| array![2. * x[0]];
        let p = Problem::new(&f).with_gradient(&g);
        let mut hess = Counting { updates: Cell::new(0) };
        let opts = OptimizeOptions::default().with_max_iterations(1);
        descend("test", &p, array![0.25].view(), &mut hess, |x, d, _, _| unit_step(&p, x, d), &opts);
        assert_eq!(hess.updates.get(), 1);
    }

    #[test]
    fn zero_iterations_allowed() {
        let f = |x: ArrayView1<f64>| x[0] * x[0];
        let g = |x: ArrayView1<f64>| array![2. * x[0]];
        let p = Problem::new(&f).with_gradient(&g);
        let mut hess = Counting { updates: Cell::new(0) };
        let opts = OptimizeOptions::default().with_max_iterations(0);
        let r = descend("test", &p, array![1.].view(), &mut hess, |x, d, _, _| unit_step(&p, x, d), &opts);
        assert_eq!(r.iterations, 0);
        assert_eq!(r.reason(), Some(ConvergenceReason::MaxIterations));
    }
}
