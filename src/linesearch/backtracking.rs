use ndarray::prelude::*;
use ndarray::NdFloat;

use super::{LineFunction, LineSearchResult};
use crate::problem::Problem;
use crate::vecops::lit;

/// Parameters of [`backtracking`]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BacktrackingOptions<A> {
    /// First trial step (default `1.0`)
    pub initial_alpha: A,
    /// Sufficient decrease constant (default `1e-4`)
    pub c1: A,
    /// Shrink factor per rejection (default `0.5`)
    pub rho: A,
    /// Number of trial steps (default `20`)
    pub max_iter: usize,
}

impl<A: NdFloat> Default for BacktrackingOptions<A> {
    fn default() -> Self {
        BacktrackingOptions {
            initial_alpha: A::one(),
            c1: lit(1e-4),
            rho: lit(0.5),
            max_iter: 20,
        }
    }
}

/// Backtracking line search on the Armijo condition
///
/// Tries $`\alpha = \alpha_0, \rho\alpha_0, \rho^2\alpha_0, \dots`$ until
/// ```math
/// f(x + \alpha d) \le f(x) + c_1 \alpha \nabla f(x)^T d
/// ```
/// Never evaluates the gradient, so `g_new` is always `None`.
pub fn backtracking<A: NdFloat>(
    problem: &Problem<'_, A>,
    x: ArrayView1<A>,
    d: ArrayView1<A>,
    fx: A,
    gx: ArrayView1<A>,
    opts: &BacktrackingOptions<A>,
) -> LineSearchResult<A> {
    let line = LineFunction::new(problem, x, d);
    let dg = gx.dot(&d);

    let mut alpha = opts.initial_alpha;
    let mut f_new = fx;
    for _ in 0..opts.max_iter {
        f_new = line.phi(alpha);
        if f_new <= fx + opts.c1 * alpha * dg {
            return line.finish(alpha, f_new, None, true);
        }
        alpha = alpha * opts.rho;
    }
    log::warn!("backtracking: no Armijo step after {} trials", opts.max_iter);
    line.finish(alpha, f_new, None, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testfns;
    use approx::assert_abs_diff_eq;

    #[test]
    fn sphere_halves_once() {
        let tf = testfns::sphere();
        let p = tf.problem();
        let x = array![10.0, 10.0];
        let gx = (tf.gradient)(x.view());
        let d = -&gx;
        let r = backtracking(&p, x.view(), d.view(), (tf.f)(x.view()), gx.view(), &Default::default());
        assert!(r.success);
        assert_abs_diff_eq!(r.alpha, 0.5);
        assert_abs_diff_eq!(r.f_new, 0.0, epsilon = 1e-12);
        assert_eq!(r.function_calls, 2);
        assert_eq!(r.gradient_calls, 0);
        assert!(r.g_new.is_none());
    }

    #[test]
    fn rosenbrock_decreases() {
        let tf = testfns::rosenbrock();
        let p = tf.problem();
        let x = tf.start.clone();
        let gx = (tf.gradient)(x.view());
        let d = -&gx;
        let fx = (tf.f)(x.view());
        let r = backtracking(&p, x.view(), d.view(), fx, gx.view(), &Default::default());
        assert!(r.success);
        assert!(r.f_new < fx);
    }

    #[test]
    fn ascent_direction_fails() {
        let tf = testfns::sphere();
        let p = tf.problem();
        let x = array![10.0, 10.0];
        let gx = (tf.gradient)(x.view());
        let opts = BacktrackingOptions::default();
        let r = backtracking(&p, x.view(), gx.view(), (tf.f)(x.view()), gx.view(), &opts);
        assert!(!r.success);
        assert_eq!(r.function_calls, opts.max_iter);
    }
}
