use ndarray::prelude::*;
use ndarray::NdFloat;

use super::{LineFunction, LineSearchResult};
use crate::problem::Problem;
use crate::vecops::lit;

/// Parameters of [`strong_wolfe`]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WolfeOptions<A> {
    /// Sufficient decrease constant (default `1e-4`)
    pub c1: A,
    /// Curvature constant (default `0.9`)
    pub c2: A,
    /// Largest step tried while bracketing (default `1e6`)
    pub alpha_max: A,
    /// Bracketing iterations (default `25`)
    pub max_iter: usize,
    /// Bisections inside the bracket (default `20`)
    pub zoom_max_iter: usize,
}

impl<A: NdFloat> Default for WolfeOptions<A> {
    fn default() -> Self {
        WolfeOptions {
            c1: lit(1e-4),
            c2: lit(0.9),
            alpha_max: lit(1e6),
            max_iter: 25,
            zoom_max_iter: 20,
        }
    }
}

/// Line search for a step satisfying the strong Wolfe conditions
///
/// ```math
/// \begin{aligned}
/// \phi(\alpha) &\le \phi(0) + c_1 \alpha \phi'(0) \\
/// |\phi'(\alpha)| &\le c_2 |\phi'(0)|
/// \end{aligned}
/// ```
/// The step starts at $`\alpha=1`$ and doubles (up to `alpha_max`) until an
/// interval containing acceptable steps is bracketed, which is then bisected
/// by `zoom` [\[NW06\]](#references). A first step where $`f`$ is not
/// finite is divided by 10 until it is, and the last step outside then
/// replaces `alpha_max`.
///
/// References
/// ----------
/// \[NW06\]: Nocedal, J. and Wright, S., "Numerical Optimization",
///     2nd ed., Springer, 2006. Algorithms 3.5 and 3.6.
pub fn strong_wolfe<A: NdFloat>(
    problem: &Problem<'_, A>,
    x: ArrayView1<A>,
    d: ArrayView1<A>,
    fx: A,
    gx: ArrayView1<A>,
    opts: &WolfeOptions<A>,
) -> LineSearchResult<A> {
    let line = LineFunction::new(problem, x, d);
    let dphi0 = gx.dot(&d);
    let curvature_bound = opts.c2 * dphi0.abs();

    let (mut alpha, mut phi, outside) = line.enter_domain(A::one().min(opts.alpha_max));
    let alpha_max = outside.map_or(opts.alpha_max, |edge| edge.min(opts.alpha_max));
    if outside.is_some() {
        log::debug!("strong wolfe: first step shrunk to {:e} to keep f finite", alpha);
    }
    let mut alpha_prev = A::zero();
    let mut phi_prev = fx;

    for i in 0..opts.max_iter {
        if i > 0 {
            phi = line.phi(alpha);
        }
        let armijo = phi <= fx + opts.c1 * alpha * dphi0;
        if !armijo || (i > 0 && phi >= phi_prev) {
            return zoom(&line, alpha_prev, alpha, phi_prev, fx, dphi0, opts);
        }

        let (dphi, grad) = line.dphi(alpha);
        if dphi.abs() <= curvature_bound {
            return line.finish(alpha, phi, Some(grad), true);
        }
        if dphi >= A::zero() {
            return zoom(&line, alpha, alpha_prev, phi, fx, dphi0, opts);
        }

        alpha_prev = alpha;
        phi_prev = phi;
        alpha = (alpha + alpha).min(alpha_max);
    }
    log::warn!("strong wolfe: no bracket after {} steps", opts.max_iter);
    line.finish(alpha_prev, phi_prev, None, false)
}

/// Bisect between `lo`, the best step so far, and `hi`
fn zoom<A: NdFloat>(
    line: &LineFunction<'_, '_, '_, '_, A>,
    mut lo: A,
    mut hi: A,
    mut phi_lo: A,
    phi0: A,
    dphi0: A,
    opts: &WolfeOptions<A>,
) -> LineSearchResult<A> {
    let half = lit::<A>(0.5);
    for _ in 0..opts.zoom_max_iter {
        let alpha = half * (lo + hi);
        let phi = line.phi(alpha);
        if !(phi <= phi0 + opts.c1 * alpha * dphi0) || phi >= phi_lo {
            hi = alpha;
            continue;
        }

        let (dphi, grad) = line.dphi(alpha);
        if dphi.abs() <= opts.c2 * dphi0.abs() {
            return line.finish(alpha, phi, Some(grad), true);
        }
        if dphi * (hi - lo) >= A::zero() {
            hi = lo;
        }
        lo = alpha;
        phi_lo = phi;
    }
    log::warn!("strong wolfe: zoom exhausted on [{}, {}]", lo, hi);
    line.finish(lo, phi_lo, None, false)
}
