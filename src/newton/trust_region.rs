use ndarray::prelude::*;
use ndarray::NdFloat;
use num_traits::Float;

use super::{trust_region_loop, ModelStep};
use crate::error::{OptimizeError, Result};
use crate::problem::Problem;
use crate::result::{OptimizeOptions, OptimizeResult};
use crate::vecops::{add_scaled, cholesky_solve, lit, norm, LinalgFloat};

/// Options for [`newton_trust_region`]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrustRegionOptions<A> {
    pub base: OptimizeOptions<A>,
    /// Starting radius (default `1`)
    pub initial_delta: A,
    /// Radius cap (default `100`)
    pub max_delta: A,
    /// Smallest reduction ratio for which a step is taken (default `0.1`)
    pub eta: A,
}

impl<A: NdFloat> Default for TrustRegionOptions<A> {
    fn default() -> Self {
        TrustRegionOptions::new(OptimizeOptions::default())
    }
}

impl<A: NdFloat> TrustRegionOptions<A> {
    pub fn new(base: OptimizeOptions<A>) -> Self {
        TrustRegionOptions {
            base,
            initial_delta: A::one(),
            max_delta: lit(100.),
            eta: lit(0.1),
        }
    }

    pub fn with_radius(mut self, initial_delta: A, max_delta: A) -> Self {
        self.initial_delta = initial_delta;
        self.max_delta = max_delta;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_radius(self.initial_delta, self.max_delta)
    }
}

pub(crate) fn validate_radius<A: NdFloat>(initial: A, max: A) -> Result<()> {
    if !(initial > A::zero() && max >= initial) {
        return Err(OptimizeError::InvalidOption(format!(
            "trust region radius must be positive and at most the cap, got {} (cap {})",
            initial, max
        )));
    }
    Ok(())
}

/// Dogleg minimizer of the quadratic model inside $`\|p\| \le \delta`$
///
/// Follows the path from the Cauchy point
/// $`p_C = -\frac{g^Tg}{g^THg}g`$ to the Newton point $`p_N = -H^{-1}g`$ and
/// stops where it leaves the ball. Without positive curvature along $`g`$,
/// or when $`p_C`$ is already outside, the scaled steepest descent step is
/// returned. If $`H`$ cannot be factored the path ends at $`p_C`$.
pub(crate) fn dogleg<A: LinalgFloat>(g: ArrayView1<A>, h: &Array2<A>, delta: A) -> Array1<A> {
    let g_norm = norm(&g);
    let steepest = || g.mapv(|e| e * (-delta / g_norm));

    let ghg = g.dot(&h.dot(&g));
    if !(ghg > A::zero()) {
        return steepest();
    }
    let pc = g.mapv(|e| e * (-(g_norm * g_norm) / ghg));
    if norm(&pc) >= delta {
        return steepest();
    }

    let pn = match cholesky_solve(h, &g.mapv(|e| -e)) {
        Some(pn) => pn,
        None => return pc,
    };
    if norm(&pn) <= delta {
        return pn;
    }

    // |pc + tau (pn - pc)| = delta
    let diff = &pn - &pc;
    let two = lit::<A>(2.);
    let a = diff.dot(&diff);
    let b = two * pc.dot(&diff);
    let c = pc.dot(&pc) - delta * delta;
    let disc = b * b - two * two * a * c;
    if disc < A::zero() || a <= A::zero() {
        return pc;
    }
    let tau = ((-b + Float::sqrt(disc)) / (two * a)).max(A::zero()).min(A::one());
    add_scaled(&pc, &diff, tau)
}

/// Newton's method in a trust region with dogleg steps
///
/// Algorithm
/// ---------
/// Each iteration takes the [dogleg](https://en.wikipedia.org/wiki/Powell%27s_dog_leg_method)
/// step $`p_k`$ for the current radius $`\delta_k`$ and compares the actual
/// and predicted reductions,
/// ```math
/// \rho_k = \frac{f(x_k) - f(x_k + p_k)}{-(g_k^Tp_k + \frac{1}{2}p_k^TH_kp_k)}
/// ```
/// If $`\rho_k < 1/4`$ the radius becomes $`\|p_k\|/4`$; if $`\rho_k > 3/4`$
/// and the step reached the boundary it doubles, up to `max_delta`. The step
/// is taken only when $`\rho_k > \eta`$; a run whose radius falls below
/// $`10^{-15}`$ stops with [`Termination::RadiusCollapsed`](crate::result::Termination).
///
/// Indefinite Hessians need no regularization here since the step is
/// bounded by construction.
pub fn newton_trust_region<A: LinalgFloat>(
    problem: &Problem<'_, A>,
    x0: ArrayView1<A>,
    opts: &TrustRegionOptions<A>,
) -> OptimizeResult<A> {
    if let Err(err) = opts.validate() {
        return OptimizeResult::rejected(problem, x0, err);
    }
    let half = lit::<A>(0.5);
    trust_region_loop(
        "trust region",
        problem,
        x0,
        opts.initial_delta,
        opts.eta,
        |x, g, delta| {
            let h = problem.hessian(x);
            let step = dogleg(g, &h, delta);
            let predicted = -(g.dot(&step) + half * step.dot(&h.dot(&step)));
            let on_boundary = norm(&step) >= lit::<A>(0.99) * delta;
            ModelStep {
                step,
                predicted,
                on_boundary,
            }
        },
        |delta, rho, m| {
            if rho < lit(0.25) {
                lit::<A>(0.25) * norm(&m.step)
            } else if rho > lit(0.75) && m.on_boundary {
                (delta + delta).min(opts.max_delta)
            } else {
                delta
            }
        },
        &opts.base,
    )
}
