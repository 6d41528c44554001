use ndarray::prelude::*;
use ndarray::NdFloat;

use super::{LineFunction, LineSearchResult, Trial};
use crate::problem::Problem;
use crate::vecops::lit;

/// Parameters of [`more_thuente`]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MoreThuenteOptions<A> {
    /// Sufficient decrease constant (default `1e-4`)
    pub ftol: A,
    /// Curvature constant (default `0.9`)
    pub gtol: A,
    /// Relative width at which the bracket counts as collapsed (default `1e-8`)
    pub xtol: A,
    /// Default `1e-16`
    pub alpha_min: A,
    /// Default `65536`
    pub alpha_max: A,
    /// Evaluations of $`\phi`$ and $`\phi'`$ allowed (default `100`)
    pub max_fev: usize,
}

impl<A: NdFloat> Default for MoreThuenteOptions<A> {
    fn default() -> Self {
        MoreThuenteOptions {
            ftol: lit(1e-4),
            gtol: lit(0.9),
            xtol: lit(1e-8),
            alpha_min: lit(1e-16),
            alpha_max: lit(65536.),
            max_fev: 100,
        }
    }
}

/// Why the search stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Converged,
    BracketCollapsed,
    MaxFev,
    AtMinStep,
    AtMaxStep,
    Rounding,
}

/// Endpoint of the interval of uncertainty
#[derive(Debug, Clone, Copy)]
struct Point<A> {
    alpha: A,
    f: A,
    dg: A,
}

impl<A: NdFloat> Point<A> {
    /// Shift by the sufficient decrease line $`\psi(\alpha) = \phi(\alpha) - \phi(0) - \mu\alpha\phi'(0)`$
    fn shifted(self, dgtest: A) -> Self {
        Point {
            alpha: self.alpha,
            f: self.f - self.alpha * dgtest,
            dg: self.dg - dgtest,
        }
    }

    fn unshifted(self, dgtest: A) -> Self {
        Point {
            alpha: self.alpha,
            f: self.f + self.alpha * dgtest,
            dg: self.dg + dgtest,
        }
    }
}

/// Minimizer of the cubic through `a` and `b` as the ratio `p / q`, and $`\gamma`$
///
/// `flip` selects the other root of the derivative; `clip` treats a
/// negative discriminant as zero.
fn cubic_ratio<A: NdFloat>(a: Point<A>, b: Point<A>, flip: bool, clip: bool) -> (A, A) {
    let three = lit::<A>(3.);
    let theta = three * (a.f - b.f) / (b.alpha - a.alpha) + a.dg + b.dg;
    let s = theta.abs().max(a.dg.abs()).max(b.dg.abs());
    let mut disc = (theta / s) * (theta / s) - (a.dg / s) * (b.dg / s);
    if clip {
        disc = disc.max(A::zero());
    }
    let mut gamma = s * disc.sqrt();
    if flip {
        gamma = -gamma;
    }
    let p = (gamma - b.dg) + theta;
    let q = ((gamma - b.dg) + gamma) + a.dg;
    (p / q, gamma)
}

/// One safeguarded step of the More–Thuente interval update
///
/// `x` is the best point so far, `y` the other end of the interval and `t`
/// the latest trial. Returns the next trial step and updates the interval.
fn cstep<A: NdFloat>(
    x: &mut Point<A>,
    y: &mut Point<A>,
    t: Point<A>,
    bracketed: &mut bool,
    stmin: A,
    stmax: A,
) -> A {
    let half = lit::<A>(0.5);
    let two_thirds = lit::<A>(0.66);
    let sgnd = t.dg * x.dg.signum();

    let next = if t.f > x.f {
        // higher value: the minimum is bracketed
        let (r, _) = cubic_ratio(t, *x, t.alpha < x.alpha, false);
        let stpc = x.alpha + r * (t.alpha - x.alpha);
        let stpq = x.alpha + x.dg / ((x.f - t.f) / (t.alpha - x.alpha) + x.dg) * half * (t.alpha - x.alpha);
        *bracketed = true;
        if (stpc - x.alpha).abs() < (stpq - x.alpha).abs() {
            stpc
        } else {
            stpc + half * (stpq - stpc)
        }
    } else if sgnd < A::zero() {
        // derivatives of opposite sign: bracketed
        let (r, _) = cubic_ratio(*x, t, t.alpha > x.alpha, false);
        let stpc = t.alpha + r * (x.alpha - t.alpha);
        let stpq = t.alpha + t.dg / (t.dg - x.dg) * (x.alpha - t.alpha);
        *bracketed = true;
        if (stpc - t.alpha).abs() > (stpq - t.alpha).abs() {
            stpc
        } else {
            stpq
        }
    } else if t.dg.abs() < x.dg.abs() {
        // same sign, derivative shrinking in magnitude
        let (r, gamma) = cubic_ratio(*x, t, t.alpha > x.alpha, true);
        let stpc = if r < A::zero() && gamma != A::zero() {
            t.alpha + r * (x.alpha - t.alpha)
        } else if t.alpha > x.alpha {
            stmax
        } else {
            stmin
        };
        let stpq = t.alpha + t.dg / (t.dg - x.dg) * (x.alpha - t.alpha);
        if *bracketed {
            let stpf = if (stpc - t.alpha).abs() < (stpq - t.alpha).abs() {
                stpc
            } else {
                stpq
            };
            let limit = t.alpha + two_thirds * (y.alpha - t.alpha);
            if t.alpha > x.alpha {
                stpf.min(limit)
            } else {
                stpf.max(limit)
            }
        } else {
            let stpf = if (stpc - t.alpha).abs() > (stpq - t.alpha).abs() {
                stpc
            } else {
                stpq
            };
            stpf.min(stmax).max(stmin)
        }
    } else if *bracketed {
        // same sign, derivative not shrinking
        let (r, _) = cubic_ratio(*y, t, t.alpha > y.alpha, false);
        t.alpha + r * (y.alpha - t.alpha)
    } else if t.alpha > x.alpha {
        stmax
    } else {
        stmin
    };

    if t.f > x.f {
        *y = t;
    } else {
        if sgnd < A::zero() {
            *y = *x;
        }
        *x = t;
    }
    next
}

/// More–Thuente line search
///
/// Finds a step satisfying the strong Wolfe conditions
/// ```math
/// \begin{aligned}
/// \phi(\alpha) &\le \phi(0) + \mu \alpha \phi'(0) \\
/// |\phi'(\alpha)| &\le \eta |\phi'(0)|
/// \end{aligned}
/// ```
/// with $`\mu`$ = `ftol` and $`\eta`$ = `gtol`, by safeguarded cubic and
/// quadratic interpolation on an interval of uncertainty
/// [\[MT94\]](#references). Until a step gives sufficient decrease and a
/// non-negative slope, the interpolation runs on the auxiliary function
/// $`\phi(\alpha) - \mu\alpha\phi'(0)`$. Each trial costs one objective
/// and one gradient evaluation.
///
/// A first step where $`f`$ is not finite is divided by 10 until it is, and
/// the last step outside then replaces `alpha_max`.
///
/// References
/// ----------
/// \[MT94\]: Moré, J. J. and Thuente, D. J., "Line Search Algorithms with
///     Guaranteed Sufficient Decrease", ACM Transactions on Mathematical
///     Software, 20(3), 1994, 286-307.
pub fn more_thuente<A: NdFloat>(
    problem: &Problem<'_, A>,
    x: ArrayView1<A>,
    d: ArrayView1<A>,
    fx: A,
    gx: ArrayView1<A>,
    opts: &MoreThuenteOptions<A>,
) -> LineSearchResult<A> {
    let line = LineFunction::new(problem, x, d);
    let dg0 = gx.dot(&d);
    if !(dg0 < A::zero()) {
        log::warn!("more-thuente: not a descent direction, phi'(0) = {}", dg0);
        return line.finish(A::zero(), fx, None, false);
    }

    let half = lit::<A>(0.5);
    let two_thirds = lit::<A>(0.66);
    let four = lit::<A>(4.);
    let dgtest = opts.ftol * dg0;
    let curvature_bound = opts.gtol * dg0.abs();

    let first = A::one().max(opts.alpha_min).min(opts.alpha_max);
    let (first, phi_first, outside) = line.enter_domain(first);
    let alpha_max = outside.map_or(opts.alpha_max, |edge| edge.min(opts.alpha_max));
    let mut known_phi = Some(phi_first);

    let origin = Point {
        alpha: A::zero(),
        f: fx,
        dg: dg0,
    };
    let mut best = origin;
    let mut other = origin;
    let mut bracketed = false;
    let mut stage1 = true;
    let mut stalled = false;
    let mut width = alpha_max - opts.alpha_min;
    let mut width1 = width + width;
    let mut alpha = first;
    let mut nfev = 0;

    loop {
        let (stmin, stmax) = if bracketed {
            (best.alpha.min(other.alpha), best.alpha.max(other.alpha))
        } else {
            (best.alpha, alpha + four * (alpha - best.alpha))
        };
        let (stmin, stmax) = (stmin.max(opts.alpha_min), stmax.min(alpha_max));

        alpha = alpha.max(opts.alpha_min).min(alpha_max);
        let collapsed = bracketed && stmax - stmin <= opts.xtol * stmax;
        if (bracketed && (alpha <= stmin || alpha >= stmax)) || nfev + 1 >= opts.max_fev || stalled || collapsed {
            alpha = best.alpha;
        }

        let trial: Trial<A> = match known_phi.take() {
            Some(phi) if alpha == first => line.trial_from(alpha, phi),
            _ => line.trial(alpha),
        };
        nfev += 1;
        let ftest = fx + alpha * dgtest;
        let armijo = trial.phi <= ftest;

        let mut stop = None;
        if (bracketed && (alpha <= stmin || alpha >= stmax)) || stalled {
            stop = Some(Stop::Rounding);
        }
        if alpha == alpha_max && armijo && trial.dphi <= dgtest {
            stop = Some(Stop::AtMaxStep);
        }
        if alpha == opts.alpha_min && (!armijo || trial.dphi >= dgtest) {
            stop = Some(Stop::AtMinStep);
        }
        if nfev >= opts.max_fev {
            stop = Some(Stop::MaxFev);
        }
        if collapsed {
            stop = Some(Stop::BracketCollapsed);
        }
        if armijo && trial.dphi.abs() <= curvature_bound {
            stop = Some(Stop::Converged);
        }
        if let Some(stop) = stop {
            if stop == Stop::Converged {
                return line.accept(trial);
            }
            log::warn!("more-thuente: stopped with {:?} at alpha = {}", stop, alpha);
            return line.finish(trial.alpha, trial.phi, Some(trial.grad), false);
        }

        if stage1 && armijo && trial.dphi >= opts.ftol.min(opts.gtol) * dg0 {
            stage1 = false;
        }

        let t = Point {
            alpha,
            f: trial.phi,
            dg: trial.dphi,
        };
        alpha = if stage1 && t.f <= best.f && !armijo {
            let mut x = best.shifted(dgtest);
            let mut y = other.shifted(dgtest);
            let next = cstep(&mut x, &mut y, t.shifted(dgtest), &mut bracketed, stmin, stmax);
            best = x.unshifted(dgtest);
            other = y.unshifted(dgtest);
            next
        } else {
            cstep(&mut best, &mut other, t, &mut bracketed, stmin, stmax)
        };
        stalled = !alpha.is_finite();

        if bracketed {
            let span = (other.alpha - best.alpha).abs();
            if span >= two_thirds * width1 {
                alpha = best.alpha + half * (other.alpha - best.alpha);
            }
            width1 = width;
            width = span;
        }
    }
}
