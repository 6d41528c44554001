use ndarray::prelude::*;
use ndarray::NdFloat;

use super::{LineFunction, LineSearchResult, Trial};
use crate::problem::Problem;
use crate::vecops::lit;

/// Parameters of [`hager_zhang`]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HagerZhangOptions<A> {
    /// Sufficient decrease constant $`\delta`$ (default `0.1`)
    pub delta: A,
    /// Curvature constant $`\sigma`$ (default `0.9`)
    pub sigma: A,
    /// Relative slack $`\epsilon`$ of the approximate conditions (default `1e-6`)
    pub epsilon: A,
    /// Bisection ratio $`\theta`$ (default `0.5`)
    pub theta: A,
    /// Required shrink per secant step before bisecting (default `0.66`)
    pub gamma: A,
    /// Expansion factor while bracketing (default `5.0`)
    pub rho: A,
    /// Expansions while bracketing (default `50`)
    pub max_bracket_iter: usize,
    /// Secant steps inside the bracket (default `50`)
    pub max_secant_iter: usize,
}

impl<A: NdFloat> Default for HagerZhangOptions<A> {
    fn default() -> Self {
        HagerZhangOptions {
            delta: lit(0.1),
            sigma: lit(0.9),
            epsilon: lit(1e-6),
            theta: lit(0.5),
            gamma: lit(0.66),
            rho: lit(5.),
            max_bracket_iter: 50,
            max_secant_iter: 50,
        }
    }
}

/// `lo` has $`\phi' < 0`$ and $`\phi \le \phi(0) + \epsilon_k`$, `hi` does not
struct Bracket<A> {
    lo: Trial<A>,
    hi: Trial<A>,
}

impl<A: NdFloat> Bracket<A> {
    fn width(&self) -> A {
        self.hi.alpha - self.lo.alpha
    }

    fn narrow(&mut self, t: Trial<A>, overshoots: bool) {
        if overshoots {
            self.hi = t;
        } else {
            self.lo = t;
        }
    }
}

/// Hager–Zhang line search on the approximate Wolfe conditions
///
/// A step is accepted when $`\phi'(\alpha) \ge \sigma\phi'(0)`$ and either
/// the usual sufficient decrease holds, or
/// ```math
/// \phi(\alpha) \le \phi(0) + \epsilon_k \quad\text{and}\quad \phi'(\alpha) \le (2\delta - 1)\phi'(0),
/// \qquad \epsilon_k = \epsilon|\phi(0)|
/// ```
/// The second form stays reliable near a minimizer, where differences of
/// $`\phi`$ drown in rounding error. The step expands by `rho` from
/// $`\alpha=1`$ until a bracket is found, which is then shrunk by secant
/// steps with a bisection whenever a secant step shrinks it by less than
/// `gamma` [\[HZ06\]](#references).
///
/// References
/// ----------
/// \[HZ06\]: Hager, W. and Zhang, H., "Algorithm 851: CG_DESCENT, a
///     Conjugate Gradient Method with Guaranteed Descent",
///     ACM Transactions on Mathematical Software, 32(1), 2006, 113-137.
pub fn hager_zhang<A: NdFloat>(
    problem: &Problem<'_, A>,
    x: ArrayView1<A>,
    d: ArrayView1<A>,
    fx: A,
    gx: ArrayView1<A>,
    opts: &HagerZhangOptions<A>,
) -> LineSearchResult<A> {
    let line = LineFunction::new(problem, x, d);
    let phi0 = fx;
    let dphi0 = gx.dot(&d);
    let eps_k = opts.epsilon * phi0.abs();
    let two = lit::<A>(2.);

    let acceptable = |t: &Trial<A>| {
        t.dphi >= opts.sigma * dphi0
            && (t.phi <= phi0 + opts.delta * t.alpha * dphi0
                || (t.phi <= phi0 + eps_k && t.dphi <= (two * opts.delta - A::one()) * dphi0))
    };
    let overshoots = |t: &Trial<A>| !(t.phi <= phi0 + eps_k) || t.dphi >= A::zero();

    // bracket
    let (alpha, phi, _) = line.enter_domain(A::one());
    let mut c = line.trial_from(alpha, phi);
    if acceptable(&c) {
        return line.accept(c);
    }
    let mut lo = Trial {
        alpha: A::zero(),
        phi: phi0,
        dphi: dphi0,
        grad: gx.to_owned(),
    };
    let mut expansions = 0;
    while !overshoots(&c) {
        if expansions == opts.max_bracket_iter {
            log::warn!("hager-zhang: no bracket up to alpha = {}", c.alpha);
            return line.finish(c.alpha, c.phi, Some(c.grad), false);
        }
        expansions += 1;
        let next = line.trial(c.alpha * opts.rho);
        if acceptable(&next) {
            return line.accept(next);
        }
        lo = std::mem::replace(&mut c, next);
    }
    let mut bracket = Bracket { lo, hi: c };

    // secant / bisection
    let tiny = lit::<A>(1e-14);
    let mut last_width = bracket.width();
    for _ in 0..opts.max_secant_iter {
        let width = bracket.width();
        if width < tiny {
            let mid = line.trial(bracket.lo.alpha + width / two);
            return line.accept(mid);
        }

        let (lo, hi) = (&bracket.lo, &bracket.hi);
        let denom = hi.dphi - lo.dphi;
        let alpha = if denom.abs() > lit(1e-30) {
            let margin = tiny * width;
            (lo.alpha - lo.dphi * width / denom)
                .max(lo.alpha + margin)
                .min(hi.alpha - margin)
        } else {
            lo.alpha + opts.theta * width
        };
        let t = line.trial(alpha);
        if acceptable(&t) {
            return line.accept(t);
        }
        let over = overshoots(&t);
        bracket.narrow(t, over);

        if bracket.width() > opts.gamma * last_width {
            let t = line.trial(bracket.lo.alpha + opts.theta * bracket.width());
            if acceptable(&t) {
                return line.accept(t);
            }
            let over = overshoots(&t);
            bracket.narrow(t, over);
        }
        last_width = bracket.width();
    }

    log::warn!(
        "hager-zhang: bracket [{}, {}] did not yield a step",
        bracket.lo.alpha,
        bracket.hi.alpha
    );
    let lo = bracket.lo;
    line.finish(lo.alpha, lo.phi, Some(lo.grad), false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testfns;
    use approx::assert_abs_diff_eq;

    fn search(tf: &testfns::TestFunction, x: &Array1<f64>) -> (LineSearchResult<f64>, Array1<f64>, f64) {
        let p = tf.problem();
        let gx = (tf.gradient)(x.view());
        let d = -&gx;
        let r = hager_zhang(&p, x.view(), d.view(), (tf.f)(x.view()), gx.view(), &Default::default());
        assert_eq!(p.counts(), (r.function_calls, r.gradient_calls));
        (r, d, gx.dot(&-&gx))
    }

    #[test]
    fn accepts_unit_step_on_sphere() {
        // -g/2 is exact, so alpha = 0.5; alpha = 1 lands on the mirror point
        let tf = testfns::sphere();
        let (r, _, _) = search(&tf, &array![1.0, -2.0]);
        assert!(r.success);
        assert_abs_diff_eq!(r.alpha, 0.5, epsilon = 1e-8);
        assert_abs_diff_eq!(r.f_new, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn approximate_wolfe_on_reference_functions() {
        let opts = HagerZhangOptions::<f64>::default();
        for (tf, x) in vec![
            (testfns::rosenbrock(), array![-1.2, 1.0]),
            (testfns::booth(), array![0.0, 0.0]),
            (testfns::himmelblau(), array![0.0, 0.0]),
            (testfns::beale(), array![1.0, 1.0]),
        ] {
            let (r, d, dphi0) = search(&tf, &x);
            assert!(r.success, "{} failed", tf.name);
            let g_new = r.g_new.unwrap();
            assert!(g_new.dot(&d) >= opts.sigma * dphi0);
            assert!(r.f_new < (tf.f)(x.view()));
            let x_new = &x + &(r.alpha * &d);
            assert_abs_diff_eq!(g_new, (tf.gradient)(x_new.view()));
        }
    }

    #[test]
    fn expands_until_bracketed() {
        // minimum at alpha = 40 along d = 1, first acceptable trial is rho * 1
        let f = |x: ArrayView1<f64>| (x[0] - 40.).powi(2);
        let g = |x: ArrayView1<f64>| array![2. * (x[0] - 40.)];
        let p = Problem::new(&f).with_gradient(&g);
        let x = array![0.0];
        let d = array![1.0];
        let gx = g(x.view());
        let r = hager_zhang(&p, x.view(), d.view(), f(x.view()), gx.view(), &Default::default());
        assert!(r.success);
        assert_abs_diff_eq!(r.alpha, 5.0);
        assert_abs_diff_eq!(r.f_new, 1225.0);
        assert_eq!((r.function_calls, r.gradient_calls), (2, 2));
    }
}
