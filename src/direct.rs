//! Minimization via Direct Function Comparison, i.e. derivativeless
use std::cmp::Ordering;

use ndarray::prelude::*;
use ndarray::NdFloat;

use crate::error::{OptimizeError, Result};
use crate::problem::Problem;
use crate::result::{ConvergenceReason, OptimizeOptions, OptimizeResult};
use crate::vecops::{lit, norm};

/// Options for [`nelder_mead`]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NelderMeadOptions<A> {
    pub base: OptimizeOptions<A>,
    /// Reflection coefficient (default `1`)
    pub alpha: A,
    /// Expansion coefficient (default `2`)
    pub gamma: A,
    /// Contraction coefficient (default `0.5`)
    pub rho: A,
    /// Shrink coefficient (default `0.5`)
    pub sigma: A,
    /// Edge of the initial simplex relative to $`\max(|x_i|, 1)`$ (default `0.05`)
    pub initial_simplex_scale: A,
}

impl<A: NdFloat> Default for NelderMeadOptions<A> {
    fn default() -> Self {
        NelderMeadOptions::new(OptimizeOptions::default())
    }
}

impl<A: NdFloat> NelderMeadOptions<A> {
    pub fn new(base: OptimizeOptions<A>) -> Self {
        NelderMeadOptions {
            base,
            alpha: A::one(),
            gamma: lit(2.),
            rho: lit(0.5),
            sigma: lit(0.5),
            initial_simplex_scale: lit(0.05),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let unit = |v: A| v > A::zero() && v < A::one();
        if !(self.alpha > A::zero() && self.gamma > self.alpha && unit(self.rho) && unit(self.sigma)) {
            return Err(OptimizeError::InvalidOption(
                "Nelder-Mead needs alpha > 0, gamma > alpha and rho, sigma in (0, 1)".into(),
            ));
        }
        if !(self.initial_simplex_scale > A::zero()) {
            return Err(OptimizeError::InvalidOption(format!(
                "Nelder-Mead initial_simplex_scale must be positive, got {}",
                self.initial_simplex_scale
            )));
        }
        Ok(())
    }
}

/// The Nelder–Mead method
///
/// Also known as the downhill simplex method, amoeba method, or polytope method.
/// This well-known method requires no gradients, but will generally be slower
/// than those methods that do. Note also, that while this method has seen
/// much empirical success in applications, there is not much theory
/// describing when and if this method will converge to a minima. See
/// [Wikipedia](https://en.wikipedia.org/wiki/Nelder%E2%80%93Mead_method)
/// for more info.
///
/// The initial simplex is $`x_0`$ plus the points
/// $`x_0 + h_ie_i`$ with $`h_i = \text{scale}\cdot\max(|x_{0,i}|, 1)`$.
/// The run converges with [`ConvergenceReason::Function`] once the standard
/// deviation of the vertex values drops below `func_tol`, or with
/// [`ConvergenceReason::Step`] once every vertex lies within `step_tol` of
/// the best one. The gradient tolerance is not used, and the result carries
/// no gradient.
pub fn nelder_mead<A: NdFloat>(
    problem: &Problem<'_, A>,
    x0: ArrayView1<A>,
    opts: &NelderMeadOptions<A>,
) -> OptimizeResult<A> {
    if let Err(err) = opts.validate() {
        return OptimizeResult::rejected(problem, x0, err);
    }
    let base = &opts.base;
    let start = problem.counts();
    let n = x0.len();
    let (alpha, gamma, rho, sigma) = (opts.alpha, opts.gamma, opts.rho, opts.sigma);

    // NaN ranks last
    let func = |x: ArrayView1<A>| {
        let v = problem.value(x);
        if v.is_nan() {
            A::infinity()
        } else {
            v
        }
    };

    // Initialize the simplex
    let mut simplex = Array2::<A>::zeros((n + 1, n));
    for mut row in simplex.outer_iter_mut() {
        row.assign(&x0);
    }
    for k in 0..n {
        simplex[[k + 1, k]] += opts.initial_simplex_scale * x0[k].abs().max(A::one());
    }

    // the idea here is that we don't want to sort the simplex
    // because it could be large, just sort the indexes and use them
    let mut fvals: Vec<A> = simplex.outer_iter().map(&func).collect();
    let mut ranked_indices: Vec<usize> = (0..=n).collect(); // len n+1
    let rank = |ranked: &mut Vec<usize>, fvals: &[A]| {
        ranked.sort_by(|&x, &y| fvals[x].partial_cmp(&fvals[y]).unwrap_or(Ordering::Equal));
    };

    let count = lit::<A>((n + 1) as f64);
    for iteration in 0..base.max_iterations {
        rank(&mut ranked_indices, &fvals);
        let low_index = ranked_indices[0];
        let high_index = ranked_indices[n];

        let mean = fvals.iter().fold(A::zero(), |acc, &f| acc + f) / count;
        let spread = (fvals.iter().fold(A::zero(), |acc, &f| acc + (f - mean) * (f - mean)) / count).sqrt();
        let diameter = simplex
            .outer_iter()
            .fold(A::zero(), |acc, row| acc.max(norm(&(&row - &simplex.row(low_index)))));
        let reason = if spread < base.func_tol {
            Some(ConvergenceReason::Function)
        } else if diameter < base.step_tol {
            Some(ConvergenceReason::Step)
        } else {
            None
        };
        log::trace!("nelder-mead: iter {} f = {:e} spread = {:e}", iteration, fvals[low_index], spread);
        if let Some(reason) = reason {
            return OptimizeResult::new(
                simplex.row(low_index).to_owned(),
                fvals[low_index],
                None,
                iteration,
                problem.calls_since(start),
                reason.into(),
            );
        }

        // Compute the lower simplex centroid (aka average) p_bar
        let p_bar = ranked_indices[..n]
            .iter()
            .fold(Array1::<A>::zeros(n), |acc, &ii| acc + simplex.row(ii))
            / lit::<A>(n as f64);
        let p_high = simplex.row(high_index).to_owned();
        let toward = |coef: A| &p_bar + &((&p_bar - &p_high) * coef);

        let p_reflect = toward(alpha);
        let f_reflect = func(p_reflect.view());
        let f_low = fvals[low_index];
        let f_next = fvals[ranked_indices[n - 1]];
        let f_high = fvals[high_index];

        let replacement = if f_reflect < f_low {
            // Was the refection amazing? Perform Simplex expansion
            let p_expand = toward(gamma);
            let f_expand = func(p_expand.view());
            if f_expand < f_reflect {
                Some((p_expand, f_expand))
            } else {
                Some((p_reflect, f_reflect))
            }
        } else if f_reflect < f_next {
            // Ehh, Good enough
            Some((p_reflect, f_reflect))
        } else if f_reflect < f_high {
            // could be worse, outside contraction
            let p_contract = toward(rho);
            let f_contract = func(p_contract.view());
            if f_contract <= f_reflect {
                Some((p_contract, f_contract))
            } else {
                None
            }
        } else {
            // well that reflection was the worst, inside contraction
            let p_contract = toward(-rho);
            let f_contract = func(p_contract.view());
            if f_contract < f_high {
                Some((p_contract, f_contract))
            } else {
                None
            }
        };

        match replacement {
            Some((p, f)) => {
                simplex.row_mut(high_index).assign(&p);
                fvals[high_index] = f;
            }
            None => {
                // Contraction failed, shrink all but the best one toward it
                log::debug!("nelder-mead: shrinking simplex at iteration {}", iteration);
                let best = simplex.row(low_index).to_owned();
                for &ii in ranked_indices[1..].iter() {
                    let new_p = &(&simplex.row(ii) - &best) * sigma + &best;
                    simplex.row_mut(ii).assign(&new_p);
                    fvals[ii] = func(simplex.row(ii));
                }
            }
        }
    }

    rank(&mut ranked_indices, &fvals);
    let low_index = ranked_indices[0];
    OptimizeResult::new(
        simplex.row(low_index).to_owned(),
        fvals[low_index],
        None,
        base.max_iterations,
        problem.calls_since(start),
        ConvergenceReason::MaxIterations.into(),
    )
}

/// Golden Section Search
///
/// Minimizes a scalar function _func_ by iteratively dividing an interval
/// given by _a_, _b_ into successively smaller itervals given by the
/// golden ratio. See
/// [Wikipedia](https://en.wikipedia.org/wiki/Golden-section_search)
/// for more info.
///
/// _func_ should be unimodal on the interval; otherwise some local minimum
/// is returned. A non-positive _tol_ is raised to machine precision.
pub fn golden_section<A>(func: impl Fn(A) -> A, a: A, b: A, tol: A) -> A
where
    A: NdFloat,
{
    // 1 / phi = 0.61803398875 = phi - 1 = (sqrt(5) - 1)/2
    let invphi = lit::<A>((5.0_f64.sqrt() - 1.) / 2.);
    // 1 / phi^2 = 0.38196601125 = 2 - phi = 1 - invphi = (3 - sqrt(5))/2
    let invphi2 = lit::<A>((3. - 5.0_f64.sqrt()) / 2.);

    let (mut a, b) = if a < b { (a, b) } else { (b, a) };
    let mut width = b - a;
    let tol = tol.max(A::epsilon() * width.max(A::one()));
    if width <= tol {
        return (a + b) / lit(2.);
    }

    // Required steps to achieve tolerance
    let n = (tol / width).log(invphi).ceil().to_usize().unwrap_or(0);

    let mut c = a + invphi2 * width;
    let mut d = a + invphi * width;
    let mut f_c = func(c);
    let mut f_d = func(d);

    for _iter in 0..n {
        if f_c < f_d {
            // b = d; never used
            d = c;
            f_d = f_c;
            width = invphi * width;
            c = a + invphi2 * width;
            f_c = func(c);
        } else {
            a = c;
            c = d;
            f_c = f_d;
            width = invphi * width;
            d = a + invphi * width;
            f_d = func(d);
        }
    }

    if f_c < f_d {
        c
    } else {
        d
    }
}

/// Options for [`brent`]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BrentOptions<A> {
    /// Relative tolerance on the minimizer (default $`\sqrt{\epsilon}`$)
    pub rel_tol: A,
    /// Absolute tolerance on the minimizer (default `1e-10`)
    pub abs_tol: A,
    /// Default `500`
    pub max_iterations: usize,
}

impl<A: NdFloat> Default for BrentOptions<A> {
    fn default() -> Self {
        BrentOptions {
            rel_tol: A::epsilon().sqrt(),
            abs_tol: lit(1e-10),
            max_iterations: 500,
        }
    }
}

/// Outcome of a scalar minimization by [`brent`]
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScalarMinimum<A> {
    pub x: A,
    pub fun: A,
    pub iterations: usize,
    pub function_calls: usize,
    /// [`ConvergenceReason::Step`] once the bracket is below tolerance,
    /// [`ConvergenceReason::MaxIterations`] otherwise
    pub reason: ConvergenceReason,
}

impl<A> ScalarMinimum<A> {
    pub fn converged(&self) -> bool {
        self.reason.is_converged()
    }
}

/// Brent's method for a scalar function on $`[a, b]`$
///
/// Combines golden section steps with parabolic interpolation through the
/// three best points, taking the parabolic step only while it falls inside
/// the bracket and shrinks faster than the step before last. Converges
/// superlinearly on smooth functions and never slower than
/// [`golden_section`] otherwise. The run stops once
/// ```math
/// |x - m| \le 2	au - 	frac{1}{2}(b - a), \qquad 	au = 	ext{rel\_tol}\,|x| + 	ext{abs\_tol}
/// ```
/// with $`m`$ the midpoint of the current bracket. The interval may be given
/// in either order.
///
/// References
/// ----------
/// Brent, R. P., "Algorithms for Minimization without Derivatives",
/// Prentice-Hall, 1973. Chapter 5.
pub fn brent<A>(func: impl Fn(A) -> A, a: A, b: A, opts: &BrentOptions<A>) -> ScalarMinimum<A>
where
    A: NdFloat,
{
    let golden = lit::<A>((3. - 5.0_f64.sqrt()) / 2.);
    let half = lit::<A>(0.5);
    let two = lit::<A>(2.);

    let (mut a, mut b) = if a < b { (a, b) } else { (b, a) };
    let mut x = a + golden * (b - a);
    let mut fx = func(x);
    let mut function_calls = 1;
    let (mut w, mut fw) = (x, fx);
    let (mut v, mut fv) = (x, fx);
    // step taken last time and the time before
    let mut d = A::zero();
    let mut e = A::zero();

    for iteration in 0..opts.max_iterations {
        let mid = half * (a + b);
        let tol1 = opts.rel_tol * x.abs() + opts.abs_tol;
        let tol2 = two * tol1;
        if (x - mid).abs() <= tol2 - half * (b - a) {
            return ScalarMinimum {
                x,
                fun: fx,
                iterations: iteration,
                function_calls,
                reason: ConvergenceReason::Step,
            };
        }

        let mut parabolic = false;
        if e.abs() > tol1 {
            let r = (x - w) * (fx - fv);
            let q = (x - v) * (fx - fw);
            let p = (x - v) * q - (x - w) * r;
            let q = two * (q - r);
            let (p, q) = if q > A::zero() { (-p, q) } else { (p, -q) };
            if p.abs() < (half * q * e).abs() && p > q * (a - x) && p < q * (b - x) {
                e = d;
                d = p / q;
                let u = x + d;
                if u - a < tol2 || b - u < tol2 {
                    d = if x < mid { tol1 } else { -tol1 };
                }
                parabolic = true;
            }
        }
        if !parabolic {
            e = if x < mid { b - x } else { a - x };
            d = golden * e;
        }

        let u = if d.abs() >= tol1 {
            x + d
        } else if d > A::zero() {
            x + tol1
        } else {
            x - tol1
        };
        let fu = func(u);
        function_calls += 1;

        if fu <= fx {
            if u < x {
                b = x;
            } else {
                a = x;
            }
            v = w;
            fv = fw;
            w = x;
            fw = fx;
            x = u;
            fx = fu;
        } else {
            if u < x {
                a = u;
            } else {
                b = u;
            }
            if fu <= fw || w == x {
                v = w;
                fv = fw;
                w = u;
                fw = fu;
            } else if fu <= fv || v == x || v == w {
                v = u;
                fv = fu;
            }
        }
    }

    log::debug!("brent: bracket [{}, {}] after {} iterations", a, b, opts.max_iterations);
    ScalarMinimum {
        x,
        fun: fx,
        iterations: opts.max_iterations,
        function_calls,
        reason: ConvergenceReason::MaxIterations,
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::testfns;
    use approx::assert_abs_diff_eq;

    #[test]
    fn nelder_mead_rosenbrock() {
        let func = |x: ArrayView1<f64>| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0].powi(2)).powi(2);
        let p = Problem::new(&func);
        let opts = NelderMeadOptions::new(
            OptimizeOptions::default()
                .with_max_iterations(5000)
                .with_func_tol(1e-14)
                .with_step_tol(1e-14),
        );
        let res = nelder_mead(&p, array![3.0, -8.3].view(), &opts);
        assert!(res.converged, "{}", res.message);
        assert_abs_diff_eq!(res.x, array![1.0, 1.0], epsilon = 1e-4);
    }

    #[test]
    fn nelder_mead_berger() {
        #![allow(non_snake_case)]
        // the machine translation example of Berger et al in
        // Computational Linguistics, vol 22, num 1, pp 39--72, 1996.
        let F = array![
            [1., 1., 1.],
            [1., 1., 0.],
            [1., 0., 1.],
            [1., 0., 0.],
            [1., 0., 0.]
        ];
        let K = array![1., 0.3, 0.5];
        let x0 = array![0., 0., 0.];
        let xtrue = array![0., -0.524869316, 0.487525860];
        let func = |x: ArrayView1<f64>| F.dot(&x).mapv_into(|y| y.exp()).sum().ln() - &K.dot(&x);
        let p = Problem::new(&func);
        let opts = NelderMeadOptions::new(OptimizeOptions::default().with_func_tol(1e-14).with_step_tol(1e-10));
        let res = nelder_mead(&p, x0.view(), &opts);
        assert_abs_diff_eq!(res.fun, func(xtrue.view()), epsilon = 1e-6);
        assert_abs_diff_eq!(res.x.slice(s![1..]), xtrue.slice(s![1..]), epsilon = 1e-3);
    }

    #[test]
    fn sphere_reports_no_gradient() {
        let tf = testfns::sphere();
        let p = tf.problem();
        let r = nelder_mead(&p, tf.start.view(), &Default::default());
        assert!(r.converged, "{}", r.message);
        assert!(r.fun < 1e-6);
        assert_abs_diff_eq!(r.x, array![0., 0.], epsilon = 1e-3);
        assert!(r.gradient.is_none());
        assert_eq!(r.gradient_calls, 0);
        assert_eq!(r.function_calls, p.counts().0);
    }

    #[test]
    fn booth() {
        let tf = testfns::booth();
        let r = nelder_mead(&tf.problem_without_derivatives(), tf.start.view(), &Default::default());
        assert!(r.converged, "{}", r.message);
        assert!(r.fun < 1e-6);
    }

    #[test]
    fn respects_max_iterations() {
        let tf = testfns::rosenbrock();
        let opts = NelderMeadOptions::new(OptimizeOptions::default().with_max_iterations(10));
        let r = nelder_mead(&tf.problem(), tf.start.view(), &opts);
        assert_eq!(r.iterations, 10);
        assert!(!r.converged);
        assert!(r.message.contains("maximum iterations"));
    }

    #[test]
    fn flat_function_stops_on_spread() {
        let f = |_x: ArrayView1<f64>| 1.0;
        let r = nelder_mead(&Problem::new(&f), array![0., 0.].view(), &Default::default());
        assert_eq!(r.iterations, 0);
        assert_eq!(r.reason(), Some(ConvergenceReason::Function));
        assert_eq!(r.function_calls, 3);
    }

    #[test]
    fn rejects_bad_coefficients() {
        let tf = testfns::sphere();
        let mut opts = NelderMeadOptions::default();
        opts.sigma = 1.5;
        let r = nelder_mead(&tf.problem(), tf.start.view(), &opts);
        assert!(!r.converged);
        assert!(r.message.starts_with("Invalid options: Nelder-Mead"));
    }

    #[test]
    fn golden_section_quadratic() {
        let func = |x: f64| x.powi(2);
        let min = golden_section(func, 1., 2., 1e-6);
        assert_abs_diff_eq!(min, 1.0, epsilon = 1e-5);

        let min = golden_section(func, -2., -3., 1e-6);
        assert_abs_diff_eq!(min, -2.0, epsilon = 1e-5);

        let min = golden_section(func, -2., 3., 1e-6);
        assert_abs_diff_eq!(min, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn golden_section_shifted() {
        let xtrue = 1.5;
        let func = |x: f32| (x - xtrue).powi(2) - 0.8;
        let min = golden_section(func, 1., 3., 1e-4);
        assert_abs_diff_eq!(min, xtrue, epsilon = 1e-3);

        let min = golden_section(func, -15., 15., 1e-4);
        assert_abs_diff_eq!(min, xtrue, epsilon = 1e-3);
    }

    #[test]
    fn brent_smooth_functions() {
        let opts = BrentOptions::default();
        let r = brent(|x: f64| x * x, -2., 2., &opts);
        assert!(r.converged());
        assert!(r.x.abs() < 1e-8);

        let r = brent(|x: f64| (x - 3.) * (x - 3.), 0., 10., &opts);
        assert!(r.converged());
        assert_abs_diff_eq!(r.x, 3., epsilon = 1e-7);

        let r = brent(|x: f64| -x.sin(), 0., std::f64::consts::PI, &opts);
        assert_abs_diff_eq!(r.x, std::f64::consts::FRAC_PI_2, epsilon = 1e-7);
        assert_abs_diff_eq!(r.fun, -1., epsilon = 1e-10);

        let r = brent(|x: f64| x * x.ln(), 0.1, 3., &opts);
        assert_abs_diff_eq!(r.x, 1. / std::f64::consts::E, epsilon = 1e-6);
    }

    #[test]
    fn brent_beats_golden_section_on_smooth_input() {
        let f = |x: f64| (x - 0.7).powi(2) + 0.1 * (x - 0.7).powi(4);
        let r = brent(f, -4., 5., &Default::default());
        assert!(r.converged());
        assert_abs_diff_eq!(r.x, 0.7, epsilon = 1e-7);
        // golden section needs about 40 evaluations for this bracket and tolerance
        assert!(r.function_calls < 30, "{} evaluations", r.function_calls);
    }

    #[test]
    fn brent_kink_and_reversed_bracket() {
        let opts = BrentOptions::default();
        let r = brent(|x: f64| x.abs(), -3., 2., &opts);
        assert!(r.converged());
        assert!(r.x.abs() < 1e-7);

        let r = brent(|x: f64| x * x, 2., -2., &opts);
        assert!(r.x.abs() < 1e-8);
    }

    #[test]
    fn brent_iteration_cap() {
        let opts = BrentOptions {
            rel_tol: 1e-15,
            abs_tol: 1e-15,
            max_iterations: 3,
        };
        let r = brent(|x: f64| x * x, -100., 100., &opts);
        assert!(!r.converged());
        assert_eq!(r.reason, ConvergenceReason::MaxIterations);
        assert_eq!(r.iterations, 3);
        assert_eq!(r.function_calls, 4);
    }

    #[test]
    fn golden_section_degenerate_interval() {
        assert_abs_diff_eq!(golden_section(|x: f64| x * x, 2., 2., 1e-8), 2.);
        assert_abs_diff_eq!(golden_section(|x: f64| (x - 0.25).abs(), 0., 1., 0.), 0.25, epsilon = 1e-12);
    }
}
