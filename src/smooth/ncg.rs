use crate::error::{OptimizeError, Result};
use crate::linesearch::{hager_zhang, HagerZhangOptions};
use crate::problem::Problem;
use crate::result::{check_convergence, ConvergenceReason, OptimizeOptions, OptimizeResult};
use crate::vecops::{lit, negate, norm};
use ndarray::prelude::*;
use ndarray::NdFloat;

/// Choice of update of $`\beta`$ for conjugate gradient
///
/// All methods are equivalent on a quadratic problem with exact line
/// searches, but represent different relaxations for non-quadratic problems.
/// Below $`y = g_{k+1} - g_k`$ and $`d = d_k`$.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Gamma {
    /// ```math
    /// \beta = \frac{ \langle y, g_{k+1} \rangle}{\langle y, d \rangle }
    /// ```
    HestenesStiefel,

    /// Clamped at zero (PR+)
    /// ```math
    /// \beta = \max\left(0, \frac{ \langle y, g_{k+1} \rangle}{\langle g_k, g_k \rangle }\right)
    /// ```
    PolakRibiere,

    /// ```math
    /// \beta = \frac{ \langle g_{k+1}, g_{k+1} \rangle}{\langle y, d \rangle }
    /// ```
    DaiYuan,

    /// ```math
    /// \beta = \frac{ \langle g_{k+1}, g_{k+1} \rangle}{\langle g_k, g_k \rangle }
    /// ```
    FletcherReeves,

    /// Bounded below by $`\eta_k = -1/(\|d\|\min(\eta, \|g_k\|))`$
    /// ```math
    /// \beta = \max\left(\eta_k, \frac{ \langle y - 2d\|y\|^2/\langle d, y \rangle, g_{k+1} \rangle}{\langle d, y \rangle }\right)
    /// ```
    HagerZhang,
}

impl Default for Gamma {
    fn default() -> Self {
        Gamma::HagerZhang
    }
}

impl Gamma {
    /// $`\beta`$ for the step from `g_old` to `g_new` along `d`
    ///
    /// Returns zero whenever the denominator vanishes.
    pub fn beta<A: NdFloat>(self, g_new: &Array1<A>, g_old: &Array1<A>, d: &Array1<A>, eta: A) -> A {
        let tiny = lit::<A>(1e-30);
        let ratio = |num: A, den: A| if den.abs() < tiny { A::zero() } else { num / den };
        let y = g_new - g_old;
        match self {
            Gamma::HestenesStiefel => ratio(y.dot(g_new), d.dot(&y)),
            Gamma::PolakRibiere => ratio(y.dot(g_new), g_old.dot(g_old)).max(A::zero()),
            Gamma::DaiYuan => ratio(g_new.dot(g_new), d.dot(&y)),
            Gamma::FletcherReeves => ratio(g_new.dot(g_new), g_old.dot(g_old)),
            Gamma::HagerZhang => {
                let dy = d.dot(&y);
                if dy.abs() < tiny {
                    return A::zero();
                }
                let two = lit::<A>(2.);
                let beta = (y.dot(g_new) - two * y.dot(&y) * d.dot(g_new) / dy) / dy;
                let eta_k = -A::one() / (norm(d) * eta.min(norm(g_old)));
                beta.max(eta_k)
            }
        }
    }
}

/// Options for [`conjugate_gradient`]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CgOptions<A> {
    pub base: OptimizeOptions<A>,
    /// Lower bound parameter of the Hager–Zhang update (default `0.4`)
    pub eta: A,
    /// Restart to steepest descent every this many iterations
    /// (default `None`, meaning the problem dimension)
    pub restart_interval: Option<usize>,
    pub update: Gamma,
    pub line_search: HagerZhangOptions<A>,
}

impl<A: NdFloat> Default for CgOptions<A> {
    fn default() -> Self {
        CgOptions::new(OptimizeOptions::default())
    }
}

impl<A: NdFloat> CgOptions<A> {
    pub fn new(base: OptimizeOptions<A>) -> Self {
        CgOptions {
            base,
            eta: lit(0.4),
            restart_interval: None,
            update: Gamma::default(),
            line_search: HagerZhangOptions::default(),
        }
    }

    pub fn with_update(mut self, update: Gamma) -> Self {
        self.update = update;
        self
    }

    pub fn with_restart_interval(mut self, interval: usize) -> Self {
        self.restart_interval = Some(interval);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.restart_interval == Some(0) {
            return Err(OptimizeError::InvalidOption("CG restart interval must be positive".into()));
        }
        if !(self.eta > A::zero()) {
            return Err(OptimizeError::InvalidOption(format!("CG eta must be positive, got {}", self.eta)));
        }
        Ok(())
    }
}

/// Non-linear Conjugate Gradient with the Hager–Zhang line search
///
/// Algorithm
/// ---------
/// ```math
/// \begin{aligned}
/// x_{k+1} &= x_k + \alpha_k d_k \quad \text{(approximate Wolfe)} \\
/// \beta_k &= \mathrm{gamma\_update}(g_{k+1}, g_k, d_k) \\
/// d_{k+1} &= -g_{k+1} + \beta_k d_k
/// \end{aligned}
/// ```
/// starting from $`d_0 = -g_0`$, where the choice of $`\beta`$ update can be:
/// - [Hestenes-Stiefel ](enum.Gamma.html#variant.HestenesStiefel)
/// - [Polak-Ribiere ](enum.Gamma.html#variant.PolakRibiere)
/// - [Dai-Yuan ](enum.Gamma.html#variant.DaiYuan)
/// - [Fletcher-Reeves ](enum.Gamma.html#variant.FletcherReeves)
/// - [Hager-Zhang ](enum.Gamma.html#variant.HagerZhang) (default)
///
/// The direction restarts at $`-g_{k+1}`$ every `restart_interval`
/// iterations, and whenever $`d_{k+1}`$ fails to be a descent direction.
///
/// Parameters
/// ----------
/// - __problem:__   objective, with optional analytic gradient
/// - __x0:__        initial guess
/// - __opts:__      stopping criteria, $`\beta`$ update and restart policy
pub fn conjugate_gradient<A: NdFloat>(
    problem: &Problem<'_, A>,
    x0: ArrayView1<A>,
    opts: &CgOptions<A>,
) -> OptimizeResult<A> {
    if let Err(err) = opts.validate() {
        return OptimizeResult::rejected(problem, x0, err);
    }
    let start = problem.counts();
    let restart_interval = opts.restart_interval.unwrap_or_else(|| x0.len().max(1));
    let base = &opts.base;

    let mut x = x0.to_owned();
    let mut fx = problem.value(x.view());
    let mut g = problem.gradient(x.view());
    if norm(&g) < base.grad_tol {
        return OptimizeResult::new(x, fx, Some(g), 0, problem.calls_since(start), ConvergenceReason::Gradient.into());
    }
    let mut dir = negate(&g);

    for iter in 1..=base.max_iterations {
        let ls = hager_zhang(problem, x.view(), dir.view(), fx, g.view(), &opts.line_search);
        if !ls.success {
            log::warn!("conjugate gradient: line search failed at iteration {}", iter);
            return OptimizeResult::new(
                x,
                fx,
                Some(g),
                iter,
                problem.calls_since(start),
                ConvergenceReason::LineSearchFailed.into(),
            );
        }

        // Take step
        let step = dir.mapv(|e| e * ls.alpha);
        x += &step;
        let g_new = match ls.g_new {
            Some(g_new) => g_new,
            None => problem.gradient(x.view()),
        };
        let func_change = (fx - ls.f_new).abs();
        fx = ls.f_new;

        let grad_norm = norm(&g_new);
        log::trace!("conjugate gradient: iter {} f = {:e} |g| = {:e}", iter, fx, grad_norm);
        if let Some(reason) = check_convergence(grad_norm, norm(&step), func_change, iter, base) {
            return OptimizeResult::new(x, fx, Some(g_new), iter, problem.calls_since(start), reason.into());
        }

        // Compute conjugate direction
        let beta = opts.update.beta(&g_new, &g, &dir, opts.eta);
        dir *= beta;
        dir -= &g_new;
        if iter % restart_interval == 0 || dir.dot(&g_new) >= A::zero() {
            log::debug!("conjugate gradient: restart at iteration {}", iter);
            dir = negate(&g_new);
        }
        g = g_new;
    }

    OptimizeResult::new(
        x,
        fx,
        Some(g),
        base.max_iterations,
        problem.calls_since(start),
        ConvergenceReason::MaxIterations.into(),
    )
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::testfns;
    use approx::assert_abs_diff_eq;
    use ndarray_rand::rand::rngs::StdRng;
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Normal;
    use ndarray_rand::RandomExt;

    #[test]
    fn ncg_simple_regression() {
        let A = array![[10., 0.], [0., 20.]];
        let y = array![50., 100.];
        let f = |x: ArrayView1<f64>| {
            let r = A.dot(&x) - &y;
            0.5 * r.dot(&r)
        };
        let g = |x: ArrayView1<f64>| A.t().dot(&(A.dot(&x) - &y));
        let p = Problem::new(&f).with_gradient(&g);
        let r = conjugate_gradient(&p, array![19., 44.].view(), &Default::default());
        assert!(r.converged, "{}", r.message);
        assert_abs_diff_eq!(r.x, array![5., 5.], epsilon = 1e-6);
    }

    #[test]
    fn ncg_rand_quadratic() {
        let (M, N) = (40, 30);
        let mut rng = StdRng::seed_from_u64(7);
        let A = Array::random_using((M, N), Normal::new(0., 1.).unwrap(), &mut rng);
        let xtrue = Array::random_using((N,), Normal::new(0., 1.).unwrap(), &mut rng);
        let y = A.dot(&xtrue);
        let f = |x: ArrayView1<f64>| {
            let r = A.dot(&x) - &y;
            0.5 * r.dot(&r)
        };
        let g = |x: ArrayView1<f64>| A.t().dot(&(A.dot(&x) - &y));
        let p = Problem::new(&f).with_gradient(&g);

        let opts = CgOptions::new(OptimizeOptions::default().with_max_iterations(2000));
        let r = conjugate_gradient(&p, Array1::zeros(N).view(), &opts);
        assert!(r.converged, "{}", r.message);
        assert_abs_diff_eq!(A.dot(&r.x), y, epsilon = 1e-4);
    }

    #[test]
    fn every_update_solves_booth() {
        let tf = testfns::booth();
        for &update in &[
            Gamma::HagerZhang,
            Gamma::PolakRibiere,
            Gamma::FletcherReeves,
            Gamma::HestenesStiefel,
            Gamma::DaiYuan,
        ] {
            let opts = CgOptions::default().with_update(update);
            let r = conjugate_gradient(&tf.problem(), tf.start.view(), &opts);
            assert!(r.converged, "{:?}: {}", update, r.message);
            assert_abs_diff_eq!(r.x, array![1., 3.], epsilon = 1e-5);
        }
    }

    #[test]
    fn beta_degenerate_denominator() {
        let g = array![1., 0.];
        let d = array![0., 1.];
        // y = 0 so d'y = 0
        assert_eq!(Gamma::HagerZhang.beta(&g, &g, &d, 0.4), 0.);
        assert_eq!(Gamma::HestenesStiefel.beta(&g, &g, &d, 0.4), 0.);
        assert_eq!(Gamma::DaiYuan.beta(&g, &g, &d, 0.4), 0.);
    }

    #[test]
    fn beta_formulas() {
        let g_old = array![1., 2.];
        let g_new = array![0.5, -1.];
        let d = array![-1., -2.];
        // y = (-0.5, -3), d'y = 6.5, y'g_new = 2.75, |g_new|^2 = 1.25, |g_old|^2 = 5
        assert_abs_diff_eq!(Gamma::HestenesStiefel.beta(&g_new, &g_old, &d, 0.4), 2.75 / 6.5);
        assert_abs_diff_eq!(Gamma::PolakRibiere.beta(&g_new, &g_old, &d, 0.4), 2.75 / 5.);
        assert_abs_diff_eq!(Gamma::DaiYuan.beta(&g_new, &g_old, &d, 0.4), 1.25 / 6.5);
        assert_abs_diff_eq!(Gamma::FletcherReeves.beta(&g_new, &g_old, &d, 0.4), 1.25 / 5.);
        // |y|^2 = 9.25, d'g_new = 1.5
        let hz: f64 = (2.75 - 2. * 9.25 * 1.5 / 6.5) / 6.5;
        let bound = -1. / (5f64.sqrt() * 0.4);
        assert_abs_diff_eq!(Gamma::HagerZhang.beta(&g_new, &g_old, &d, 0.4), hz.max(bound));
    }

    #[test]
    fn rosenbrock() {
        let tf = testfns::rosenbrock();
        let r = conjugate_gradient(&tf.problem(), tf.start.view(), &Default::default());
        assert!(r.converged, "{}", r.message);
        assert_abs_diff_eq!(r.x, array![1., 1.], epsilon = 1e-4);
    }

    #[test]
    fn invalid_restart_interval() {
        let tf = testfns::sphere();
        let opts = CgOptions::default().with_restart_interval(0);
        let r = conjugate_gradient(&tf.problem(), tf.start.view(), &opts);
        assert!(!r.converged);
        assert!(r.message.contains("restart interval"));
    }
}
