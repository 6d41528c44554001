use std::fmt;
use std::str::FromStr;

use ndarray::prelude::*;
use ndarray::{NdFloat, Zip};

use crate::error::{check_len, OptimizeError, Result};
use crate::problem::Problem;
use crate::result::{ConvergenceReason, OptimizeOptions, OptimizeResult, Termination};
use crate::smooth::{bfgs, conjugate_gradient, gradient_descent, lbfgs};
use crate::smooth::{BfgsOptions, CgOptions, GradientDescentOptions, LbfgsOptions};
use crate::vecops::{lit, norm_inf, LinalgFloat};

/// Unconstrained method used for each barrier subproblem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InnerMethod {
    Bfgs,
    LBfgs,
    ConjugateGradient,
    GradientDescent,
}

impl Default for InnerMethod {
    fn default() -> Self {
        InnerMethod::LBfgs
    }
}

impl FromStr for InnerMethod {
    type Err = OptimizeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bfgs" => Ok(InnerMethod::Bfgs),
            "lbfgs" | "l-bfgs" => Ok(InnerMethod::LBfgs),
            "cg" | "conjugate_gradient" | "conjugategradient" => Ok(InnerMethod::ConjugateGradient),
            "gd" | "gradient_descent" | "gradientdescent" => Ok(InnerMethod::GradientDescent),
            _ => Err(OptimizeError::UnknownMethod(s.to_string())),
        }
    }
}

impl fmt::Display for InnerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InnerMethod::Bfgs => "bfgs",
            InnerMethod::LBfgs => "lbfgs",
            InnerMethod::ConjugateGradient => "conjugate_gradient",
            InnerMethod::GradientDescent => "gradient_descent",
        })
    }
}

/// Options for [`fminbox`]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FminboxOptions<A> {
    /// Solver for the barrier subproblems (default L-BFGS)
    pub method: InnerMethod,
    /// Initial barrier weight, chosen from the gradients when `None`
    pub mu0: Option<A>,
    /// Shrink factor of the barrier weight per outer iteration (default `0.001`)
    pub mu_factor: A,
    /// Barrier subproblems solved at most (default `20`)
    pub outer_iterations: usize,
    /// Projected gradient threshold (default `1e-8`)
    pub outer_grad_tol: A,
    /// Stopping criteria of each subproblem
    pub inner: OptimizeOptions<A>,
}

impl<A: NdFloat> Default for FminboxOptions<A> {
    fn default() -> Self {
        FminboxOptions {
            method: InnerMethod::default(),
            mu0: None,
            mu_factor: lit(0.001),
            outer_iterations: 20,
            outer_grad_tol: lit(1e-8),
            inner: OptimizeOptions::default(),
        }
    }
}

impl<A: NdFloat> FminboxOptions<A> {
    pub fn with_method(mut self, method: InnerMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_mu0(mut self, mu0: A) -> Self {
        self.mu0 = Some(mu0);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.mu_factor > A::zero() && self.mu_factor < A::one()) {
            return Err(OptimizeError::InvalidOption(format!(
                "fminbox mu_factor must lie in (0, 1), got {}",
                self.mu_factor
            )));
        }
        if let Some(mu0) = self.mu0 {
            if !(mu0 > A::zero()) {
                return Err(OptimizeError::InvalidOption(format!("fminbox mu0 must be positive, got {}", mu0)));
            }
        }
        Ok(())
    }
}

/// Logarithmic barrier $`-\sum_i \log(x_i - l_i) + \log(u_i - x_i)`$
///
/// Terms with an infinite bound are left out. Outside the box the barrier is
/// $`+\infty`$.
pub fn barrier_value<A: NdFloat>(x: ArrayView1<A>, lower: ArrayView1<A>, upper: ArrayView1<A>) -> A {
    Zip::from(&x).and(&lower).and(&upper).fold(A::zero(), |acc, &xi, &li, &ui| {
        let mut acc = acc;
        if li.is_finite() {
            let dl = xi - li;
            if !(dl > A::zero()) {
                return A::infinity();
            }
            acc = acc - dl.ln();
        }
        if ui.is_finite() {
            let du = ui - xi;
            if !(du > A::zero()) {
                return A::infinity();
            }
            acc = acc - du.ln();
        }
        acc
    })
}

/// Gradient of [`barrier_value`], $`-1/(x_i - l_i) + 1/(u_i - x_i)`$
pub fn barrier_gradient<A: NdFloat>(x: ArrayView1<A>, lower: ArrayView1<A>, upper: ArrayView1<A>) -> Array1<A> {
    Zip::from(&x).and(&lower).and(&upper).map_collect(|&xi, &li, &ui| {
        let mut g = A::zero();
        if li.is_finite() {
            g -= A::one() / (xi - li);
        }
        if ui.is_finite() {
            g += A::one() / (ui - xi);
        }
        g
    })
}

/// $`\|x - \Pi_{[l,u]}(x - g)\|_\infty`$, zero exactly at a KKT point
pub fn projected_gradient_norm<A: NdFloat>(
    x: ArrayView1<A>,
    g: ArrayView1<A>,
    lower: ArrayView1<A>,
    upper: ArrayView1<A>,
) -> A {
    Zip::from(&x).and(&g).and(&lower).and(&upper).fold(A::zero(), |acc, &xi, &gi, &li, &ui| {
        let projected = (xi - gi).max(li).min(ui);
        acc.max((xi - projected).abs())
    })
}

/// Move every coordinate on or outside its bounds strictly inside
fn nudge_inside<A: NdFloat>(x: &mut Array1<A>, lower: ArrayView1<A>, upper: ArrayView1<A>) {
    let near = lit::<A>(0.99);
    let far = lit::<A>(0.01);
    Zip::from(x).and(&lower).and(&upper).for_each(|xi, &li, &ui| {
        let both = li.is_finite() && ui.is_finite();
        if *xi <= li {
            *xi = if both { near * li + far * ui } else { li + A::one() };
        } else if *xi >= ui {
            *xi = if both { far * li + near * ui } else { ui - A::one() };
        }
    });
}

/// Clamp into $`[l + 10^{-15}, u - 10^{-15}]`$ so the barrier stays finite
fn clamp_inside<A: NdFloat>(x: &mut Array1<A>, lower: ArrayView1<A>, upper: ArrayView1<A>) {
    let margin = lit::<A>(1e-15);
    Zip::from(x).and(&lower).and(&upper).for_each(|xi, &li, &ui| {
        if li.is_finite() {
            *xi = (*xi).max(li + margin);
        }
        if ui.is_finite() {
            *xi = (*xi).min(ui - margin);
        }
    });
}

fn run_inner<A: LinalgFloat>(
    method: InnerMethod,
    problem: &Problem<'_, A>,
    x0: ArrayView1<A>,
    opts: OptimizeOptions<A>,
) -> OptimizeResult<A> {
    match method {
        InnerMethod::Bfgs => bfgs(problem, x0, &BfgsOptions::new(opts)),
        InnerMethod::LBfgs => lbfgs(problem, x0, &LbfgsOptions::new(opts)),
        InnerMethod::ConjugateGradient => conjugate_gradient(problem, x0, &CgOptions::new(opts)),
        InnerMethod::GradientDescent => gradient_descent(problem, x0, &GradientDescentOptions::new(opts)),
    }
}

/// Box constrained minimization by a logarithmic barrier
///
/// Solves $`\min f(x)`$ subject to $`l \le x \le u`$ through the sequence of
/// unconstrained subproblems
/// ```math
/// x^{(k+1)} = \argmin_x f(x) + \mu_k B(x), \qquad \mu_{k+1} = \mu_k\,\mu_{factor}
/// ```
/// with $`B`$ the [`barrier_value`], each warm started at $`x^{(k)}`$. The
/// start is first moved strictly inside the box. Unless given, $`\mu_0`$ is
/// `mu_factor` times the ratio of the infinity norms of $`\nabla f`$ and
/// $`\nabla B`$ at the start.
///
/// The run converges when the [`projected_gradient_norm`] of $`f`$ falls to
/// `outer_grad_tol`. A minimizer on the boundary is approached to within
/// about $`\mu_k/|\partial_i f|`$, so it converges once $`\mu_k`$ has
/// shrunk enough. The inner line searches cut their first step back inside
/// the box, which keeps the subproblems moving when the previous solution
/// sits right next to a bound.
///
/// Errors
/// ------
/// [`OptimizeError::DimensionMismatch`] if `x0`, `lower` and `upper` differ
/// in length. Crossed bounds are not an error: the result reports
/// [`Termination::InvalidBounds`] without iterating.
pub fn fminbox<A: LinalgFloat>(
    problem: &Problem<'_, A>,
    x0: ArrayView1<A>,
    lower: ArrayView1<A>,
    upper: ArrayView1<A>,
    opts: &FminboxOptions<A>,
) -> Result<OptimizeResult<A>> {
    check_len(x0.len(), lower.len())?;
    check_len(x0.len(), upper.len())?;
    if let Err(err) = opts.validate() {
        return Ok(OptimizeResult::rejected(problem, x0, err));
    }
    let start = problem.counts();

    if Zip::from(&lower).and(&upper).fold(false, |bad, &l, &u| bad || !(l < u)) {
        log::warn!("fminbox: lower bound not below upper bound");
        let fx = problem.value(x0);
        let g = problem.gradient(x0);
        return Ok(OptimizeResult::new(
            x0.to_owned(),
            fx,
            Some(g),
            0,
            problem.calls_since(start),
            Termination::InvalidBounds,
        ));
    }

    let mut x = x0.to_owned();
    nudge_inside(&mut x, lower, upper);
    let mut fx = problem.value(x.view());
    let mut g = problem.gradient(x.view());

    if projected_gradient_norm(x.view(), g.view(), lower, upper) <= opts.outer_grad_tol {
        return Ok(OptimizeResult::new(
            x,
            fx,
            Some(g),
            0,
            problem.calls_since(start),
            Termination::ProjectedGradient,
        ));
    }

    let mut mu = match opts.mu0 {
        Some(mu0) => mu0,
        None => {
            let barrier_norm = norm_inf(&barrier_gradient(x.view(), lower, upper));
            if barrier_norm > A::zero() {
                opts.mu_factor * norm_inf(&g) / barrier_norm
            } else {
                lit(1e-4)
            }
        }
    };

    for outer in 1..=opts.outer_iterations {
        log::debug!("fminbox: outer iteration {} with mu = {:e}", outer, mu);
        let f_mu = |y: ArrayView1<A>| {
            let b = barrier_value(y, lower, upper);
            if b.is_finite() {
                problem.value(y) + mu * b
            } else {
                A::infinity()
            }
        };
        let g_mu = |y: ArrayView1<A>| problem.gradient(y) + barrier_gradient(y, lower, upper) * mu;
        let inner = Problem::new(&f_mu).with_gradient(&g_mu);

        let sub = run_inner(opts.method, &inner, x.view(), opts.inner);
        if !sub.converged {
            log::debug!("fminbox: subproblem {} ended with \"{}\"", outer, sub.message);
        }
        x = sub.x;
        clamp_inside(&mut x, lower, upper);
        fx = problem.value(x.view());
        g = problem.gradient(x.view());

        let pg = projected_gradient_norm(x.view(), g.view(), lower, upper);
        log::trace!("fminbox: outer {} f = {:e} |Pg| = {:e}", outer, fx, pg);
        if pg <= opts.outer_grad_tol {
            return Ok(OptimizeResult::new(
                x,
                fx,
                Some(g),
                outer,
                problem.calls_since(start),
                Termination::ProjectedGradient,
            ));
        }
        mu = mu * opts.mu_factor;
    }

    Ok(OptimizeResult::new(
        x,
        fx,
        Some(g),
        opts.outer_iterations,
        problem.calls_since(start),
        ConvergenceReason::MaxIterations.into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testfns;
    use approx::assert_abs_diff_eq;

    #[test]
    fn barrier_terms() {
        let l = array![0., f64::NEG_INFINITY];
        let u = array![2., 1.];
        let x = array![1., 0.];
        // -ln(1) - ln(1) - ln(1)
        assert_abs_diff_eq!(barrier_value(x.view(), l.view(), u.view()), 0.);
        assert_abs_diff_eq!(barrier_gradient(x.view(), l.view(), u.view()), array![0., 1.]);
        assert_eq!(barrier_value(array![3., 0.].view(), l.view(), u.view()), f64::INFINITY);
        assert_eq!(barrier_value(array![0., 0.].view(), l.view(), u.view()), f64::INFINITY);
    }

    #[test]
    fn projected_gradient() {
        let l = array![0., 0.];
        let u = array![1., 1.];
        // pushing against the lower bound at x = 0 is stationary
        let pg = projected_gradient_norm(array![0., 0.5].view(), array![3., 0.].view(), l.view(), u.view());
        assert_abs_diff_eq!(pg, 0.);
        let pg = projected_gradient_norm(array![0.5, 0.5].view(), array![0.1, -2.].view(), l.view(), u.view());
        assert_abs_diff_eq!(pg, 0.5);
    }

    #[test]
    fn nudges_start_inside() {
        let l = array![0., 1., f64::NEG_INFINITY];
        let u = array![10., f64::INFINITY, 4.];
        let mut x = array![-1., 1., 7.];
        nudge_inside(&mut x, l.view(), u.view());
        assert_abs_diff_eq!(x, array![0.1, 2., 3.], epsilon = 1e-12);
    }

    #[test]
    fn boundary_minimum() {
        let f = |x: ArrayView1<f64>| x[0] * x[0];
        let g = |x: ArrayView1<f64>| array![2. * x[0]];
        let p = Problem::new(&f).with_gradient(&g);
        let r = fminbox(&p, array![5.].view(), array![2.].view(), array![10.].view(), &Default::default()).unwrap();
        assert!(r.converged, "{}", r.message);
        assert_eq!(r.termination, Termination::ProjectedGradient);
        assert!(r.x[0] > 2. && r.x[0] - 2. <= 1e-8);
        assert_abs_diff_eq!(r.fun, 4., epsilon = 1e-7);
        assert_eq!((r.function_calls, r.gradient_calls), p.counts());
    }

    #[test]
    fn interior_minimum() {
        let tf = testfns::sphere();
        let p = tf.problem();
        let lower = array![-5., -5.];
        let upper = array![5., 5.];
        for method in vec![InnerMethod::Bfgs, InnerMethod::LBfgs, InnerMethod::ConjugateGradient] {
            let opts = FminboxOptions::default().with_method(method);
            let r = fminbox(&p, array![1., 1.].view(), lower.view(), upper.view(), &opts).unwrap();
            assert!(r.converged, "{}: {}", method, r.message);
            assert!(r.fun < 1e-4, "{}: f = {}", method, r.fun);
            assert!(r.x.iter().all(|&xi| xi > -5. && xi < 5.));
        }
    }

    #[test]
    fn rosenbrock_with_active_bound() {
        // unconstrained minimum (1, 1) is cut off by x <= 0.5
        let tf = testfns::rosenbrock();
        let lower = array![-2., -2.];
        let upper = array![0.5, 2.];
        let r = fminbox(&tf.problem(), array![0., 0.].view(), lower.view(), upper.view(), &Default::default()).unwrap();
        assert_abs_diff_eq!(r.x, array![0.5, 0.25], epsilon = 1e-2);
    }

    #[test]
    fn starts_at_stationary_point() {
        let tf = testfns::booth();
        let lower = array![0., 0.];
        let upper = array![5., 5.];
        let r = fminbox(&tf.problem(), tf.minimum_at.view(), lower.view(), upper.view(), &Default::default()).unwrap();
        assert_eq!(r.iterations, 0);
        assert!(r.converged);
        assert_eq!(r.termination, Termination::ProjectedGradient);
    }

    #[test]
    fn crossed_bounds() {
        let tf = testfns::sphere();
        let r = fminbox(
            &tf.problem(),
            tf.start.view(),
            array![0., 1.].view(),
            array![1., 1.].view(),
            &Default::default(),
        )
        .unwrap();
        assert!(!r.converged);
        assert_eq!(r.termination, Termination::InvalidBounds);
        assert!(r.message.starts_with("Invalid bounds"));
        assert_eq!(r.iterations, 0);
        assert_abs_diff_eq!(r.x, tf.start);
    }

    #[test]
    fn mismatched_lengths() {
        let tf = testfns::sphere();
        let err = fminbox(
            &tf.problem(),
            tf.start.view(),
            array![0.].view(),
            array![1., 1.].view(),
            &Default::default(),
        )
        .unwrap_err();
        assert_eq!(err, OptimizeError::DimensionMismatch { expected: 2, found: 1 });
    }

    #[test]
    fn inner_method_names() {
        assert_eq!("L-BFGS".parse::<InnerMethod>().unwrap(), InnerMethod::LBfgs);
        assert_eq!("cg".parse::<InnerMethod>().unwrap(), InnerMethod::ConjugateGradient);
        for method in vec![InnerMethod::Bfgs, InnerMethod::LBfgs, InnerMethod::ConjugateGradient, InnerMethod::GradientDescent] {
            assert_eq!(method.to_string().parse::<InnerMethod>().unwrap(), method);
        }
        assert!(matches!("newton".parse::<InnerMethod>(), Err(OptimizeError::UnknownMethod(_))));
    }
}
