//! Finite difference derivatives
//!
//! Used whenever a [`Problem`](crate::Problem) has no analytic gradient or
//! Hessian. Step sizes are relative, $`h_i = \epsilon^{p} \max(|x_i|, 1)`$,
//! with the power $`p`$ chosen per scheme to balance truncation and rounding
//! error.

use std::fmt;
use std::str::FromStr;

use ndarray::prelude::*;
use ndarray::NdFloat;

use crate::error::{OptimizeError, Result};
use crate::vecops::{lit, norm};

/// Finite difference scheme for approximating gradients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FiniteDiff {
    /// $`n+1`$ evaluations, error $`O(\sqrt\epsilon)`$
    Forward,
    /// $`2n`$ evaluations, error $`O(\epsilon^{2/3})`$
    Central,
}

impl Default for FiniteDiff {
    fn default() -> Self {
        FiniteDiff::Forward
    }
}

impl FromStr for FiniteDiff {
    type Err = OptimizeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "forward" => Ok(FiniteDiff::Forward),
            "central" => Ok(FiniteDiff::Central),
            other => Err(OptimizeError::UnknownFiniteDifference(other.to_string())),
        }
    }
}

impl fmt::Display for FiniteDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FiniteDiff::Forward => f.write_str("forward"),
            FiniteDiff::Central => f.write_str("central"),
        }
    }
}

impl FiniteDiff {
    /// Approximate $`\nabla f(x)`$ with this scheme
    pub fn gradient<A, F>(self, f: F, x: ArrayView1<A>) -> Array1<A>
    where
        A: NdFloat,
        F: Fn(ArrayView1<A>) -> A,
    {
        match self {
            FiniteDiff::Forward => forward_diff_gradient(f, x),
            FiniteDiff::Central => central_diff_gradient(f, x),
        }
    }

    /// Objective evaluations spent by [`FiniteDiff::gradient`] in `n` dimensions
    pub fn cost(self, n: usize) -> usize {
        match self {
            FiniteDiff::Forward => n + 1,
            FiniteDiff::Central => 2 * n,
        }
    }
}

fn fourth_root_eps<A: NdFloat>() -> A {
    A::epsilon().sqrt().sqrt()
}

/// Forward difference gradient
///
/// ```math
/// g_i = \frac{f(x + h_i e_i) - f(x)}{h_i}, \qquad h_i = \sqrt{\epsilon}\max(|x_i|, 1)
/// ```
pub fn forward_diff_gradient<A, F>(f: F, x: ArrayView1<A>) -> Array1<A>
where
    A: NdFloat,
    F: Fn(ArrayView1<A>) -> A,
{
    let fx = f(x);
    let sqrt_eps = A::epsilon().sqrt();
    let mut xp = x.to_owned();
    let mut grad = Array1::zeros(x.len());
    for i in 0..x.len() {
        let h = sqrt_eps * x[i].abs().max(A::one());
        xp[i] = x[i] + h;
        grad[i] = (f(xp.view()) - fx) / h;
        xp[i] = x[i];
    }
    grad
}

/// Central difference gradient
///
/// ```math
/// g_i = \frac{f(x + h_i e_i) - f(x - h_i e_i)}{2h_i}, \qquad h_i = \sqrt[3]{\epsilon}\max(|x_i|, 1)
/// ```
pub fn central_diff_gradient<A, F>(f: F, x: ArrayView1<A>) -> Array1<A>
where
    A: NdFloat,
    F: Fn(ArrayView1<A>) -> A,
{
    let cbrt_eps = A::epsilon().cbrt();
    let two = lit::<A>(2.);
    let mut xp = x.to_owned();
    let mut grad = Array1::zeros(x.len());
    for i in 0..x.len() {
        let h = cbrt_eps * x[i].abs().max(A::one());
        xp[i] = x[i] + h;
        let fp = f(xp.view());
        xp[i] = x[i] - h;
        let fm = f(xp.view());
        xp[i] = x[i];
        grad[i] = (fp - fm) / (two * h);
    }
    grad
}

/// Central difference Hessian
///
/// Diagonal entries use the three point second difference, off-diagonal
/// entries the four point mixed difference, mirrored so the result is
/// exactly symmetric. Step $`h_i = \epsilon^{1/4}\max(|x_i|, 1)`$.
/// Costs $`1 + 2n + 2n(n-1)`$ objective evaluations.
pub fn finite_diff_hessian<A, F>(f: F, x: ArrayView1<A>) -> Array2<A>
where
    A: NdFloat,
    F: Fn(ArrayView1<A>) -> A,
{
    let n = x.len();
    let two = lit::<A>(2.);
    let four = lit::<A>(4.);
    let h: Array1<A> = x.mapv(|xi| fourth_root_eps::<A>() * xi.abs().max(A::one()));
    let fx = f(x);
    let mut xp = x.to_owned();
    let mut hess = Array2::zeros((n, n));

    for i in 0..n {
        xp[i] = x[i] + h[i];
        let fp = f(xp.view());
        xp[i] = x[i] - h[i];
        let fm = f(xp.view());
        xp[i] = x[i];
        hess[[i, i]] = (fp - two * fx + fm) / (h[i] * h[i]);
    }

    for i in 0..n {
        for j in (i + 1)..n {
            xp[i] = x[i] + h[i];
            xp[j] = x[j] + h[j];
            let fpp = f(xp.view());
            xp[j] = x[j] - h[j];
            let fpm = f(xp.view());
            xp[i] = x[i] - h[i];
            let fmm = f(xp.view());
            xp[j] = x[j] + h[j];
            let fmp = f(xp.view());
            xp[i] = x[i];
            xp[j] = x[j];

            let hij = (fpp - fpm - fmp + fmm) / (four * h[i] * h[j]);
            hess[[i, j]] = hij;
            hess[[j, i]] = hij;
        }
    }
    hess
}

/// Objective evaluations spent by [`finite_diff_hessian`] in `n` dimensions
pub fn hessian_cost(n: usize) -> usize {
    1 + 2 * n + 2 * n * n.saturating_sub(1)
}

/// Hessian-vector product from one extra gradient evaluation
///
/// ```math
/// Hv \approx \frac{\nabla f(x + hv) - \nabla f(x)}{h}, \qquad h = \epsilon^{1/4}\max(\|v\|_2, 1)
/// ```
/// `gx` must be $`\nabla f(x)`$.
pub fn hessian_vector_product<A, G>(grad: G, x: ArrayView1<A>, v: ArrayView1<A>, gx: ArrayView1<A>) -> Array1<A>
where
    A: NdFloat,
    G: Fn(ArrayView1<A>) -> Array1<A>,
{
    let h = fourth_root_eps::<A>() * norm(&v).max(A::one());
    let mut xh = x.to_owned();
    xh.scaled_add(h, &v);
    let gh = grad(xh.view());
    (gh - &gx) / h
}

/// Build a gradient closure for `f` from a scheme name
///
/// `method` is `"forward"` or `"central"`; anything else is an
/// [`OptimizeError::UnknownFiniteDifference`].
pub fn make_gradient<'a, A, F>(f: F, method: &str) -> Result<Box<dyn Fn(ArrayView1<A>) -> Array1<A> + 'a>>
where
    A: NdFloat,
    F: Fn(ArrayView1<A>) -> A + 'a,
{
    let scheme: FiniteDiff = method.parse()?;
    Ok(Box::new(move |x: ArrayView1<A>| scheme.gradient(&f, x)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testfns;
    use approx::assert_abs_diff_eq;
    use std::cell::Cell;

    fn sphere(x: ArrayView1<f64>) -> f64 {
        x.dot(&x)
    }

    #[test]
    fn forward_sphere() {
        let g = forward_diff_gradient(sphere, array![3., 4.].view());
        assert_abs_diff_eq!(g, array![6., 8.], epsilon = 1e-6);
        let g = forward_diff_gradient(sphere, array![0., 0.].view());
        assert_abs_diff_eq!(g, array![0., 0.], epsilon = 1e-7);
    }

    #[test]
    fn central_is_more_accurate() {
        let rosen = testfns::rosenbrock();
        let x = array![-1.2, 1.0];
        let exact = array![-215.6, -88.0];
        let fwd = forward_diff_gradient(rosen.f, x.view());
        let cen = central_diff_gradient(rosen.f, x.view());
        assert_abs_diff_eq!(fwd, exact, epsilon = 1e-4);
        assert_abs_diff_eq!(cen, exact, epsilon = 1e-6);
    }

    #[test]
    fn gradient_matches_analytic_beale() {
        let beale = testfns::beale();
        let x = array![1.0, 0.25];
        let analytic = (beale.gradient)(x.view());
        assert_abs_diff_eq!(forward_diff_gradient(beale.f, x.view()), analytic, epsilon = 1e-4);
        assert_abs_diff_eq!(central_diff_gradient(beale.f, x.view()), analytic, epsilon = 1e-7);
    }

    #[test]
    fn evaluation_counts() {
        let calls = Cell::new(0);
        let f = |x: ArrayView1<f64>| {
            calls.set(calls.get() + 1);
            x.sum()
        };
        let x = array![1., 2., 3.];
        forward_diff_gradient(f, x.view());
        assert_eq!(calls.get(), FiniteDiff::Forward.cost(3));
        calls.set(0);
        central_diff_gradient(f, x.view());
        assert_eq!(calls.get(), FiniteDiff::Central.cost(3));
        calls.set(0);
        finite_diff_hessian(f, x.view());
        assert_eq!(calls.get(), hessian_cost(3));
    }

    #[test]
    fn hessian_of_rosenbrock() {
        let rosen = testfns::rosenbrock();
        let x = array![1.0, 1.0];
        let h = finite_diff_hessian(rosen.f, x.view());
        let exact = array![[802., -400.], [-400., 200.]];
        assert_abs_diff_eq!(h, exact, epsilon = 1e-2);
        assert_eq!(h[[0, 1]], h[[1, 0]]);
    }

    #[test]
    fn hessian_vector_product_quadratic() {
        // f = x^T A x / 2 with A = [[3, 1], [1, 2]]
        let grad = |x: ArrayView1<f64>| array![3. * x[0] + x[1], x[0] + 2. * x[1]];
        let x = array![0.5, -1.0];
        let v = array![1.0, 2.0];
        let gx = grad(x.view());
        let hv = hessian_vector_product(grad, x.view(), v.view(), gx.view());
        assert_abs_diff_eq!(hv, array![5.0, 5.0], epsilon = 1e-6);
    }

    #[test]
    fn factory() {
        let g = make_gradient(sphere, "central").unwrap();
        assert_abs_diff_eq!(g(array![3., 4.].view()), array![6., 8.], epsilon = 1e-8);
        let g = make_gradient(sphere, "forward").unwrap();
        assert_abs_diff_eq!(g(array![3., 4.].view()), array![6., 8.], epsilon = 1e-6);

        match make_gradient(sphere, "backward") {
            Err(OptimizeError::UnknownFiniteDifference(name)) => assert_eq!(name, "backward"),
            _ => panic!("expected an unknown method error"),
        }
    }
}
