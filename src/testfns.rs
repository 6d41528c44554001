//! Reference test functions with known minima
//!
//! The usual two dimensional benchmark suite, each with an analytic gradient
//! and a conventional starting point. See
//! [Wikipedia](https://en.wikipedia.org/wiki/Test_functions_for_optimization)
//! for plots and the closed form minima.

use ndarray::prelude::*;

use crate::problem::Problem;

/// A benchmark objective with its documented minimum
#[derive(Debug, Clone)]
pub struct TestFunction {
    pub name: &'static str,
    pub dimensions: usize,
    pub f: fn(ArrayView1<f64>) -> f64,
    pub gradient: fn(ArrayView1<f64>) -> Array1<f64>,
    /// Closed form Hessian, where it is short enough to write down
    pub hessian: Option<fn(ArrayView1<f64>) -> Array2<f64>>,
    pub minimum_at: Array1<f64>,
    pub minimum_value: f64,
    pub start: Array1<f64>,
}

impl TestFunction {
    /// Problem with the analytic gradient, and the Hessian if known
    pub fn problem(&self) -> Problem<'_, f64> {
        let p = Problem::new(&self.f).with_gradient(&self.gradient);
        match &self.hessian {
            Some(h) => p.with_hessian(h),
            None => p,
        }
    }

    /// Problem with only the objective; derivatives by finite differences
    pub fn problem_without_derivatives(&self) -> Problem<'_, f64> {
        Problem::new(&self.f)
    }
}

/// $`f(x) = x_1^2 + x_2^2`$
pub fn sphere() -> TestFunction {
    TestFunction {
        name: "Sphere",
        dimensions: 2,
        f: |x| x.dot(&x),
        gradient: |x| 2. * &x,
        hessian: Some(|x: ArrayView1<f64>| Array2::eye(x.len()) * 2.),
        minimum_at: array![0., 0.],
        minimum_value: 0.,
        start: array![5., 5.],
    }
}

/// $`f(x) = (x_1 + 2x_2 - 7)^2 + (2x_1 + x_2 - 5)^2`$
pub fn booth() -> TestFunction {
    TestFunction {
        name: "Booth",
        dimensions: 2,
        f: |x| {
            let a = x[0] + 2. * x[1] - 7.;
            let b = 2. * x[0] + x[1] - 5.;
            a * a + b * b
        },
        gradient: |x| array![10. * x[0] + 8. * x[1] - 34., 8. * x[0] + 10. * x[1] - 38.],
        hessian: Some(|_x: ArrayView1<f64>| array![[10., 8.], [8., 10.]]),
        minimum_at: array![1., 3.],
        minimum_value: 0.,
        start: array![0., 0.],
    }
}

/// $`f(x) = (1 - x_1)^2 + 100(x_2 - x_1^2)^2`$
pub fn rosenbrock() -> TestFunction {
    TestFunction {
        name: "Rosenbrock",
        dimensions: 2,
        f: |x| {
            let a = 1. - x[0];
            let b = x[1] - x[0] * x[0];
            a * a + 100. * b * b
        },
        gradient: |x| {
            let b = x[1] - x[0] * x[0];
            array![-2. * (1. - x[0]) - 400. * x[0] * b, 200. * b]
        },
        hessian: Some(|x: ArrayView1<f64>| {
            array![
                [2. - 400. * x[1] + 1200. * x[0] * x[0], -400. * x[0]],
                [-400. * x[0], 200.]
            ]
        }),
        minimum_at: array![1., 1.],
        minimum_value: 0.,
        start: array![-1.2, 1.],
    }
}

/// $`f(x) = (1.5 - x_1 + x_1x_2)^2 + (2.25 - x_1 + x_1x_2^2)^2 + (2.625 - x_1 + x_1x_2^3)^2`$
pub fn beale() -> TestFunction {
    TestFunction {
        name: "Beale",
        dimensions: 2,
        f: |x| {
            let (u, v) = (x[0], x[1]);
            let a = 1.5 - u + u * v;
            let b = 2.25 - u + u * v * v;
            let c = 2.625 - u + u * v * v * v;
            a * a + b * b + c * c
        },
        gradient: |x| {
            let (u, v) = (x[0], x[1]);
            let (v2, v3) = (v * v, v * v * v);
            let a = 1.5 - u + u * v;
            let b = 2.25 - u + u * v2;
            let c = 2.625 - u + u * v3;
            array![
                2. * (a * (v - 1.) + b * (v2 - 1.) + c * (v3 - 1.)),
                2. * u * (a + 2. * b * v + 3. * c * v2)
            ]
        },
        hessian: None,
        minimum_at: array![3., 0.5],
        minimum_value: 0.,
        start: array![0., 0.],
    }
}

/// $`f(x) = (x_1^2 + x_2 - 11)^2 + (x_1 + x_2^2 - 7)^2`$
///
/// Has four global minima; [`himmelblau_minima`] lists them all.
pub fn himmelblau() -> TestFunction {
    TestFunction {
        name: "Himmelblau",
        dimensions: 2,
        f: |x| {
            let a = x[0] * x[0] + x[1] - 11.;
            let b = x[0] + x[1] * x[1] - 7.;
            a * a + b * b
        },
        gradient: |x| {
            let a = x[0] * x[0] + x[1] - 11.;
            let b = x[0] + x[1] * x[1] - 7.;
            array![4. * x[0] * a + 2. * b, 2. * a + 4. * x[1] * b]
        },
        hessian: Some(|x: ArrayView1<f64>| {
            let off = 4. * (x[0] + x[1]);
            array![
                [12. * x[0] * x[0] + 4. * x[1] - 42., off],
                [off, 4. * x[0] + 12. * x[1] * x[1] - 26.]
            ]
        }),
        minimum_at: array![3., 2.],
        minimum_value: 0.,
        start: array![0., 0.],
    }
}

pub fn himmelblau_minima() -> [[f64; 2]; 4] {
    [
        [3.0, 2.0],
        [-2.805118, 3.131312],
        [-3.779310, -3.283186],
        [3.584428, -1.848126],
    ]
}

/// Goldstein–Price, minimum $`f(0, -1) = 3`$
///
/// ```math
/// \begin{aligned}
/// f(x) = &\left[1 + (x_1 + x_2 + 1)^2(19 - 14x_1 + 3x_1^2 - 14x_2 + 6x_1x_2 + 3x_2^2)\right] \\
///  &\left[30 + (2x_1 - 3x_2)^2(18 - 32x_1 + 12x_1^2 + 48x_2 - 36x_1x_2 + 27x_2^2)\right]
/// \end{aligned}
/// ```
pub fn goldstein_price() -> TestFunction {
    TestFunction {
        name: "Goldstein-Price",
        dimensions: 2,
        f: |x| {
            let (u, v) = (x[0], x[1]);
            let s = u + v + 1.;
            let q = 19. - 14. * u + 3. * u * u - 14. * v + 6. * u * v + 3. * v * v;
            let t = 2. * u - 3. * v;
            let r = 18. - 32. * u + 12. * u * u + 48. * v - 36. * u * v + 27. * v * v;
            (1. + s * s * q) * (30. + t * t * r)
        },
        gradient: |x| {
            let (u, v) = (x[0], x[1]);
            let s = u + v + 1.;
            let q = 19. - 14. * u + 3. * u * u - 14. * v + 6. * u * v + 3. * v * v;
            let t = 2. * u - 3. * v;
            let r = 18. - 32. * u + 12. * u * u + 48. * v - 36. * u * v + 27. * v * v;
            let a = 1. + s * s * q;
            let b = 30. + t * t * r;

            // dq/du == dq/dv
            let dq = -14. + 6. * u + 6. * v;
            let da = 2. * s * q + s * s * dq;
            let db_du = 4. * t * r + t * t * (-32. + 24. * u - 36. * v);
            let db_dv = -6. * t * r + t * t * (48. - 36. * u + 54. * v);
            array![da * b + a * db_du, da * b + a * db_dv]
        },
        hessian: None,
        minimum_at: array![0., -1.],
        minimum_value: 3.,
        start: array![0., -0.5],
    }
}

/// Every reference function, in increasing order of difficulty
pub fn all() -> Vec<TestFunction> {
    vec![
        sphere(),
        booth(),
        rosenbrock(),
        beale(),
        himmelblau(),
        goldstein_price(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finite_diff::{central_diff_gradient, finite_diff_hessian};
    use approx::assert_abs_diff_eq;

    #[test]
    fn minima_are_stationary() {
        for tf in all() {
            let x = tf.minimum_at.view();
            assert_abs_diff_eq!((tf.f)(x), tf.minimum_value, epsilon = 1e-10);
            assert_abs_diff_eq!((tf.gradient)(x), Array1::zeros(tf.dimensions), epsilon = 1e-9);
        }
        for m in himmelblau_minima().iter() {
            let x = arr1(m);
            assert_abs_diff_eq!((himmelblau().f)(x.view()), 0., epsilon = 1e-9);
        }
    }

    #[test]
    fn gradients_match_finite_differences() {
        let points = [array![0.3, -0.7], array![-1.1, 0.4], array![1.5, 1.2]];
        for tf in all() {
            for x in points.iter() {
                let exact = (tf.gradient)(x.view());
                let numeric = central_diff_gradient(tf.f, x.view());
                let scale = exact.iter().fold(1f64, |m, g| m.max(g.abs()));
                assert_abs_diff_eq!(exact, numeric, epsilon = 1e-6 * scale);
            }
        }
    }

    #[test]
    fn hessians_match_finite_differences() {
        let x = array![0.3, -0.7];
        for tf in all() {
            if let Some(h) = tf.hessian {
                let exact = h(x.view());
                let numeric = finite_diff_hessian(tf.f, x.view());
                assert_abs_diff_eq!(exact, numeric, epsilon = 1e-3);
            }
        }
    }
}
