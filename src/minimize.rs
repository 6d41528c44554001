//! Choosing a minimizer at run time
//!
//! Every options struct implements [`Minimizer`], so a configured algorithm
//! can be stored and called without knowing which one it is. [`minimize`]
//! goes one step further and picks the algorithm from a [`Method`] tag,
//! using default algorithm parameters and the caller's stopping criteria.

use std::fmt;
use std::str::FromStr;

use ndarray::prelude::*;
use ndarray::NdFloat;

use crate::direct::{nelder_mead, NelderMeadOptions};
use crate::error::{OptimizeError, Result};
use crate::newton::{krylov_trust_region, newton, newton_trust_region, KrylovOptions, NewtonOptions, TrustRegionOptions};
use crate::problem::Problem;
use crate::result::{OptimizeOptions, OptimizeResult};
use crate::smooth::{bfgs, conjugate_gradient, gradient_descent, lbfgs};
use crate::smooth::{BfgsOptions, CgOptions, GradientDescentOptions, LbfgsOptions};
use crate::vecops::LinalgFloat;

/// A configured minimization algorithm
pub trait Minimizer<A> {
    fn minimize(&self, problem: &Problem<'_, A>, x0: ArrayView1<A>) -> OptimizeResult<A>;
}

macro_rules! impl_minimizer {
    ($($opts:ident => $func:ident),* $(,)?) => {$(
        impl<A: LinalgFloat> Minimizer<A> for $opts<A> {
            fn minimize(&self, problem: &Problem<'_, A>, x0: ArrayView1<A>) -> OptimizeResult<A> {
                $func(problem, x0, self)
            }
        }
    )*};
}

impl_minimizer! {
    NelderMeadOptions => nelder_mead,
    GradientDescentOptions => gradient_descent,
    BfgsOptions => bfgs,
    LbfgsOptions => lbfgs,
    CgOptions => conjugate_gradient,
    NewtonOptions => newton,
    TrustRegionOptions => newton_trust_region,
    KrylovOptions => krylov_trust_region,
}

/// Unconstrained minimization algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Method {
    NelderMead,
    GradientDescent,
    Bfgs,
    LBfgs,
    ConjugateGradient,
    Newton,
    NewtonTrustRegion,
    KrylovTrustRegion,
}

impl Method {
    pub const ALL: [Method; 8] = [
        Method::NelderMead,
        Method::GradientDescent,
        Method::Bfgs,
        Method::LBfgs,
        Method::ConjugateGradient,
        Method::Newton,
        Method::NewtonTrustRegion,
        Method::KrylovTrustRegion,
    ];

    /// BFGS when an analytic gradient is available, Nelder–Mead otherwise
    pub fn default_for<A: NdFloat>(problem: &Problem<'_, A>) -> Method {
        if problem.has_gradient() {
            Method::Bfgs
        } else {
            Method::NelderMead
        }
    }

    /// Does the method evaluate gradients?
    pub fn uses_gradient(self) -> bool {
        self != Method::NelderMead
    }

    /// Run this method with default parameters and the given stopping criteria
    pub fn minimize<A: LinalgFloat>(
        self,
        problem: &Problem<'_, A>,
        x0: ArrayView1<A>,
        options: &OptimizeOptions<A>,
    ) -> OptimizeResult<A> {
        let base = *options;
        match self {
            Method::NelderMead => NelderMeadOptions::new(base).minimize(problem, x0),
            Method::GradientDescent => GradientDescentOptions::new(base).minimize(problem, x0),
            Method::Bfgs => BfgsOptions::new(base).minimize(problem, x0),
            Method::LBfgs => LbfgsOptions::new(base).minimize(problem, x0),
            Method::ConjugateGradient => CgOptions::new(base).minimize(problem, x0),
            Method::Newton => NewtonOptions::new(base).minimize(problem, x0),
            Method::NewtonTrustRegion => TrustRegionOptions::new(base).minimize(problem, x0),
            Method::KrylovTrustRegion => KrylovOptions::new(base).minimize(problem, x0),
        }
    }
}

impl FromStr for Method {
    type Err = OptimizeError;

    /// Case insensitive; `-` and spaces count as `_`
    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase().replace(|c: char| c == '-' || c == ' ', "_");
        match name.as_str() {
            "nelder_mead" | "neldermead" | "simplex" => Ok(Method::NelderMead),
            "gradient_descent" | "gd" | "steepest_descent" => Ok(Method::GradientDescent),
            "bfgs" => Ok(Method::Bfgs),
            "lbfgs" | "l_bfgs" => Ok(Method::LBfgs),
            "cg" | "conjugate_gradient" => Ok(Method::ConjugateGradient),
            "newton" => Ok(Method::Newton),
            "trust_region" | "newton_trust_region" => Ok(Method::NewtonTrustRegion),
            "krylov" | "krylov_trust_region" => Ok(Method::KrylovTrustRegion),
            _ => Err(OptimizeError::UnknownMethod(s.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::NelderMead => "nelder_mead",
            Method::GradientDescent => "gradient_descent",
            Method::Bfgs => "bfgs",
            Method::LBfgs => "lbfgs",
            Method::ConjugateGradient => "conjugate_gradient",
            Method::Newton => "newton",
            Method::NewtonTrustRegion => "newton_trust_region",
            Method::KrylovTrustRegion => "krylov_trust_region",
        })
    }
}

/// Minimize `problem` from `x0`
///
/// With `method = None` the choice is [`Method::default_for`]. Missing
/// derivatives are filled in by finite differences, so any method works on
/// any problem, at a price in objective evaluations.
///
/// ```
/// use ndarray::prelude::*;
/// use ndarray_minimize::{minimize, Method, OptimizeOptions, Problem};
///
/// let f = |x: ArrayView1<f64>| (x[0] - 1.).powi(2) + (x[1] + 2.).powi(2);
/// let g = |x: ArrayView1<f64>| array![2. * (x[0] - 1.), 2. * (x[1] + 2.)];
/// let problem = Problem::new(&f).with_gradient(&g);
///
/// let res = minimize(&problem, array![0., 0.].view(), Some(Method::LBfgs), &OptimizeOptions::default());
/// assert!(res.converged);
/// assert!((res.x[1] + 2.).abs() < 1e-6);
/// ```
pub fn minimize<A: LinalgFloat>(
    problem: &Problem<'_, A>,
    x0: ArrayView1<A>,
    method: Option<Method>,
    options: &OptimizeOptions<A>,
) -> OptimizeResult<A> {
    let method = method.unwrap_or_else(|| Method::default_for(problem));
    log::debug!("minimize: {} in {} dimensions", method, x0.len());
    method.minimize(problem, x0, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testfns;
    use approx::assert_abs_diff_eq;

    #[test]
    fn names_round_trip() {
        for method in Method::ALL.iter() {
            assert_eq!(method.to_string().parse::<Method>().unwrap(), *method);
        }
        assert_eq!("L-BFGS".parse::<Method>().unwrap(), Method::LBfgs);
        assert_eq!("Nelder-Mead".parse::<Method>().unwrap(), Method::NelderMead);
        assert_eq!(
            "simulated_annealing".parse::<Method>(),
            Err(OptimizeError::UnknownMethod("simulated_annealing".into()))
        );
    }

    #[test]
    fn default_depends_on_gradient() {
        let tf = testfns::booth();
        assert_eq!(Method::default_for(&tf.problem()), Method::Bfgs);
        assert_eq!(Method::default_for(&tf.problem_without_derivatives()), Method::NelderMead);
    }

    #[test]
    fn dispatch_reaches_every_method() {
        let tf = testfns::booth();
        let opts = OptimizeOptions::default();
        for &method in Method::ALL.iter() {
            let p = tf.problem();
            let r = minimize(&p, tf.start.view(), Some(method), &opts);
            assert!(r.converged, "{}: {}", method, r.message);
            assert_abs_diff_eq!(r.x, tf.minimum_at, epsilon = 1e-3);
            assert_eq!(r.gradient.is_some(), method.uses_gradient());
        }
    }

    #[test]
    fn default_method_without_gradient() {
        let tf = testfns::sphere();
        let p = tf.problem_without_derivatives();
        let r = minimize(&p, tf.start.view(), None, &OptimizeOptions::default());
        assert!(r.converged);
        assert_eq!(r.gradient_calls, 0);
    }

    #[test]
    fn trait_objects() {
        let tf = testfns::himmelblau();
        let minimizers: Vec<Box<dyn Minimizer<f64>>> = vec![
            Box::new(BfgsOptions::default()),
            Box::new(LbfgsOptions::default().with_memory(3)),
            Box::new(TrustRegionOptions::default()),
        ];
        for m in minimizers {
            let r = m.minimize(&tf.problem(), tf.start.view());
            assert!(r.converged, "{}", r.message);
            assert!(r.fun < 1e-10);
        }
    }
}

#[cfg(all(rustc_nightly, test))]
mod benches {
    use super::*;
    use crate::testfns;
    use test::Bencher;

    fn bench_method(bench: &mut Bencher, method: Method) {
        let tf = testfns::rosenbrock();
        let opts = OptimizeOptions::default();
        bench.iter(|| minimize(&tf.problem(), tf.start.view(), Some(method), &opts));
    }

    #[bench]
    fn bfgs_rosenbrock(bench: &mut Bencher) {
        bench_method(bench, Method::Bfgs);
    }

    #[bench]
    fn lbfgs_rosenbrock(bench: &mut Bencher) {
        bench_method(bench, Method::LBfgs);
    }

    #[bench]
    fn cg_rosenbrock(bench: &mut Bencher) {
        bench_method(bench, Method::ConjugateGradient);
    }

    #[bench]
    fn krylov_rosenbrock(bench: &mut Bencher) {
        bench_method(bench, Method::KrylovTrustRegion);
    }
}
