//! The `ndarray-minimize` crate provides unconstrained and box constrained
//! minimization of a function of an `ndarray`.
//!
//! It includes commonly used methods, such as:
//! - Gradient Descent
//! - (L)BFGS
//! - Nonlinear Conjugate Gradient
//! - Newton, with line search or trust region (dogleg and Krylov)
//! - Nelder-Mead, Brent and golden section search
//! - Simulated annealing
//! - Fminbox, a log-barrier wrapper for bound constraints
//!
//! A goal of this crate is to provide functionality on par with popular
//! optimization packages in other languages, such as `scipy.optimize` in
//! Python, or `Optim.jl` for Julia.
//!
//! Every method takes a [`Problem`], which bundles the objective with an
//! optional gradient and Hessian and counts every evaluation, and returns an
//! [`OptimizeResult`]. Numerical failure (a line search giving up, the
//! iteration limit) is part of the result, never a panic or an `Err`; the
//! [`OptimizeError`] type is reserved for misuse of the API.
//!
//! Default tolerances are strict (`1e-8` on the gradient norm). Runs that
//! rely on finite difference gradients can therefore end with a failed line
//! search close to an excellent minimum; check `fun` before discarding such
//! a result.
//!
//! The crate logs through the `log` facade. Per iteration progress is at
//! `trace` level; skipped updates, restarts and radius changes at `debug`;
//! failures at `warn`.

#![cfg_attr(all(rustc_nightly, test), feature(test))]
#[cfg(all(rustc_nightly, test))]
extern crate test;

pub mod constrained;
pub mod direct;
pub mod error;
pub mod finite_diff;
pub mod linesearch;
pub mod linop;
pub mod minimize;
pub mod newton;
pub mod problem;
pub mod result;
pub mod smooth;
pub mod stochastic;
pub mod testfns;
pub mod vecops;

pub use constrained::{fminbox, FminboxOptions, InnerMethod};
pub use direct::{brent, golden_section, nelder_mead, BrentOptions, NelderMeadOptions, ScalarMinimum};
pub use error::{OptimizeError, Result};
pub use finite_diff::FiniteDiff;
pub use linesearch::{MoreThuenteOptions, WolfeOptions, WolfeSearch};
pub use linop::LinearOperator;
pub use minimize::{minimize, Method, Minimizer};
pub use newton::{krylov_trust_region, newton, newton_trust_region, KrylovOptions, NewtonOptions, TrustRegionOptions};
pub use problem::Problem;
pub use result::{ConvergenceReason, OptimizeOptions, OptimizeResult, Termination};
pub use smooth::{bfgs, conjugate_gradient, gradient_descent, lbfgs};
pub use smooth::{BfgsOptions, CgOptions, Gamma, GradientDescentOptions, LbfgsOptions};
pub use stochastic::{simulated_annealing, SimulatedAnnealingOptions};
pub use vecops::LinalgFloat;
