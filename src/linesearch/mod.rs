//! Line searches along a descent direction
//!
//! Given a point $`x`$, a direction $`d`$ with $`\nabla f(x)^Td < 0`$, and
//! the already known $`f(x)`$ and $`\nabla f(x)`$, each search looks for a
//! step $`\alpha > 0`$ along the univariate restriction
//! ```math
//! \phi(\alpha) = f(x + \alpha d), \qquad \phi'(\alpha) = \nabla f(x+\alpha d)^T d
//! ```
//! - [backtracking]: Armijo sufficient decrease only
//! - [strong_wolfe]: bracketing and zoom (Nocedal & Wright, Alg. 3.5/3.6)
//! - [hager_zhang]: approximate Wolfe conditions with secant steps
//! - [more_thuente]: strong Wolfe by safeguarded cubic interpolation

mod backtracking;
pub use backtracking::*;
mod wolfe;
pub use wolfe::*;
mod hager_zhang;
pub use hager_zhang::*;
mod more_thuente;
pub use more_thuente::*;

use ndarray::prelude::*;
use ndarray::NdFloat;

use crate::problem::Problem;
use crate::vecops::lit;

/// Tenfold shrinks tried to bring a first step back where $`\phi`$ is finite
const DOMAIN_SHRINKS: usize = 30;

/// Outcome of a line search
///
/// When `success` is false the caller must not take the step.
#[derive(Debug, Clone)]
pub struct LineSearchResult<A> {
    pub alpha: A,
    /// $`f(x + \alpha d)`$
    pub f_new: A,
    /// $`\nabla f(x + \alpha d)`$, when the search evaluated it
    pub g_new: Option<Array1<A>>,
    pub function_calls: usize,
    pub gradient_calls: usize,
    pub success: bool,
}

/// Strong Wolfe line search used by BFGS, L-BFGS and Newton
///
/// Serialized untagged, so plain [`WolfeOptions`] read back as
/// `Bracketing`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(untagged))]
pub enum WolfeSearch<A> {
    /// [`strong_wolfe`]
    Bracketing(WolfeOptions<A>),
    /// [`more_thuente`]
    MoreThuente(MoreThuenteOptions<A>),
}

impl<A: NdFloat> Default for WolfeSearch<A> {
    fn default() -> Self {
        WolfeSearch::Bracketing(WolfeOptions::default())
    }
}

impl<A> From<WolfeOptions<A>> for WolfeSearch<A> {
    fn from(opts: WolfeOptions<A>) -> Self {
        WolfeSearch::Bracketing(opts)
    }
}

impl<A> From<MoreThuenteOptions<A>> for WolfeSearch<A> {
    fn from(opts: MoreThuenteOptions<A>) -> Self {
        WolfeSearch::MoreThuente(opts)
    }
}

impl<A: NdFloat> WolfeSearch<A> {
    pub fn search(
        &self,
        problem: &Problem<'_, A>,
        x: ArrayView1<A>,
        d: ArrayView1<A>,
        fx: A,
        gx: ArrayView1<A>,
    ) -> LineSearchResult<A> {
        match self {
            WolfeSearch::Bracketing(opts) => strong_wolfe(problem, x, d, fx, gx, opts),
            WolfeSearch::MoreThuente(opts) => more_thuente(problem, x, d, fx, gx, opts),
        }
    }
}

/// Trial step along the search line
struct Trial<A> {
    alpha: A,
    phi: A,
    dphi: A,
    grad: Array1<A>,
}

/// $`\phi`$ and $`\phi'`$ for one line search, counting through the problem
struct LineFunction<'p, 'a, 'v, 'w, A> {
    problem: &'p Problem<'a, A>,
    x: ArrayView1<'v, A>,
    d: ArrayView1<'w, A>,
    start: (usize, usize),
}

impl<'p, 'a, 'v, 'w, A: NdFloat> LineFunction<'p, 'a, 'v, 'w, A> {
    fn new(problem: &'p Problem<'a, A>, x: ArrayView1<'v, A>, d: ArrayView1<'w, A>) -> Self {
        LineFunction {
            problem,
            x,
            d,
            start: problem.counts(),
        }
    }

    fn point(&self, alpha: A) -> Array1<A> {
        let mut xa = self.x.to_owned();
        xa.scaled_add(alpha, &self.d);
        xa
    }

    fn phi(&self, alpha: A) -> A {
        self.problem.value(self.point(alpha).view())
    }

    /// $`\phi'(\alpha)`$ and the full gradient at the trial point
    fn dphi(&self, alpha: A) -> (A, Array1<A>) {
        let grad = self.problem.gradient(self.point(alpha).view());
        (grad.dot(&self.d), grad)
    }

    /// First of $`\alpha, \alpha/10, \alpha/100, \dots`$ with a finite
    /// $`\phi`$, its value, and the smallest step found outside the domain
    ///
    /// Objectives that are `+inf` off their domain (a barrier) are entered
    /// with a step short of the domain edge, which then caps the search.
    fn enter_domain(&self, alpha: A) -> (A, A, Option<A>) {
        let tenth = lit::<A>(0.1);
        let mut alpha = alpha;
        let mut phi = self.phi(alpha);
        let mut outside = None;
        for _ in 0..DOMAIN_SHRINKS {
            if phi.is_finite() {
                break;
            }
            outside = Some(alpha);
            alpha = alpha * tenth;
            phi = self.phi(alpha);
        }
        (alpha, phi, outside)
    }

    fn trial(&self, alpha: A) -> Trial<A> {
        self.trial_from(alpha, self.phi(alpha))
    }

    /// [`trial`](Self::trial) with $`\phi(\alpha)`$ already known
    fn trial_from(&self, alpha: A, phi: A) -> Trial<A> {
        let (dphi, grad) = self.dphi(alpha);
        Trial {
            alpha,
            phi,
            dphi,
            grad,
        }
    }

    fn finish(&self, alpha: A, f_new: A, g_new: Option<Array1<A>>, success: bool) -> LineSearchResult<A> {
        let (function_calls, gradient_calls) = self.problem.calls_since(self.start);
        LineSearchResult {
            alpha,
            f_new,
            g_new,
            function_calls,
            gradient_calls,
            success,
        }
    }

    fn accept(&self, t: Trial<A>) -> LineSearchResult<A> {
        self.finish(t.alpha, t.phi, Some(t.grad), true)
    }
}
