use super::descend;
use crate::error::{OptimizeError, Result};
use crate::linesearch::{backtracking, BacktrackingOptions};
use crate::linop::Identity;
use crate::problem::Problem;
use crate::result::{OptimizeOptions, OptimizeResult};
use ndarray::prelude::*;
use ndarray::NdFloat;
use ndarray_linalg::Scalar;

/// Options for [`gradient_descent`]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GradientDescentOptions<A> {
    pub base: OptimizeOptions<A>,
    pub line_search: BacktrackingOptions<A>,
}

impl<A: NdFloat> Default for GradientDescentOptions<A> {
    fn default() -> Self {
        GradientDescentOptions::new(OptimizeOptions::default())
    }
}

impl<A: NdFloat> GradientDescentOptions<A> {
    pub fn new(base: OptimizeOptions<A>) -> Self {
        GradientDescentOptions {
            base,
            line_search: BacktrackingOptions::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let ls = &self.line_search;
        if !(ls.rho > A::zero() && ls.rho < A::one()) {
            return Err(OptimizeError::InvalidOption(format!(
                "backtracking rho must lie in (0, 1), got {}",
                ls.rho
            )));
        }
        Ok(())
    }
}

/// Gradient Descent with Armijo backtracking
///
/// Also known as steepest descent.
///
/// Algorithm
/// ---------
/// ```math
/// \begin{aligned}
/// d_i &= -\nabla f(x_i) \\
/// \alpha_i &= \max\{\alpha_0\rho^j : f(x_i + \alpha d_i) \le f(x_i) + c_1\alpha \nabla f(x_i)^Td_i\} \\
/// x_{i+1} &= x_i + \alpha_i d_i
/// \end{aligned}
/// ```
///
/// Parameters
/// ----------
/// - __problem:__   objective, with optional analytic gradient
/// - __x0:__        initial guess
/// - __opts:__      stopping criteria and backtracking parameters
pub fn gradient_descent<A: NdFloat + Scalar>(
    problem: &Problem<'_, A>,
    x0: ArrayView1<A>,
    opts: &GradientDescentOptions<A>,
) -> OptimizeResult<A> {
    if let Err(err) = opts.validate() {
        return OptimizeResult::rejected(problem, x0, err);
    }
    descend(
        "gradient descent",
        problem,
        x0,
        &mut Identity::new(),
        |x, d, fx, gx| backtracking(problem, x, d, fx, gx, &opts.line_search),
        &opts.base,
    )
}
