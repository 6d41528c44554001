use super::descend;
use crate::error::{OptimizeError, Result};
use crate::linesearch::WolfeSearch;
use crate::linop::{DenseInverseHessian, LbfgsHistory};
use crate::problem::Problem;
use crate::result::{OptimizeOptions, OptimizeResult};
use ndarray::prelude::*;
use ndarray::NdFloat;
use ndarray_linalg::Scalar;

/// Options for [`bfgs`]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BfgsOptions<A> {
    pub base: OptimizeOptions<A>,
    pub line_search: WolfeSearch<A>,
}

impl<A: NdFloat> Default for BfgsOptions<A> {
    fn default() -> Self {
        BfgsOptions::new(OptimizeOptions::default())
    }
}

impl<A: NdFloat> BfgsOptions<A> {
    pub fn new(base: OptimizeOptions<A>) -> Self {
        BfgsOptions {
            base,
            line_search: WolfeSearch::default(),
        }
    }
}

/// Options for [`lbfgs`]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LbfgsOptions<A> {
    pub base: OptimizeOptions<A>,
    /// Number of correction pairs kept (default `10`)
    pub memory: usize,
    pub line_search: WolfeSearch<A>,
}

impl<A: NdFloat> Default for LbfgsOptions<A> {
    fn default() -> Self {
        LbfgsOptions::new(OptimizeOptions::default())
    }
}

impl<A: NdFloat> LbfgsOptions<A> {
    pub fn new(base: OptimizeOptions<A>) -> Self {
        LbfgsOptions {
            base,
            memory: 10,
            line_search: WolfeSearch::default(),
        }
    }

    pub fn with_memory(mut self, memory: usize) -> Self {
        self.memory = memory;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.memory == 0 {
            return Err(OptimizeError::InvalidOption("L-BFGS memory must be positive".into()));
        }
        Ok(())
    }
}

/// BFGS with a strong Wolfe line search
///
/// Minimizes a smooth objective with the Broyden Fletcher Goldfarb Shanno
/// update of a dense inverse Hessian approximation $`H`$.
/// See also [Wikipedia](https://en.wikipedia.org/wiki/Broyden%E2%80%93Fletcher%E2%80%93Goldfarb%E2%80%93Shanno_algorithm).
///
/// Algorithm
/// ---------
/// ```math
/// \begin{aligned}
/// d_k &= -H_kg_k \\
/// x_{k+1} &= x_k + \alpha_k d_k \quad \text{(strong Wolfe)} \\
/// s_k &= x_{k+1} - x_k, \quad y_k = g_{k+1} - g_k, \quad \rho_k = 1/y_k^Ts_k \\
/// H_{k+1} &= (I - \rho_k s_k y_k^T)H_k(I - \rho_k y_k s_k^T) + \rho_k s_k s_k^T
/// \end{aligned}
/// ```
/// starting from $`H_0 = I`$. The update is skipped when
/// $`y_k^Ts_k \le 10^{-10}`$, which would break positive definiteness.
///
/// Storage is $`O(n^2)`$; prefer [`lbfgs`] beyond a few hundred variables.
pub fn bfgs<A: NdFloat + Scalar>(problem: &Problem<'_, A>, x0: ArrayView1<A>, opts: &BfgsOptions<A>) -> OptimizeResult<A> {
    descend(
        "bfgs",
        problem,
        x0,
        &mut DenseInverseHessian::identity(x0.len()),
        |x, d, fx, gx| opts.line_search.search(problem, x, d, fx, gx),
        &opts.base,
    )
}

/// Limited-memory BFGS with a strong Wolfe line search
///
/// Same iteration as [`bfgs`], but $`H_k`$ is never formed: only the last
/// `memory` correction pairs $`(s_i, y_i)`$ are kept and $`H_kg_k`$ is
/// evaluated by the two-loop recursion [\[N80\]](#references), starting
/// from $`\gamma_k I`$ with $`\gamma_k = s_{k-1}^Ty_{k-1}/y_{k-1}^Ty_{k-1}`$.
/// With no pairs stored the direction is $`-g_k`$.
///
/// The original paper suggests 3 to 7 pairs are sufficient.
///
/// References
/// ----------
/// \[N80\]: [ Nocedal, J,
///      "Updating Quasi-Newton Matrices With Limited Storage",
///         Mathematics of Computation, Vol 35, #151, July 1980, 773-782 ](https://courses.engr.illinois.edu/ece544na/fa2014/nocedal80.pdf)
pub fn lbfgs<A: NdFloat + Scalar>(problem: &Problem<'_, A>, x0: ArrayView1<A>, opts: &LbfgsOptions<A>) -> OptimizeResult<A> {
    if let Err(err) = opts.validate() {
        return OptimizeResult::rejected(problem, x0, err);
    }
    descend(
        "l-bfgs",
        problem,
        x0,
        &mut LbfgsHistory::new(opts.memory),
        |x, d, fx, gx| opts.line_search.search(problem, x, d, fx, gx),
        &opts.base,
    )
}
