//! Stochastic global search
use std::fmt;

use ndarray::prelude::*;
use ndarray::NdFloat;
use ndarray_rand::rand::rngs::StdRng;
use ndarray_rand::rand::{Rng, SeedableRng};
use ndarray_rand::rand_distr::StandardNormal;

use crate::error::{OptimizeError, Result};
use crate::problem::Problem;
use crate::result::{OptimizeOptions, OptimizeResult, Termination};
use crate::vecops::lit;

/// Proposal generator: a new point near `x`, drawn with `rng`
pub type Neighbor<A> = fn(ArrayView1<A>, A, &mut StdRng) -> Array1<A>;

/// $`T(k) = 1/\ln k`$, infinite for $`k \le 1`$
pub fn log_temperature<A: NdFloat>(k: usize) -> A {
    if k <= 1 {
        A::infinity()
    } else {
        A::one() / lit::<A>((k as f64).ln())
    }
}

/// $`x + s z`$ with $`z \sim N(0, I)`$
pub fn gaussian_neighbor<A: NdFloat>(x: ArrayView1<A>, scale: A, rng: &mut StdRng) -> Array1<A> {
    x.mapv(|e| {
        let z: f64 = rng.sample(StandardNormal);
        e + scale * lit::<A>(z)
    })
}

/// Options for [`simulated_annealing`]
///
/// Only `base.max_iterations` is read from the shared criteria.
#[derive(Clone, Copy)]
pub struct SimulatedAnnealingOptions<A> {
    pub base: OptimizeOptions<A>,
    /// Cooling schedule (default [`log_temperature`])
    pub temperature: fn(usize) -> A,
    /// Proposal generator (default [`gaussian_neighbor`])
    pub neighbor: Neighbor<A>,
    /// Passed to `neighbor` as the proposal width (default `1`)
    pub step_scale: A,
    /// Fixed seed for a reproducible run; `None` seeds from the OS
    pub seed: Option<u64>,
}

impl<A: fmt::Debug> fmt::Debug for SimulatedAnnealingOptions<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedAnnealingOptions")
            .field("base", &self.base)
            .field("step_scale", &self.step_scale)
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}

impl<A: NdFloat> Default for SimulatedAnnealingOptions<A> {
    fn default() -> Self {
        SimulatedAnnealingOptions::new(OptimizeOptions::default())
    }
}

impl<A: NdFloat> SimulatedAnnealingOptions<A> {
    pub fn new(base: OptimizeOptions<A>) -> Self {
        SimulatedAnnealingOptions {
            base,
            temperature: log_temperature,
            neighbor: gaussian_neighbor,
            step_scale: A::one(),
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_temperature(mut self, temperature: fn(usize) -> A) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.step_scale > A::zero() && self.step_scale.is_finite()) {
            return Err(OptimizeError::InvalidOption(format!(
                "simulated annealing step_scale must be positive and finite, got {}",
                self.step_scale
            )));
        }
        Ok(())
    }
}

/// Simulated annealing
///
/// At iteration $`k = 1, \dots, N`$ a proposal $`y`$ is drawn near the
/// current point $`x`$. It replaces $`x`$ when $`f(y) \le f(x)`$, and
/// otherwise with probability
/// ```math
/// \exp\left(-\frac{f(y) - f(x)}{T(k)}\right)
/// ```
/// The best point seen is returned. There is no stopping test: the run
/// always makes `max_iterations` proposals, so `function_calls` is
/// `max_iterations + 1`, and ends with [`Termination::ScheduleCompleted`].
/// A proposal with a NaN value is never accepted.
///
/// No gradients are used and the result carries none.
pub fn simulated_annealing<A: NdFloat>(
    problem: &Problem<'_, A>,
    x0: ArrayView1<A>,
    opts: &SimulatedAnnealingOptions<A>,
) -> OptimizeResult<A> {
    if let Err(err) = opts.validate() {
        return OptimizeResult::rejected(problem, x0, err);
    }
    let start = problem.counts();
    let mut rng = match opts.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut x = x0.to_owned();
    let mut fx = problem.value(x.view());
    let mut best = x.clone();
    let mut f_best = fx;
    let max_iterations = opts.base.max_iterations;

    for k in 1..=max_iterations {
        let t = (opts.temperature)(k);
        let y = (opts.neighbor)(x.view(), opts.step_scale, &mut rng);
        let fy = problem.value(y.view());

        if fy <= fx {
            if fy < f_best {
                best.assign(&y);
                f_best = fy;
            }
            x = y;
            fx = fy;
        } else {
            let p = if t > A::zero() { (-(fy - fx) / t).exp() } else { A::zero() };
            if lit::<A>(rng.gen::<f64>()) <= p {
                x = y;
                fx = fy;
            }
        }
        log::trace!("annealing iteration {}: T = {:e}, f = {:e}, best = {:e}", k, t, fx, f_best);
    }

    OptimizeResult::new(
        best,
        f_best,
        None,
        max_iterations,
        problem.calls_since(start),
        Termination::ScheduleCompleted,
    )
}
