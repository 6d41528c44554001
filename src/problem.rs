//! The objective and its optional derivatives, with evaluation counting

use std::cell::Cell;

use ndarray::prelude::*;
use ndarray::NdFloat;

use crate::finite_diff::{finite_diff_hessian, hessian_cost, FiniteDiff};

/// Objective $`f: \mathbb{R}^n \to \mathbb{R}`$
pub type Objective<'a, A> = dyn Fn(ArrayView1<A>) -> A + 'a;
/// Gradient $`\nabla f`$
pub type Gradient<'a, A> = dyn Fn(ArrayView1<A>) -> Array1<A> + 'a;
/// Hessian $`\nabla^2 f`$ as a dense matrix
pub type Hessian<'a, A> = dyn Fn(ArrayView1<A>) -> Array2<A> + 'a;

/// A minimization problem
///
/// Bundles the caller's objective with an optional analytic gradient and
/// Hessian. Missing derivatives are approximated by finite differences.
/// Every evaluation made through a `Problem`, including the objective
/// evaluations hidden inside finite differences, is counted, and minimizers
/// report the counts accumulated during their run.
///
/// The callbacks are assumed to be pure: evaluating at the same point twice
/// must give the same answer.
pub struct Problem<'a, A> {
    objective: &'a Objective<'a, A>,
    gradient: Option<&'a Gradient<'a, A>>,
    hessian: Option<&'a Hessian<'a, A>>,
    finite_diff: FiniteDiff,
    function_calls: Cell<usize>,
    gradient_calls: Cell<usize>,
}

impl<'a, A: NdFloat> Problem<'a, A> {
    pub fn new(objective: &'a Objective<'a, A>) -> Self {
        Problem {
            objective,
            gradient: None,
            hessian: None,
            finite_diff: FiniteDiff::Forward,
            function_calls: Cell::new(0),
            gradient_calls: Cell::new(0),
        }
    }

    pub fn with_gradient(mut self, gradient: &'a Gradient<'a, A>) -> Self {
        self.gradient = Some(gradient);
        self
    }

    /// Like [`Problem::with_gradient`] but accepting `None`
    pub fn with_optional_gradient(mut self, gradient: Option<&'a Gradient<'a, A>>) -> Self {
        self.gradient = gradient;
        self
    }

    pub fn with_hessian(mut self, hessian: &'a Hessian<'a, A>) -> Self {
        self.hessian = Some(hessian);
        self
    }

    /// Scheme used when no analytic gradient was given (default forward)
    pub fn with_finite_difference(mut self, scheme: FiniteDiff) -> Self {
        self.finite_diff = scheme;
        self
    }

    pub fn has_gradient(&self) -> bool {
        self.gradient.is_some()
    }

    pub fn has_hessian(&self) -> bool {
        self.hessian.is_some()
    }

    /// $`f(x)`$
    pub fn value(&self, x: ArrayView1<A>) -> A {
        self.function_calls.set(self.function_calls.get() + 1);
        (self.objective)(x)
    }

    /// $`\nabla f(x)`$, analytic if available
    pub fn gradient(&self, x: ArrayView1<A>) -> Array1<A> {
        self.gradient_calls.set(self.gradient_calls.get() + 1);
        match self.gradient {
            Some(grad) => grad(x),
            None => self.finite_diff.gradient(|xp: ArrayView1<A>| self.value(xp), x),
        }
    }

    /// $`\nabla^2 f(x)`$, analytic if available
    pub fn hessian(&self, x: ArrayView1<A>) -> Array2<A> {
        match self.hessian {
            Some(hess) => hess(x),
            None => {
                let h = finite_diff_hessian(self.objective, x);
                let calls = self.function_calls.get() + hessian_cost(x.len());
                self.function_calls.set(calls);
                h
            }
        }
    }

    /// Evaluation counts so far as `(function_calls, gradient_calls)`
    pub fn counts(&self) -> (usize, usize) {
        (self.function_calls.get(), self.gradient_calls.get())
    }

    /// Counts accumulated since an earlier [`Problem::counts`] snapshot
    pub(crate) fn calls_since(&self, start: (usize, usize)) -> (usize, usize) {
        let (f, g) = self.counts();
        (f - start.0, g - start.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_every_evaluation() {
        let f = |x: ArrayView1<f64>| x.dot(&x);
        let g = |x: ArrayView1<f64>| 2.0 * &x;
        let x = array![1.0, 2.0];

        let analytic = Problem::new(&f).with_gradient(&g);
        analytic.value(x.view());
        analytic.gradient(x.view());
        assert_eq!(analytic.counts(), (1, 1));

        let numeric = Problem::new(&f);
        numeric.gradient(x.view());
        assert_eq!(numeric.counts(), (3, 1));

        let central = Problem::new(&f).with_finite_difference(FiniteDiff::Central);
        let start = central.counts();
        central.gradient(x.view());
        central.hessian(x.view());
        assert_eq!(central.calls_since(start), (4 + hessian_cost(2), 1));
    }

    #[test]
    fn analytic_hessian_is_used() {
        let f = |x: ArrayView1<f64>| x[0] * x[0];
        let h = |_x: ArrayView1<f64>| array![[2.0]];
        let p = Problem::new(&f).with_hessian(&h);
        assert!(p.has_hessian());
        assert!(!p.has_gradient());
        assert_eq!(p.hessian(array![3.0].view()), array![[2.0]]);
        assert_eq!(p.counts(), (0, 0));
    }
}
