//! Inverse Hessian approximations as linear operators
//!
//! Quasi-Newton and first order methods pick their search direction as
//! $`d = -Hg`$ for some operator $`H`$ approximating $`(\nabla^2 f)^{-1}`$:
//! the identity for steepest descent, a dense matrix for BFGS, and an
//! implicit product over stored correction pairs for L-BFGS. All of them
//! implement `ndarray_linalg`'s [`LinearOperator`].

use std::collections::VecDeque;
use std::marker::PhantomData;

use ndarray::prelude::*;
use ndarray::{Data, DataMut, DataOwned, NdFloat};
pub use ndarray_linalg::operator::LinearOperator;
use ndarray_linalg::Scalar;

use crate::vecops::{dot, mat_vec_mul};

#[derive(Debug, Clone, Copy, Default)]
pub struct Identity<A> {
    phantom: PhantomData<A>,
}

impl<A> Identity<A> {
    #[must_use]
    pub fn new() -> Identity<A> {
        Identity {
            phantom: PhantomData,
        }
    }
}

impl<A> LinearOperator for Identity<A>
where
    A: NdFloat + Scalar,
{
    type Elem = A;

    #[inline]
    fn apply<S>(&self, a: &ArrayBase<S, Ix1>) -> Array1<S::Elem>
    where
        S: Data<Elem = Self::Elem>,
    {
        a.to_owned()
    }

    #[inline]
    fn apply_mut<S>(&self, _a: &mut ArrayBase<S, Ix1>)
    where
        S: DataMut<Elem = Self::Elem>,
    {
    }

    #[inline]
    fn apply_into<S>(&self, a: ArrayBase<S, Ix1>) -> ArrayBase<S, Ix1>
    where
        S: DataOwned<Elem = Self::Elem> + DataMut,
    {
        a
    }
}

/// An inverse Hessian approximation refined from accepted steps
pub trait InverseHessian: LinearOperator {
    /// Incorporate the step $`s = x_{k+1} - x_k`$ and gradient change
    /// $`y = g_{k+1} - g_k`$. Callers only pass pairs with $`y^Ts > 0`$.
    fn update(&mut self, s: Array1<Self::Elem>, y: Array1<Self::Elem>);
}

impl<A: NdFloat + Scalar> InverseHessian for Identity<A> {
    fn update(&mut self, _s: Array1<A>, _y: Array1<A>) {}
}

/// Dense BFGS inverse Hessian, starting from the identity
///
/// ```math
/// H_{k+1} = (I - \rho sy^T)H_k(I - \rho ys^T) + \rho ss^T, \qquad \rho = 1/y^Ts
/// ```
#[derive(Debug, Clone)]
pub struct DenseInverseHessian<A> {
    pub h: Array2<A>,
}

impl<A: NdFloat> DenseInverseHessian<A> {
    pub fn identity(n: usize) -> Self {
        DenseInverseHessian { h: Array2::eye(n) }
    }
}

impl<A: NdFloat + Scalar> LinearOperator for DenseInverseHessian<A> {
    type Elem = A;

    fn apply<S>(&self, a: &ArrayBase<S, Ix1>) -> Array1<S::Elem>
    where
        S: Data<Elem = Self::Elem>,
    {
        mat_vec_mul(&self.h, a)
    }
}

impl<A: NdFloat + Scalar> InverseHessian for DenseInverseHessian<A> {
    fn update(&mut self, s: Array1<A>, y: Array1<A>) {
        // expanded form, using the symmetry of H
        let rho = A::one() / dot(&y, &s);
        let hy = mat_vec_mul(&self.h, &y);
        let yhy = dot(&y, &hy);
        let s_col = s.view().insert_axis(Axis(1));
        let hy_row = hy.view().insert_axis(Axis(0));
        let cross = s_col.dot(&hy_row);
        let ss = s_col.dot(&s.view().insert_axis(Axis(0)));
        self.h = &self.h - &((&cross + &cross.t()) * rho) + &(ss * (rho * rho * yhy + rho));
    }
}

impl<A: NdFloat + Scalar> InverseHessian for LbfgsHistory<A> {
    fn update(&mut self, s: Array1<A>, y: Array1<A>) {
        self.push(s, y);
    }
}

/// One L-BFGS correction pair $`(s_k, y_k)`$ with $`\rho_k = 1/y_k^Ts_k`$
#[derive(Debug, Clone)]
pub struct Correction<A> {
    pub s: Array1<A>,
    pub y: Array1<A>,
    pub rho: A,
}

/// Bounded history of L-BFGS corrections, oldest first
///
/// Pushing onto a full history evicts the oldest pair. As an operator it
/// applies the implicit inverse Hessian by the two-loop recursion, scaled
/// by $`\gamma = y^Ts / y^Ty`$ of the most recent pair.
#[derive(Debug, Clone)]
pub struct LbfgsHistory<A> {
    memory: usize,
    pairs: VecDeque<Correction<A>>,
    gamma: A,
}

impl<A: NdFloat> LbfgsHistory<A> {
    pub fn new(memory: usize) -> Self {
        LbfgsHistory {
            memory,
            pairs: VecDeque::with_capacity(memory),
            gamma: A::one(),
        }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn gamma(&self) -> A {
        self.gamma
    }

    /// Pairs from oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Correction<A>> {
        self.pairs.iter()
    }

    /// Store a pair, assuming the caller checked $`y^Ts > 0`$
    pub fn push(&mut self, s: Array1<A>, y: Array1<A>) {
        if self.memory == 0 {
            return;
        }
        let ys = dot(&y, &s);
        self.gamma = ys / dot(&y, &y);
        if self.pairs.len() == self.memory {
            // forget
            self.pairs.pop_front();
        }
        self.pairs.push_back(Correction {
            s,
            y,
            rho: A::one() / ys,
        });
    }
}

impl<A: NdFloat + Scalar> LinearOperator for LbfgsHistory<A> {
    type Elem = A;

    fn apply<S>(&self, g: &ArrayBase<S, Ix1>) -> Array1<S::Elem>
    where
        S: Data<Elem = Self::Elem>,
    {
        if self.pairs.is_empty() {
            return g.to_owned();
        }
        let mut q = g.to_owned();
        let mut alphas = Vec::with_capacity(self.pairs.len());
        for Correction { s, y, rho } in self.pairs.iter().rev() {
            let alpha = *rho * s.dot(&q);
            q.scaled_add(-alpha, y);
            alphas.push(alpha);
        }
        q *= self.gamma;
        for (alpha, Correction { s, y, rho }) in alphas.iter().rev().zip(self.pairs.iter()) {
            let beta = *rho * y.dot(&q);
            q.scaled_add(*alpha - beta, s);
        }
        q
    }
}
