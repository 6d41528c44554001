//! Pure vector and dense matrix arithmetic
//!
//! Every function here allocates and returns a new array; arguments are only
//! ever borrowed immutably. Mismatched lengths are a programming error and
//! panic, the same way ndarray's own arithmetic does.

use ndarray::prelude::*;
use ndarray::{Data, NdFloat};
use ndarray_linalg::{Lapack, Scalar, SolveC};
use num_traits::NumCast;

/// Convert an `f64` constant into the working float type.
///
/// Only used for literals (tolerances, factors) which are representable in
/// every `NdFloat`.
pub(crate) fn lit<A: NdFloat>(v: f64) -> A {
    <A as NumCast>::from(v).unwrap_or_else(A::nan)
}

#[inline]
fn same_len(a: usize, b: usize) {
    assert_eq!(a, b, "vector length mismatch: {} vs {}", a, b);
}

/// Inner product $`a^T b`$
pub fn dot<A, S, T>(a: &ArrayBase<S, Ix1>, b: &ArrayBase<T, Ix1>) -> A
where
    A: NdFloat,
    S: Data<Elem = A>,
    T: Data<Elem = A>,
{
    same_len(a.len(), b.len());
    a.dot(b)
}

/// Euclidean norm $`\|v\|_2`$
pub fn norm<A, S>(v: &ArrayBase<S, Ix1>) -> A
where
    A: NdFloat,
    S: Data<Elem = A>,
{
    v.dot(v).sqrt()
}

/// Infinity norm $`\|v\|_\infty`$, zero for an empty vector
pub fn norm_inf<A, S>(v: &ArrayBase<S, Ix1>) -> A
where
    A: NdFloat,
    S: Data<Elem = A>,
{
    v.fold(A::zero(), |acc, &x| acc.max(x.abs()))
}

/// $`s v`$
pub fn scale<A, S>(v: &ArrayBase<S, Ix1>, s: A) -> Array1<A>
where
    A: NdFloat,
    S: Data<Elem = A>,
{
    v.mapv(|x| x * s)
}

/// $`a + b`$
pub fn add<A, S, T>(a: &ArrayBase<S, Ix1>, b: &ArrayBase<T, Ix1>) -> Array1<A>
where
    A: NdFloat,
    S: Data<Elem = A>,
    T: Data<Elem = A>,
{
    same_len(a.len(), b.len());
    a + b
}

/// $`a - b`$
pub fn sub<A, S, T>(a: &ArrayBase<S, Ix1>, b: &ArrayBase<T, Ix1>) -> Array1<A>
where
    A: NdFloat,
    S: Data<Elem = A>,
    T: Data<Elem = A>,
{
    same_len(a.len(), b.len());
    a - b
}

/// $`-v`$
pub fn negate<A, S>(v: &ArrayBase<S, Ix1>) -> Array1<A>
where
    A: NdFloat,
    S: Data<Elem = A>,
{
    v.mapv(|x| -x)
}

/// Fused $`a + s b`$ with a single allocation
pub fn add_scaled<A, S, T>(a: &ArrayBase<S, Ix1>, b: &ArrayBase<T, Ix1>, s: A) -> Array1<A>
where
    A: NdFloat,
    S: Data<Elem = A>,
    T: Data<Elem = A>,
{
    same_len(a.len(), b.len());
    let mut out = a.to_owned();
    out.scaled_add(s, b);
    out
}

/// Owned copy of `v`
pub fn clone<A, S>(v: &ArrayBase<S, Ix1>) -> Array1<A>
where
    A: NdFloat,
    S: Data<Elem = A>,
{
    v.to_owned()
}

/// Vector of `n` zeros
pub fn zeros<A: NdFloat>(n: usize) -> Array1<A> {
    Array1::zeros(n)
}

/// Dense matrix-vector product $`M v`$
pub fn mat_vec_mul<A, S, T>(m: &ArrayBase<S, Ix2>, v: &ArrayBase<T, Ix1>) -> Array1<A>
where
    A: NdFloat,
    S: Data<Elem = A>,
    T: Data<Elem = A>,
{
    same_len(m.ncols(), v.len());
    m.dot(v)
}

/// Real float types with a LAPACK backend
///
/// `num_traits::Float` and `ndarray_linalg::Scalar` both provide `abs`,
/// `sqrt` and friends, so code bounded by this trait spells them
/// `Float::abs(x)`.
pub trait LinalgFloat: NdFloat + Scalar + Lapack {}

impl<A: NdFloat + Scalar + Lapack> LinalgFloat for A {}

/// Solve $`M x = b`$ for symmetric positive definite $`M`$
///
/// Cholesky factorization and triangular solves by LAPACK (`potrf`/`potrs`).
/// Returns `None` if the factorization fails, i.e. the matrix is not
/// positive definite or holds a NaN. Only the upper triangle of `m` is read.
pub fn cholesky_solve<A, S, T>(m: &ArrayBase<S, Ix2>, b: &ArrayBase<T, Ix1>) -> Option<Array1<A>>
where
    A: LinalgFloat,
    S: Data<Elem = A>,
    T: Data<Elem = A>,
{
    let n = b.len();
    assert_eq!(m.dim(), (n, n), "cholesky_solve needs a square {0}x{0} matrix", n);
    if n == 0 {
        return Some(Array1::zeros(0));
    }
    m.solvec(b).ok()
}
