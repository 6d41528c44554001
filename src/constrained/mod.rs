//! Bound Constrained Minimization
//!
//! Minimize $`f(x)`$ subject to $`l \le x \le u`$, where any bound may be
//! infinite. [`fminbox`] reduces the problem to a sequence of unconstrained
//! ones solved by the methods of [`smooth`](crate::smooth).

mod fminbox;
pub use fminbox::*;
