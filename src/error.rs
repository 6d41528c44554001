//! Errors for misuse of the API.
//!
//! Numerical outcomes (non-convergence, failed line searches, indefinite
//! Hessians, ...) are never errors; they are reported through
//! [`OptimizeResult`](crate::result::OptimizeResult). The variants here are
//! reserved for problems in how a minimizer was called.

use thiserror::Error;

/// Programmer errors detected before any optimization work begins.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimizeError {
    /// Two vectors that must have the same length did not
    #[error("dimension mismatch: expected length {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// A method name given as a string was not recognized
    #[error("unknown optimization method `{0}`")]
    UnknownMethod(String),

    /// A finite difference scheme given as a string was not recognized
    #[error("unknown finite difference method `{0}` (expected `forward` or `central`)")]
    UnknownFiniteDifference(String),

    /// An option value is outside of its valid range
    #[error("invalid option: {0}")]
    InvalidOption(String),
}

pub type Result<T> = std::result::Result<T, OptimizeError>;

/// Ensure `found` has length `expected`.
pub(crate) fn check_len(expected: usize, found: usize) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(OptimizeError::DimensionMismatch { expected, found })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        let err = OptimizeError::DimensionMismatch {
            expected: 2,
            found: 3,
        };
        assert_eq!(
            err.to_string(),
            "dimension mismatch: expected length 2, found 3"
        );
        let err = OptimizeError::UnknownMethod("simplex2".into());
        assert!(err.to_string().contains("simplex2"));
    }

    #[test]
    fn check_len_detects_mismatch() {
        assert!(check_len(4, 4).is_ok());
        assert_eq!(
            check_len(4, 2),
            Err(OptimizeError::DimensionMismatch {
                expected: 4,
                found: 2
            })
        );
    }
}
