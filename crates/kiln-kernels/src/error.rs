//! Errors reported by the typed kernel interface.
//!
//! The raw kernels never return errors; these come from argument validation
//! in [`KernelLibrary`](crate::KernelLibrary) implementations.

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KernelError {
    #[error("{kernel}: buffer length mismatch (expected {expected}, got {got})")]
    LengthMismatch {
        kernel: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{kernel}: buffer of length {len} is not a {n}x{n} matrix")]
    NotSquare {
        kernel: &'static str,
        n: usize,
        len: usize,
    },

    #[error("invalid quantization scale {0} (must be finite and > 0)")]
    InvalidScale(f32),

    #[error("int8 reduction length {n} exceeds {max}; the int32 accumulator could overflow")]
    ReductionTooLong { n: usize, max: usize },

    #[error("unknown kernel strategy '{0}' (expected 'scalar' or 'vectorized')")]
    UnknownStrategy(String),
}

pub type Result<T> = std::result::Result<T, KernelError>;
