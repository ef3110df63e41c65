//! Error types for rigel operations.

use thiserror::Error;

/// Result type alias using rigel Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or solving a model.
#[derive(Error, Debug)]
pub enum Error {
    /// The model cannot be solved as described: conflicting supports inside a
    /// rigid group, inconsistent or rank-deficient constraint equations, or a
    /// support that depends on a free unknown.
    #[error("model inconsistency: {0}")]
    ModelInconsistency(String),

    /// An operator or vector has the wrong shape.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Sparse factorization failed (non positive pivot, singular block).
    #[error("numeric failure: {0}")]
    NumericFailure(String),

    /// A hollow permutation is not injective or holds non 0/1 entries.
    #[error("invalid permutation: {0}")]
    InvalidPermutation(String),

    /// Element-related errors.
    #[error("element error: {0}")]
    Element(String),

    /// Model building errors (unknown node, dangling reference).
    #[error("model error: {0}")]
    Model(String),

    /// Invalid material or section properties.
    #[error("invalid material: {0}")]
    InvalidMaterial(String),
}
