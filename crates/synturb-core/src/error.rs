//! Error types for the synthesis core.

use thiserror::Error;

/// Errors produced by field construction, generation and storage.
///
/// Configuration errors are raised before any grid-sized work starts; a
/// generation call that fails leaves the field's buffers partially
/// overwritten and unusable until the next call re-initializes them.
#[derive(Debug, Error)]
pub enum FieldError {
    /// Grid dimension outside the supported 1-3 range.
    #[error("unsupported dimension {0}: transforms and difference operators cover 1-3")]
    UnsupportedDimension(usize),

    /// Grid size too small for a half-spectrum transform.
    #[error("invalid grid size {0}: at least 2 points per axis required")]
    InvalidGridSize(usize),

    /// The cascade scale ladder cannot be built from the given parameters.
    #[error(
        "degenerate scale ladder: number_of_modes={modes}, \
         correlation_length={correlation_length}, grid spacing={spacing}"
    )]
    DegenerateScaleLadder {
        modes: usize,
        correlation_length: f64,
        spacing: f64,
    },

    /// The Lagrangian mapper requires an explicit non-zero CFL factor.
    #[error("cfl must be non-zero for Lagrangian coordinate advection")]
    ZeroCfl,

    /// Stored arrays use a different element type than the field expects.
    #[error("stored dtype is {found}, expected {expected}")]
    DtypeMismatch {
        expected: &'static str,
        found: String,
    },

    /// Stored arrays have a different element count than the field expects.
    #[error("stored component has {found} elements, expected {expected}")]
    ShapeMismatch { expected: usize, found: usize },

    /// The per-field worker pool could not be constructed.
    #[error("failed to build thread pool: {0}")]
    ThreadPool(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
