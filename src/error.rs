//! Error taxonomy for the HueSlicer geometry pipeline.
//!
//! Mirrors the kinds in spec §7: most are fatal and surfaced to the caller,
//! but `EmptySeam`, `OpenLoop`, and `DroppedDegenerate` are recovered locally
//! by the stage that encounters them and only ever appear as the `kind` of a
//! [`crate::diagnostics::Diagnostic`] — they are part of this enum so callers
//! have a single canonical name to match against.

/// Error type for all fallible HueSlicer operations.
#[derive(Debug, thiserror::Error)]
pub enum HueSlicerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("malformed mesh container: {0}")]
    FormatError(String),

    #[error("i/o error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("seam finder found no finite-cost cell in the terminal row")]
    EmptySeam,

    #[error("cap reconstruction could not close loop for cut {cut_id}")]
    OpenLoop { cut_id: String },

    #[error("dropped degenerate triangle: {0}")]
    DroppedDegenerate(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, HueSlicerError>;
