use thiserror::Error;

/// Errors returned by q-digest operations.
#[derive(Clone, Copy, Debug, PartialEq, Error)]
pub enum Error {
    /// Two digests with different compression factors cannot be merged.
    #[error("compression factors must be the same: left is {left}, right is {right}")]
    CompressionMismatch {
        /// Compression factor of the left-hand digest.
        left: f64,
        /// Compression factor of the right-hand digest.
        right: f64,
    },

    /// The compression factor is zero, negative or not finite.
    #[error("compression factor must be finite and positive, got {0}")]
    InvalidCompression(f64),
}
