//! Centralized error types for spectral convolution.
//!
//! Uses thiserror for ergonomic error handling with context. Every failure is
//! reported synchronously to the immediate caller; nothing is retried.

use thiserror::Error;

/// Main error type for spectral convolution operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SpectralError {
    /// Invalid or conflicting configuration (e.g. two compression modes, stride != 1).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Tensor shape mismatch.
    #[error("Tensor shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Input and filter disagree on the number of input channels.
    #[error("Channel mismatch: input has {input} channels, filter expects {filter}")]
    ChannelMismatch { input: usize, filter: usize },

    /// Degenerate spectral parameters (empty spectrum, negative truncation index).
    #[error("Numeric degeneracy: {0}")]
    NumericDegeneracy(String),

    /// Transform length is zero or shorter than the signal.
    #[error("Invalid transform length {length} for signal of length {signal_len}")]
    InvalidTransformLength { length: usize, signal_len: usize },

    /// A spectrum cannot be restored to (or combined at) the requested size.
    #[error("Spectrum of size {spectrum:?} does not fit target size {target:?}")]
    SpectrumSize {
        spectrum: (usize, usize),
        target: (usize, usize),
    },

    /// Forward/backward bookkeeping disagreed (kernel, stride or shapes changed).
    #[error("Internal invariant violated: {0}")]
    InvariantViolation(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Candle tensor library error.
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    /// Generic error with context.
    #[error("{0}")]
    Other(String),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, SpectralError>;

impl SpectralError {
    /// Errors caused by the caller's arguments rather than by the engine.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            SpectralError::InvalidConfig(_)
                | SpectralError::ShapeMismatch { .. }
                | SpectralError::ChannelMismatch { .. }
                | SpectralError::InvalidTransformLength { .. }
        )
    }

    /// Errors raised by the spectral bookkeeping itself.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            SpectralError::NumericDegeneracy(_)
                | SpectralError::SpectrumSize { .. }
                | SpectralError::InvariantViolation(_)
        )
    }

    /// Shorthand for a shape mismatch between two dimension lists.
    pub fn shape(expected: &[usize], actual: &[usize]) -> Self {
        SpectralError::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}
