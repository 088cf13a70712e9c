//! Spectral building blocks for FFT-based convolution.
//!
//! - [`transform`]: forward/inverse DFT over one or two axes with a cached planner
//! - [`energy`]: truncation index selection (energy rate, index back, fixed)
//! - [`restore`]: truncated spectra and Hermitian reconstruction to full size
//! - [`correlate`]: spectral cross-correlation plus a direct reference

pub mod correlate;
pub mod energy;
pub mod restore;
pub mod transform;

pub use correlate::{correlate, correlate_direct, correlate_direct_2d, CrossCorrelation};
pub use energy::{joint_index, select_index, select_spectrum_index, IndexRule};
pub use restore::{truncate, TruncatedSpectrum};
pub use transform::{
    forward_transform, forward_transform_2d, inverse_transform, inverse_transform_2d, Extent,
    Spectrum,
};
