//! FFT-based convolution layer engine.
//!
//! Computes 1D and 2D cross-correlation (the neural-network "convolution")
//! through the Fourier domain, optionally discarding high-frequency
//! coefficients, together with its exact analytic backward pass.
//!
//! ```no_run
//! use spectral_conv::{Batch, ConvConfig, FftConv};
//!
//! let conv = FftConv::new(ConvConfig::default().with_preserve_energy(90.0))?;
//! let x = Batch::line(vec![1.0, 2.0, 3.0], 1, 1, 3)?;
//! let w = Batch::line(vec![2.0, 1.0], 1, 1, 2)?;
//! let (out, cache) = conv.forward_batch(&x, &w, &[0.0])?;
//! let dout = Batch::line(vec![1.0; out.data.len()], 1, 1, out.data.len())?;
//! let grads = conv.backward_batch(&dout, cache)?;
//! # Ok::<(), spectral_conv::SpectralError>(())
//! ```

pub mod backward;
pub mod cache;
pub mod direct;
pub mod forward;
pub mod geometry;
pub mod logging;
pub mod pool;
pub mod tensor;

pub use backward::{BatchGrads, ConvGrads};
pub use cache::ConvCache;
pub use forward::FftConv;
pub use geometry::ConvGeometry;
pub use pool::{fft_pool_backward, fft_pool_forward, PoolCache};
pub use tensor::{Batch, SpatialRank};

pub use spectral_core::{
    CompressionMode, ConvConfig, ConvTelemetry, EngineConfig, Result, SpectralError, Stage,
    StageTimings,
};
