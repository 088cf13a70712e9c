//! State captured by a forward call for its matching backward call.

use candle_core::{DType, Device};
use spectral_core::{CompressionMode, ConvConfig};

use crate::geometry::ConvGeometry;
use crate::tensor::Batch;

/// Forward-pass capture.
///
/// Immutable once created. [`crate::FftConv::backward`] takes it by value, so
/// each cache backs exactly one backward call.
#[derive(Debug)]
pub struct ConvCache {
    pub(crate) x: Batch,
    pub(crate) w: Batch,
    pub(crate) bias: Vec<f64>,
    pub(crate) config: ConvConfig,
    pub(crate) mode: CompressionMode,
    pub(crate) geometry: ConvGeometry,
    pub(crate) dtype: DType,
    pub(crate) device: Device,
}

impl ConvCache {
    pub fn geometry(&self) -> &ConvGeometry {
        &self.geometry
    }

    pub fn config(&self) -> &ConvConfig {
        &self.config
    }

    pub fn mode(&self) -> CompressionMode {
        self.mode
    }

    pub fn input(&self) -> &Batch {
        &self.x
    }

    pub fn weight(&self) -> &Batch {
        &self.w
    }

    pub fn bias(&self) -> &[f64] {
        &self.bias
    }
}
