//! Convolution configuration with TOML support.
//!
//! The caller-facing surface mirrors a standard convolution layer (padding,
//! stride) plus at most one spectral compression knob. The optional knobs are
//! resolved into a single [`CompressionMode`] before any computation starts.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SpectralError};

/// How many spectral coefficients a correlation keeps.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum CompressionMode {
    /// Keep the whole spectrum.
    #[default]
    None,
    /// Keep the shortest prefix of the one-sided spectrum holding this
    /// fraction (`0.0..=1.0`) of its energy.
    EnergyRate(f64),
    /// Drop this many trailing coefficients of the one-sided spectrum.
    IndexBack(usize),
    /// Drop this percentage (`0.0..100.0`) of the one-sided spectrum. Planes
    /// drop it from the retained coefficient area rather than the band count.
    CompressRate(f64),
    /// Produce exactly this output size per spatial axis, keeping
    /// `out_size / 2 + 1` coefficients (spectral pooling inside the conv).
    OutSize(usize),
}

impl CompressionMode {
    /// Whether this mode may discard coefficients.
    pub fn is_compressing(&self) -> bool {
        !matches!(self, CompressionMode::None)
    }

    /// Explicit output size, if this mode overrides the conv arithmetic.
    pub fn out_size(&self) -> Option<usize> {
        match self {
            CompressionMode::OutSize(size) => Some(*size),
            _ => None,
        }
    }
}

/// Transform-length policy for a linear correlation of combined length `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FftSizing {
    /// Round up to the next power of two.
    NextPowerOfTwo,
    /// Use the combined length as-is.
    Exact,
}

impl FftSizing {
    /// Transform length for a combined signal length.
    pub fn size_for(&self, n: usize) -> usize {
        match self {
            FftSizing::NextPowerOfTwo => n.max(1).next_power_of_two(),
            FftSizing::Exact => n.max(1),
        }
    }
}

/// Convolution layer configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConvConfig {
    /// Symmetric zero padding as `[height, width]`. 1D convolutions use the width.
    pub padding: [usize; 2],
    /// Stride. The spectral path supports 1 only.
    pub stride: usize,
    /// Percentage of trailing one-sided coefficients to drop.
    pub compress_rate: Option<f64>,
    /// Percentage of spectral energy to retain.
    pub preserve_energy: Option<f64>,
    /// Explicit number of trailing one-sided coefficients to drop.
    pub index_back: Option<usize>,
    /// Explicit output size per spatial axis.
    pub out_size: Option<usize>,
    /// Round transform lengths up to the next power of two.
    pub next_power2: bool,
    /// Spread independent channel pairs across the rayon pool.
    pub parallel: bool,
}

impl Default for ConvConfig {
    fn default() -> Self {
        Self {
            padding: [0, 0],
            stride: 1,
            compress_rate: None,
            preserve_energy: None,
            index_back: None,
            out_size: None,
            next_power2: true,
            parallel: false,
        }
    }
}

impl ConvConfig {
    /// Same symmetric padding on every spatial axis.
    pub fn with_padding(mut self, pad: usize) -> Self {
        self.padding = [pad, pad];
        self
    }

    /// Retain `percent` of the spectral energy.
    pub fn with_preserve_energy(mut self, percent: f64) -> Self {
        self.preserve_energy = Some(percent);
        self
    }

    /// Drop `percent` of the one-sided coefficients.
    pub fn with_compress_rate(mut self, percent: f64) -> Self {
        self.compress_rate = Some(percent);
        self
    }

    /// Drop `count` trailing one-sided coefficients.
    pub fn with_index_back(mut self, count: usize) -> Self {
        self.index_back = Some(count);
        self
    }

    /// Force the output size per spatial axis.
    pub fn with_out_size(mut self, size: usize) -> Self {
        self.out_size = Some(size);
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_next_power2(mut self, next_power2: bool) -> Self {
        self.next_power2 = next_power2;
        self
    }

    /// Output size that emulates `stride` on the spectral path.
    ///
    /// The spectral path runs at stride 1, so striding is expressed as an
    /// `out_size` of `(len + 2p - kernel) / stride + 1`, with `p` the width
    /// padding.
    pub fn spectral_stride_out_size(&self, len: usize, kernel: usize, stride: usize) -> Result<usize> {
        if stride == 0 {
            return Err(SpectralError::InvalidConfig("stride must be > 0".into()));
        }
        let padded = len + 2 * self.padding[1];
        if kernel == 0 || kernel > padded {
            return Err(SpectralError::InvalidConfig(format!(
                "kernel length {} does not fit padded length {}",
                kernel, padded
            )));
        }
        Ok((padded - kernel) / stride + 1)
    }

    /// Set `out_size` so the spectral path emulates `stride`.
    pub fn with_spectral_stride(self, len: usize, kernel: usize, stride: usize) -> Result<Self> {
        let size = self.spectral_stride_out_size(len, kernel, stride)?;
        Ok(self.with_out_size(size))
    }

    /// Transform-length policy.
    pub fn sizing(&self) -> FftSizing {
        if self.next_power2 {
            FftSizing::NextPowerOfTwo
        } else {
            FftSizing::Exact
        }
    }

    /// Validate value ranges (independent of the execution path).
    pub fn validate(&self) -> Result<()> {
        if self.stride == 0 {
            return Err(SpectralError::InvalidConfig("stride must be > 0".into()));
        }
        if let Some(rate) = self.compress_rate {
            if !(0.0..100.0).contains(&rate) {
                return Err(SpectralError::InvalidConfig(format!(
                    "compress_rate must be in [0, 100), got {}",
                    rate
                )));
            }
        }
        if let Some(energy) = self.preserve_energy {
            if !(energy > 0.0 && energy <= 100.0) {
                return Err(SpectralError::InvalidConfig(format!(
                    "preserve_energy must be in (0, 100], got {}",
                    energy
                )));
            }
        }
        if self.out_size == Some(0) {
            return Err(SpectralError::InvalidConfig("out_size must be > 0".into()));
        }
        self.compression_mode().map(|_| ())
    }

    /// Validate for the spectral path, which additionally requires stride 1.
    pub fn validate_for_fft(&self) -> Result<()> {
        self.validate()?;
        if self.stride != 1 {
            return Err(SpectralError::InvalidConfig(format!(
                "FFT convolution supports stride 1 only, got stride={}",
                self.stride
            )));
        }
        Ok(())
    }

    /// Resolve the optional knobs into exactly one compression mode.
    ///
    /// `preserve_energy = 100` and `compress_rate = 0` mean "no compression".
    pub fn compression_mode(&self) -> Result<CompressionMode> {
        let mut modes = Vec::new();
        if let Some(rate) = self.compress_rate.filter(|r| *r > 0.0) {
            modes.push(CompressionMode::CompressRate(rate));
        }
        if let Some(energy) = self.preserve_energy.filter(|e| *e < 100.0) {
            modes.push(CompressionMode::EnergyRate(energy / 100.0));
        }
        if let Some(count) = self.index_back {
            modes.push(CompressionMode::IndexBack(count));
        }
        if let Some(size) = self.out_size {
            modes.push(CompressionMode::OutSize(size));
        }
        match modes.len() {
            0 => Ok(CompressionMode::None),
            1 => Ok(modes[0]),
            _ => Err(SpectralError::InvalidConfig(
                "specify only one of: compress_rate, preserve_energy, index_back, out_size"
                    .into(),
            )),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Convolution parameters.
    pub conv: ConvConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            conv: ConvConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            SpectralError::Other(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.validate()?;
        let content = toml::to_string_pretty(self)
            .map_err(|e| SpectralError::Other(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Validate all sub-configs.
    pub fn validate(&self) -> Result<()> {
        if !matches!(
            self.log_level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(SpectralError::InvalidConfig(format!(
                "unknown log_level {:?}",
                self.log_level
            )));
        }
        self.conv.validate()
    }
}
