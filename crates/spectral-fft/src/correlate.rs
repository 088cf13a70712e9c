//! Spectral cross-correlation with optional coefficient truncation.
//!
//! `out[t] = sum_j signal[t + j] * kernel[j]`, computed as
//! `IFFT(FFT(signal) * conj(FFT(kernel)))` and cropped to the output size.
//! The signal is zero past its end, so outputs beyond the "valid" range see
//! zeros rather than wrapped samples as long as the transform is large enough.

use spectral_core::telemetry::timed;
use spectral_core::{ConvTelemetry, Result, SpectralError, Stage, NOOP_TELEMETRY};
use tracing::trace;

use crate::energy::{joint_index, IndexRule};
use crate::restore::truncate;
use crate::transform::{forward_transform_2d, inverse_transform_2d, Extent, Spectrum};

/// Cross-correlation kernel bound to one index rule and one telemetry sink.
#[derive(Clone, Copy)]
pub struct CrossCorrelation<'a> {
    rule: IndexRule,
    telemetry: &'a dyn ConvTelemetry,
}

impl std::fmt::Debug for CrossCorrelation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossCorrelation")
            .field("rule", &self.rule)
            .finish_non_exhaustive()
    }
}

impl CrossCorrelation<'static> {
    pub fn new(rule: IndexRule) -> Self {
        Self {
            rule,
            telemetry: &NOOP_TELEMETRY,
        }
    }
}

impl<'a> CrossCorrelation<'a> {
    pub fn with_telemetry<'b>(self, telemetry: &'b dyn ConvTelemetry) -> CrossCorrelation<'b> {
        CrossCorrelation {
            rule: self.rule,
            telemetry,
        }
    }

    pub fn rule(&self) -> IndexRule {
        self.rule
    }

    /// Transform a plane to `fft` with timing.
    pub fn transform(&self, plane: &[f64], shape: Extent, fft: Extent) -> Result<Spectrum> {
        timed(self.telemetry, Stage::Transform, || {
            forward_transform_2d(plane, shape, fft)
        })
    }

    /// Correlate two planes, returning an `out`-sized row-major plane.
    pub fn correlate_2d(
        &self,
        signal: &[f64],
        signal_shape: Extent,
        kernel: &[f64],
        kernel_shape: Extent,
        fft: Extent,
        out: Extent,
    ) -> Result<Vec<f64>> {
        let xs = self.transform(signal, signal_shape, fft)?;
        let ws = self.transform(kernel, kernel_shape, fft)?;
        self.correlate_spectra(&xs, &ws, out)
    }

    /// Correlate two spectra of the same transform size.
    ///
    /// With a compressing rule both spectra are truncated to the same index,
    /// multiplied, and restored to the transform size before inversion.
    pub fn correlate_spectra(&self, signal: &Spectrum, kernel: &Spectrum, out: Extent) -> Result<Vec<f64>> {
        let fft = signal.extent();
        let product = if self.rule.is_full() {
            timed(self.telemetry, Stage::Multiply, || signal.multiply_conj(kernel))?
        } else {
            let index = joint_index(signal, kernel, self.rule)?;
            trace!(
                index,
                full = fft.full_index(),
                rows = fft.rows,
                cols = fft.cols,
                "truncating spectra"
            );
            let (xt, wt) = timed(self.telemetry, Stage::Truncate, || {
                Ok::<_, SpectralError>((truncate(signal, index)?, truncate(kernel, index)?))
            })?;
            let block = timed(self.telemetry, Stage::Multiply, || xt.multiply_conj(&wt))?;
            timed(self.telemetry, Stage::Restore, || block.restore(fft))?
        };

        let full = timed(self.telemetry, Stage::Inverse, || {
            inverse_transform_2d(&product, fft)
        })?;
        Ok(crop(&full, fft, out))
    }
}

/// Take the leading `out` corner of a plane, zero-filling past its edge.
fn crop(plane: &[f64], extent: Extent, out: Extent) -> Vec<f64> {
    let mut result = vec![0.0; out.len()];
    let rows = out.rows.min(extent.rows);
    let cols = out.cols.min(extent.cols);
    for r in 0..rows {
        result[r * out.cols..r * out.cols + cols]
            .copy_from_slice(&plane[r * extent.cols..r * extent.cols + cols]);
    }
    result
}

/// 1D spectral cross-correlation of `signal` against `kernel`.
///
/// Both operands are transformed at `fft_size`; the result has `out_size`
/// samples.
pub fn correlate(
    signal: &[f64],
    kernel: &[f64],
    fft_size: usize,
    out_size: usize,
    rule: IndexRule,
) -> Result<Vec<f64>> {
    CrossCorrelation::new(rule).correlate_2d(
        signal,
        Extent::line(signal.len()),
        kernel,
        Extent::line(kernel.len()),
        Extent::line(fft_size),
        Extent::line(out_size),
    )
}

/// Direct O(n·m) cross-correlation of two lines.
pub fn correlate_direct(signal: &[f64], kernel: &[f64], out_size: usize) -> Vec<f64> {
    correlate_direct_2d(
        signal,
        Extent::line(signal.len()),
        kernel,
        Extent::line(kernel.len()),
        Extent::line(out_size),
    )
}

/// Direct O(n·m) cross-correlation of two planes.
pub fn correlate_direct_2d(
    signal: &[f64],
    signal_shape: Extent,
    kernel: &[f64],
    kernel_shape: Extent,
    out: Extent,
) -> Vec<f64> {
    let mut result = vec![0.0; out.len()];
    for oy in 0..out.rows {
        for ox in 0..out.cols {
            let mut acc = 0.0;
            for ky in 0..kernel_shape.rows {
                let y = oy + ky;
                if y >= signal_shape.rows {
                    break;
                }
                for kx in 0..kernel_shape.cols {
                    let x = ox + kx;
                    if x >= signal_shape.cols {
                        break;
                    }
                    acc += signal[y * signal_shape.cols + x] * kernel[ky * kernel_shape.cols + kx];
                }
            }
            result[oy * out.cols + ox] = acc;
        }
    }
    result
}
