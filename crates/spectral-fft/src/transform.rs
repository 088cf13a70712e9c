//! Forward and inverse discrete Fourier transforms over one or two axes.
//!
//! A 1D signal is a plane with a single row; a length-1 transform axis is the
//! identity, so both ranks share one code path.

use num_complex::Complex64;
use rustfft::FftPlanner;
use spectral_core::{Result, SpectralError};
use std::cell::RefCell;

// Thread-local FFT planner cache to avoid re-planning for the same sizes.
thread_local! {
    static PLANNER: RefCell<FftPlanner<f64>> = RefCell::new(FftPlanner::new());
}

/// Size of a 2D plane (rows along H, columns along W).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent {
    pub rows: usize,
    pub cols: usize,
}

impl Extent {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// A single-row plane of `cols` samples.
    pub fn line(cols: usize) -> Self {
        Self { rows: 1, cols }
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Columns of the one-sided (along W) view.
    pub fn half_cols(&self) -> usize {
        self.cols / 2 + 1
    }

    /// Truncation index that keeps every coefficient.
    pub fn full_index(&self) -> usize {
        (self.rows / 2 + 1).max(self.cols / 2 + 1)
    }

    /// Whether `self` fits inside `other` along both axes.
    pub fn fits_in(&self, other: Extent) -> bool {
        self.rows <= other.rows && self.cols <= other.cols
    }

    pub fn as_tuple(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}

/// Full complex spectrum of a real plane, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    extent: Extent,
    data: Vec<Complex64>,
}

impl Spectrum {
    pub(crate) fn from_parts(extent: Extent, data: Vec<Complex64>) -> Self {
        debug_assert_eq!(extent.len(), data.len());
        Self { extent, data }
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// Transform length of a single-row spectrum.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[Complex64] {
        &self.data
    }

    pub fn coefficient(&self, row: usize, col: usize) -> Complex64 {
        self.data[row * self.extent.cols + col]
    }

    /// Multiply one bin in place.
    pub fn scale_bin(&mut self, row: usize, col: usize, factor: f64) {
        let cols = self.extent.cols;
        self.data[row * cols + col] *= factor;
    }

    /// First `cols / 2 + 1` coefficients of row 0.
    pub fn one_sided(&self) -> &[Complex64] {
        let half = self.extent.half_cols().min(self.extent.cols);
        &self.data[..half]
    }

    /// Elementwise `self * conj(other)`.
    pub fn multiply_conj(&self, other: &Spectrum) -> Result<Spectrum> {
        if self.extent != other.extent {
            return Err(SpectralError::SpectrumSize {
                spectrum: other.extent.as_tuple(),
                target: self.extent.as_tuple(),
            });
        }
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| a * b.conj())
            .collect();
        Ok(Spectrum::from_parts(self.extent, data))
    }
}

/// In-place transform of every contiguous row of length `cols`.
fn fft_rows(data: &mut [Complex64], cols: usize, inverse: bool) {
    if cols <= 1 {
        return;
    }
    PLANNER.with(|p| {
        let mut planner = p.borrow_mut();
        let fft = if inverse {
            planner.plan_fft_inverse(cols)
        } else {
            planner.plan_fft_forward(cols)
        };
        fft.process(data);
    });
}

/// In-place transform along the row axis via a transposed scratch buffer.
fn fft_cols(data: &mut [Complex64], extent: Extent, inverse: bool) {
    let Extent { rows, cols } = extent;
    if rows <= 1 {
        return;
    }
    let mut transposed = vec![Complex64::new(0.0, 0.0); data.len()];
    for r in 0..rows {
        for c in 0..cols {
            transposed[c * rows + r] = data[r * cols + c];
        }
    }
    fft_rows(&mut transposed, rows, inverse);
    for c in 0..cols {
        for r in 0..rows {
            data[r * cols + c] = transposed[c * rows + r];
        }
    }
}

/// Forward DFT of a real line, zero-padded on the trailing edge to `length`.
pub fn forward_transform(signal: &[f64], length: usize) -> Result<Spectrum> {
    forward_transform_2d(signal, Extent::line(signal.len()), Extent::line(length))
}

/// Forward 2D DFT of a real `shape` plane, zero-padded to `length` on the
/// trailing edge of each axis.
pub fn forward_transform_2d(signal: &[f64], shape: Extent, length: Extent) -> Result<Spectrum> {
    if signal.len() != shape.len() {
        return Err(SpectralError::shape(
            &[shape.rows, shape.cols],
            &[signal.len()],
        ));
    }
    check_length(length.rows, shape.rows)?;
    check_length(length.cols, shape.cols)?;

    let mut buf = vec![Complex64::new(0.0, 0.0); length.len()];
    for r in 0..shape.rows {
        let src = &signal[r * shape.cols..(r + 1) * shape.cols];
        let dst = &mut buf[r * length.cols..r * length.cols + shape.cols];
        for (d, &s) in dst.iter_mut().zip(src) {
            *d = Complex64::new(s, 0.0);
        }
    }

    fft_rows(&mut buf, length.cols, false);
    fft_cols(&mut buf, length, false);
    Ok(Spectrum::from_parts(length, buf))
}

/// Real part of the inverse DFT of a single-row spectrum of transform length
/// `length`.
///
/// The spectrum must already be at full size: a truncated spectrum has to be
/// restored first.
pub fn inverse_transform(spectrum: &Spectrum, length: usize) -> Result<Vec<f64>> {
    inverse_transform_2d(spectrum, Extent::line(length))
}

/// Real part of the 2D inverse DFT (normalised by `1 / (rows * cols)`).
pub fn inverse_transform_2d(spectrum: &Spectrum, length: Extent) -> Result<Vec<f64>> {
    check_length(length.rows, 1)?;
    check_length(length.cols, 1)?;
    if spectrum.extent != length {
        return Err(SpectralError::SpectrumSize {
            spectrum: spectrum.extent.as_tuple(),
            target: length.as_tuple(),
        });
    }

    let mut buf = spectrum.data.clone();
    fft_cols(&mut buf, length, true);
    fft_rows(&mut buf, length.cols, true);

    let scale = 1.0 / length.len() as f64;
    Ok(buf.iter().map(|c| c.re * scale).collect())
}

fn check_length(length: usize, signal_len: usize) -> Result<()> {
    if length == 0 || length < signal_len {
        return Err(SpectralError::InvalidTransformLength { length, signal_len });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fft_roundtrip() {
        // IFFT(FFT(x)) should approximately equal x
        let n = 64;
        let x: Vec<f64> = (0..n).map(|i| (i as f64 * 0.1).sin()).collect();

        let spec = forward_transform(&x, n).unwrap();
        let back = inverse_transform(&spec, n).unwrap();

        for i in 0..n {
            assert!(
                (back[i] - x[i]).abs() < 1e-10,
                "FFT roundtrip failed at {}: {} vs {}",
                i,
                back[i],
                x[i]
            );
        }
    }

    #[test]
    fn test_roundtrip_zero_pads_tail() {
        let x = [1.0, -2.0, 0.5];
        let spec = forward_transform(&x, 8).unwrap();
        let back = inverse_transform(&spec, 8).unwrap();
        assert_eq!(back.len(), 8);
        for (i, v) in back.iter().enumerate() {
            let expected = x.get(i).copied().unwrap_or(0.0);
            assert!((v - expected).abs() < 1e-12, "index {}: {}", i, v);
        }
    }

    #[test]
    fn test_dc_coefficient_is_sum() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let spec = forward_transform(&x, 4).unwrap();
        assert!((spec.coefficient(0, 0).re - 10.0).abs() < 1e-12);
        assert_eq!(spec.one_sided().len(), 3);
    }

    #[test]
    fn test_2d_roundtrip() {
        let shape = Extent::new(3, 5);
        let x: Vec<f64> = (0..15).map(|i| (i as f64 * 0.7).cos()).collect();
        let length = Extent::new(4, 8);

        let spec = forward_transform_2d(&x, shape, length).unwrap();
        assert_eq!(spec.extent(), length);
        let back = inverse_transform_2d(&spec, length).unwrap();

        for r in 0..length.rows {
            for c in 0..length.cols {
                let expected = if r < shape.rows && c < shape.cols {
                    x[r * shape.cols + c]
                } else {
                    0.0
                };
                assert!((back[r * length.cols + c] - expected).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn test_invalid_lengths() {
        let x = [1.0, 2.0, 3.0, 4.0];
        assert!(matches!(
            forward_transform(&x, 2),
            Err(SpectralError::InvalidTransformLength {
                length: 2,
                signal_len: 4
            })
        ));
        assert!(forward_transform(&x, 0).is_err());

        let spec = forward_transform(&x, 4).unwrap();
        assert!(matches!(
            inverse_transform(&spec, 8),
            Err(SpectralError::SpectrumSize { .. })
        ));
        assert!(inverse_transform(&spec, 0).is_err());
    }

    #[test]
    fn test_extent_indices() {
        assert_eq!(Extent::line(8).full_index(), 5);
        assert_eq!(Extent::line(7).full_index(), 4);
        assert_eq!(Extent::new(8, 4).full_index(), 5);
        assert_eq!(Extent::new(4, 4).half_cols(), 3);
    }
}
