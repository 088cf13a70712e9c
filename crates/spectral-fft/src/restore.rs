//! Truncated spectra and their Hermitian reconstruction.

use num_complex::Complex64;
use spectral_core::{Result, SpectralError};

use crate::transform::{Extent, Spectrum};

/// Low-frequency corner of a real plane's spectrum.
///
/// Keeps the one-sided columns `0..cols` and the rows whose signed frequency
/// `f` satisfies `|f| < index`. Rows are stored by signed frequency so the
/// block can be placed into a transform of a different size.
#[derive(Debug, Clone, PartialEq)]
pub struct TruncatedSpectrum {
    rows: Vec<isize>,
    cols: usize,
    data: Vec<Complex64>,
}

/// Keep the bands below `index` of `spectrum`.
///
/// An index at or above the spectrum's full index keeps every one-sided
/// coefficient.
pub fn truncate(spectrum: &Spectrum, index: usize) -> Result<TruncatedSpectrum> {
    if index == 0 {
        return Err(SpectralError::NumericDegeneracy(
            "truncation index must keep the DC coefficient".into(),
        ));
    }
    let extent = spectrum.extent();
    let index = index.min(extent.full_index());
    let cols = index.min(extent.half_cols()).min(extent.cols);

    let mut rows = Vec::new();
    let mut data = Vec::new();
    for h in 0..extent.rows {
        let freq = signed_frequency(h, extent.rows);
        if freq.unsigned_abs() >= index {
            continue;
        }
        rows.push(freq);
        data.extend((0..cols).map(|w| spectrum.coefficient(h, w)));
    }

    Ok(TruncatedSpectrum {
        rows,
        cols,
        data,
    })
}

fn signed_frequency(h: usize, rows: usize) -> isize {
    if h <= rows / 2 {
        h as isize
    } else {
        h as isize - rows as isize
    }
}

impl TruncatedSpectrum {
    /// Number of retained coefficients.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Rows and columns of the retained block.
    pub fn block(&self) -> (usize, usize) {
        (self.rows.len(), self.cols)
    }

    /// Elementwise `self * conj(other)` over blocks of the same layout.
    pub fn multiply_conj(&self, other: &TruncatedSpectrum) -> Result<TruncatedSpectrum> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(SpectralError::SpectrumSize {
                spectrum: other.block(),
                target: self.block(),
            });
        }
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| a * b.conj())
            .collect();
        Ok(TruncatedSpectrum {
            rows: self.rows.clone(),
            cols: self.cols,
            data,
        })
    }

    /// Rebuild a full Hermitian spectrum of size `target`.
    ///
    /// Missing bands are zero. Self-mirrored columns (0 and the even-length
    /// Nyquist) are symmetrised and the remaining columns are filled with the
    /// conjugate mirror, so the inverse transform is real.
    pub fn restore(&self, target: Extent) -> Result<Spectrum> {
        let size_error = || SpectralError::SpectrumSize {
            spectrum: self.block(),
            target: target.as_tuple(),
        };
        if target.is_empty() || self.cols > target.half_cols() || self.cols > target.cols {
            return Err(size_error());
        }

        let Extent {
            rows: th,
            cols: tw,
        } = target;
        let mut out = vec![Complex64::new(0.0, 0.0); target.len()];
        let mut occupied = vec![false; th];
        for (i, &freq) in self.rows.iter().enumerate() {
            let r = freq.rem_euclid(th as isize) as usize;
            if occupied[r] {
                return Err(size_error());
            }
            occupied[r] = true;
            out[r * tw..r * tw + self.cols]
                .copy_from_slice(&self.data[i * self.cols..(i + 1) * self.cols]);
        }

        let mirror_row = |r: usize| (th - r) % th;

        let mut self_mirrored = vec![0];
        if tw % 2 == 0 && tw / 2 > 0 {
            self_mirrored.push(tw / 2);
        }
        for &w in &self_mirrored {
            let column: Vec<Complex64> = (0..th).map(|r| out[r * tw + w]).collect();
            for r in 0..th {
                out[r * tw + w] = (column[r] + column[mirror_row(r)].conj()) * 0.5;
            }
        }

        for w in 1..=(tw - 1) / 2 {
            for r in 0..th {
                out[r * tw + (tw - w)] = out[mirror_row(r) * tw + w].conj();
            }
        }

        Ok(Spectrum::from_parts(target, out))
    }
}
