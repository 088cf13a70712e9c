//! Truncation index selection.
//!
//! An index `k` keeps the one-sided coefficients whose band is below `k`.
//! For a line the band of column `w` is `w`; for a plane the band of
//! `(h, w)` is `max(min(h, rows - h), w)`, so one index shrinks both axes
//! together and a single-row plane reduces to the line rule.

use num_complex::Complex64;
use spectral_core::{CompressionMode, Result, SpectralError};

use crate::transform::Spectrum;

/// Rule deciding how many leading bands to keep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndexRule {
    /// Keep everything.
    Full,
    /// Smallest prefix holding at least this fraction of the energy.
    EnergyRate(f64),
    /// Drop this many trailing bands.
    IndexBack(usize),
    /// Drop this percentage of the coefficients. Lines drop that share of
    /// the bands; planes keep `sqrt(1 - p/100)` of the one-sided width so
    /// the retained area shrinks by the percentage.
    CompressRate(f64),
    /// Keep exactly this many bands (clamped to the available count).
    Fixed(usize),
}

impl IndexRule {
    pub fn is_full(&self) -> bool {
        matches!(self, IndexRule::Full)
    }
}

impl From<CompressionMode> for IndexRule {
    fn from(mode: CompressionMode) -> Self {
        match mode {
            CompressionMode::None => IndexRule::Full,
            CompressionMode::EnergyRate(rate) => IndexRule::EnergyRate(rate),
            CompressionMode::IndexBack(count) => IndexRule::IndexBack(count),
            CompressionMode::CompressRate(percent) => IndexRule::CompressRate(percent),
            CompressionMode::OutSize(size) => IndexRule::Fixed(size / 2 + 1),
        }
    }
}

/// Select an index over a one-sided spectrum slice.
pub fn select_index(one_sided: &[Complex64], rule: IndexRule) -> Result<usize> {
    let energies: Vec<f64> = one_sided.iter().map(|c| c.norm_sqr()).collect();
    select_from_bands(&energies, rule)
}

/// Select an index for a full 1D or 2D spectrum.
pub fn select_spectrum_index(spectrum: &Spectrum, rule: IndexRule) -> Result<usize> {
    if let IndexRule::Fixed(k) = rule {
        // No energies needed.
        let full = spectrum.extent().full_index();
        return Ok(k.clamp(1, full));
    }
    let extent = spectrum.extent();
    if let IndexRule::CompressRate(percent) = rule {
        if extent.rows > 1 {
            return area_compress_index(extent.half_cols().min(extent.cols), percent);
        }
    }
    select_from_bands(&band_energies(spectrum), rule)
}

/// Shared index for a signal/kernel pair: the larger of the two selections.
pub fn joint_index(signal: &Spectrum, kernel: &Spectrum, rule: IndexRule) -> Result<usize> {
    if signal.extent() != kernel.extent() {
        return Err(SpectralError::SpectrumSize {
            spectrum: kernel.extent().as_tuple(),
            target: signal.extent().as_tuple(),
        });
    }
    let a = select_spectrum_index(signal, rule)?;
    let b = select_spectrum_index(kernel, rule)?;
    Ok(a.max(b))
}

/// Energy per band over the one-sided (along W) spectrum.
pub fn band_energies(spectrum: &Spectrum) -> Vec<f64> {
    let extent = spectrum.extent();
    if extent.is_empty() {
        return Vec::new();
    }
    let half = extent.half_cols().min(extent.cols);
    let mut bands = vec![0.0; extent.full_index()];
    for h in 0..extent.rows {
        let row_band = h.min(extent.rows - h);
        for w in 0..half {
            bands[row_band.max(w)] += spectrum.coefficient(h, w).norm_sqr();
        }
    }
    bands
}

fn select_from_bands(bands: &[f64], rule: IndexRule) -> Result<usize> {
    let full = bands.len();
    if full == 0 {
        return Err(SpectralError::NumericDegeneracy(
            "cannot select a truncation index for an empty spectrum".into(),
        ));
    }

    let index = match rule {
        IndexRule::Full => full,
        IndexRule::Fixed(k) => k.min(full),
        IndexRule::IndexBack(back) => drop_trailing(full, back)?,
        IndexRule::CompressRate(percent) => {
            check_compress_rate(percent)?;
            let back = (full as f64 * percent / 100.0).floor() as usize;
            drop_trailing(full, back)?
        }
        IndexRule::EnergyRate(rate) => {
            if !(0.0..=1.0).contains(&rate) {
                return Err(SpectralError::InvalidConfig(format!(
                    "energy rate must be in [0, 1], got {}",
                    rate
                )));
            }
            let total: f64 = bands.iter().sum();
            let threshold = rate * total;
            let mut cumulative = 0.0;
            let mut index = full;
            for (i, e) in bands.iter().enumerate() {
                cumulative += e;
                if cumulative >= threshold {
                    index = i + 1;
                    break;
                }
            }
            index
        }
    };

    Ok(index.max(1))
}

fn check_compress_rate(percent: f64) -> Result<()> {
    if !(0.0..100.0).contains(&percent) {
        return Err(SpectralError::InvalidConfig(format!(
            "compress rate must be in [0, 100), got {}",
            percent
        )));
    }
    Ok(())
}

fn area_compress_index(half_cols: usize, percent: f64) -> Result<usize> {
    check_compress_rate(percent)?;
    if half_cols == 0 {
        return Err(SpectralError::NumericDegeneracy(
            "cannot select a truncation index for an empty spectrum".into(),
        ));
    }
    let retain = ((100.0 - percent) / 100.0).sqrt();
    let index = (half_cols as f64 * retain).floor() as usize;
    Ok(index.clamp(1, half_cols))
}

fn drop_trailing(full: usize, back: usize) -> Result<usize> {
    if back > full {
        return Err(SpectralError::NumericDegeneracy(format!(
            "index_back {} exceeds {} one-sided coefficients",
            back, full
        )));
    }
    Ok(full - back)
}
