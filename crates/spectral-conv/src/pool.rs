//! Spectral pooling for 1D signals.
//!
//! Downsampling keeps the lowest `out / 2 + 1` one-sided coefficients of each
//! channel and inverts at the output length. The backward pass is the exact
//! adjoint: `dout` is transformed, its Nyquist bin halved when it is not
//! self-mirrored at the input length, restored to the input length and
//! rescaled by `input / out`.

use candle_core::{DType, Device, Tensor};
use spectral_core::{Result, SpectralError};
use spectral_fft::{forward_transform, inverse_transform, truncate, Extent};
use tracing::debug;

use crate::tensor::{Batch, SpatialRank};

/// State kept between pooling forward and backward.
#[derive(Debug)]
pub struct PoolCache {
    input_len: usize,
    out_len: usize,
    dtype: DType,
    device: Device,
}

impl PoolCache {
    pub fn input_len(&self) -> usize {
        self.input_len
    }

    pub fn out_len(&self) -> usize {
        self.out_len
    }
}

fn check_lengths(input_len: usize, out_len: usize) -> Result<()> {
    if out_len == 0 || out_len > input_len {
        return Err(SpectralError::InvalidConfig(format!(
            "spectral pooling needs 0 < out ({}) <= input ({})",
            out_len, input_len
        )));
    }
    Ok(())
}

fn require_line(batch: &Batch) -> Result<()> {
    if batch.rank != SpatialRank::One {
        return Err(SpectralError::InvalidConfig(
            "spectral pooling is defined for [N, C, W] inputs".into(),
        ));
    }
    Ok(())
}

/// Pool every plane of `x` from `W` to `out_len` samples.
pub fn pool_forward(x: &Batch, out_len: usize) -> Result<Batch> {
    require_line(x)?;
    let input_len = x.plane.cols;
    check_lengths(input_len, out_len)?;
    debug!(input_len, out_len, "spectral pool forward");

    let index = out_len / 2 + 1;
    let mut out = Batch::zeros(x.n, x.channels, Extent::line(out_len), SpatialRank::One);
    for n in 0..x.n {
        for c in 0..x.channels {
            let spectrum = forward_transform(x.plane(n, c), input_len)?;
            let restored = truncate(&spectrum, index)?.restore(Extent::line(out_len))?;
            let line = inverse_transform(&restored, out_len)?;
            out.plane_mut(n, c).copy_from_slice(&line);
        }
    }
    Ok(out)
}

/// Gradient of [`pool_forward`] with respect to its input.
pub fn pool_backward(dout: &Batch, input_len: usize) -> Result<Batch> {
    require_line(dout)?;
    let out_len = dout.plane.cols;
    check_lengths(input_len, out_len)?;

    let index = out_len / 2 + 1;
    let halve_nyquist = out_len % 2 == 0 && out_len < input_len;
    let scale = input_len as f64 / out_len as f64;

    let mut dx = Batch::zeros(dout.n, dout.channels, Extent::line(input_len), SpatialRank::One);
    for n in 0..dout.n {
        for c in 0..dout.channels {
            let mut spectrum = forward_transform(dout.plane(n, c), out_len)?;
            if halve_nyquist {
                spectrum.scale_bin(0, out_len / 2, 0.5);
            }
            let restored = truncate(&spectrum, index)?.restore(Extent::line(input_len))?;
            let line = inverse_transform(&restored, input_len)?;
            for (d, v) in dx.plane_mut(n, c).iter_mut().zip(line) {
                *d = v * scale;
            }
        }
    }
    Ok(dx)
}

/// Tensor forward: `[N, C, W] -> [N, C, out_len]`.
pub fn fft_pool_forward(x: &Tensor, out_len: usize) -> Result<(Tensor, PoolCache)> {
    let batch = Batch::from_tensor(x)?;
    let pooled = pool_forward(&batch, out_len)?;
    let cache = PoolCache {
        input_len: batch.plane.cols,
        out_len,
        dtype: x.dtype(),
        device: x.device().clone(),
    };
    Ok((pooled.to_tensor(x.dtype(), x.device())?, cache))
}

/// Tensor backward, consuming the forward cache.
pub fn fft_pool_backward(dout: &Tensor, cache: PoolCache) -> Result<Tensor> {
    let batch = Batch::from_tensor(dout)?;
    if batch.plane.cols != cache.out_len {
        return Err(SpectralError::shape(
            &[batch.n, batch.channels, cache.out_len],
            dout.dims(),
        ));
    }
    let dx = pool_backward(&batch, cache.input_len)?;
    dx.to_tensor(cache.dtype, &cache.device)
}
