//! Direct nested-loop convolution (reference implementation).
//!
//! Supports any stride and symmetric zero padding. Used as the oracle for the
//! spectral path and as the baseline in benches; it never compresses.

use spectral_core::{ConvConfig, Result, SpectralError};
use spectral_fft::Extent;

use crate::backward::BatchGrads;
use crate::tensor::{pad_planes, Batch, SpatialRank};

struct DirectShape {
    padding: Extent,
    padded: Extent,
    out: Extent,
    stride: Extent,
}

fn resolve(x: &Batch, w: &Batch, config: &ConvConfig) -> Result<DirectShape> {
    config.validate()?;
    if config.compression_mode()?.is_compressing() {
        return Err(SpectralError::InvalidConfig(
            "direct convolution does not support spectral compression".into(),
        ));
    }
    if x.rank != w.rank {
        return Err(SpectralError::shape(&x.dims(), &w.dims()));
    }
    if x.channels != w.channels {
        return Err(SpectralError::ChannelMismatch {
            input: x.channels,
            filter: w.channels,
        });
    }

    let (padding, stride) = match x.rank {
        SpatialRank::One => (
            Extent::new(0, config.padding[1]),
            Extent::new(1, config.stride),
        ),
        SpatialRank::Two => (
            Extent::new(config.padding[0], config.padding[1]),
            Extent::new(config.stride, config.stride),
        ),
    };
    let padded = Extent::new(
        x.plane.rows + 2 * padding.rows,
        x.plane.cols + 2 * padding.cols,
    );
    if !w.plane.fits_in(padded) {
        return Err(SpectralError::InvalidConfig(format!(
            "kernel {:?} exceeds padded input {:?}",
            w.plane.as_tuple(),
            padded.as_tuple()
        )));
    }
    let out = Extent::new(
        (padded.rows - w.plane.rows) / stride.rows + 1,
        (padded.cols - w.plane.cols) / stride.cols + 1,
    );
    Ok(DirectShape {
        padding,
        padded,
        out,
        stride,
    })
}

fn padded_input(x: &Batch, padding: Extent) -> Result<Batch> {
    let pad = (padding.rows as isize, padding.cols as isize);
    pad_planes(x, pad, pad)
}

/// Forward pass: `out[n, co] = bias[co] + sum_ci xcorr(xpad[n, ci], w[co, ci])`.
pub fn conv_forward(x: &Batch, w: &Batch, bias: &[f64], config: &ConvConfig) -> Result<Batch> {
    let shape = resolve(x, w, config)?;
    if bias.len() != w.n {
        return Err(SpectralError::shape(&[w.n], &[bias.len()]));
    }
    let xpad = padded_input(x, shape.padding)?;
    let (kh, kw) = w.plane.as_tuple();
    let mut out = Batch::zeros(x.n, w.n, shape.out, x.rank);

    for n in 0..x.n {
        for oc in 0..w.n {
            let dst = out.plane_mut(n, oc);
            for oh in 0..shape.out.rows {
                for ow in 0..shape.out.cols {
                    let mut sum = 0.0;
                    for ic in 0..x.channels {
                        let src = xpad.plane(n, ic);
                        let filt = w.plane(oc, ic);
                        for r in 0..kh {
                            for c in 0..kw {
                                let ih = oh * shape.stride.rows + r;
                                let iw = ow * shape.stride.cols + c;
                                sum += src[ih * shape.padded.cols + iw] * filt[r * kw + c];
                            }
                        }
                    }
                    dst[oh * shape.out.cols + ow] = sum + bias[oc];
                }
            }
        }
    }
    Ok(out)
}

/// Backward pass of [`conv_forward`].
pub fn conv_backward(dout: &Batch, x: &Batch, w: &Batch, config: &ConvConfig) -> Result<BatchGrads> {
    let shape = resolve(x, w, config)?;
    let expected = Batch::zeros(x.n, w.n, shape.out, x.rank).dims();
    if dout.dims() != expected {
        return Err(SpectralError::shape(&expected, &dout.dims()));
    }
    let xpad = padded_input(x, shape.padding)?;
    let (kh, kw) = w.plane.as_tuple();

    let mut dxpad = Batch::zeros(x.n, x.channels, shape.padded, x.rank);
    let mut dw = Batch::zeros(w.n, w.channels, w.plane, w.rank);
    let mut db = vec![0.0; w.n];

    for n in 0..x.n {
        for oc in 0..w.n {
            let grad = dout.plane(n, oc);
            db[oc] += grad.iter().sum::<f64>();
            for ic in 0..x.channels {
                for oh in 0..shape.out.rows {
                    for ow in 0..shape.out.cols {
                        let g = grad[oh * shape.out.cols + ow];
                        for r in 0..kh {
                            for c in 0..kw {
                                let ih = oh * shape.stride.rows + r;
                                let iw = ow * shape.stride.cols + c;
                                let pi = ih * shape.padded.cols + iw;
                                dw.plane_mut(oc, ic)[r * kw + c] += g * xpad.plane(n, ic)[pi];
                                dxpad.plane_mut(n, ic)[pi] += g * w.plane(oc, ic)[r * kw + c];
                            }
                        }
                    }
                }
            }
        }
    }

    let crop = (-(shape.padding.rows as isize), -(shape.padding.cols as isize));
    let dx = pad_planes(&dxpad, crop, crop)?;
    Ok(BatchGrads { dx, dw, db })
}
