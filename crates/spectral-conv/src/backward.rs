//! Analytic backward pass for [`FftConv`].
//!
//! - `db[co]` sums `dout[:, co]`.
//! - `dw[co, ci]` correlates the padded input against `dout`.
//! - `dx[n, ci]` correlates `dout`, padded (or cropped) to `input + kernel - 1`,
//!   against the flipped filter.

use candle_core::Tensor;
use spectral_core::telemetry::timed;
use spectral_core::{CompressionMode, Result, SpectralError, Stage};
use tracing::{debug, trace};

use crate::cache::ConvCache;
use crate::forward::{add_into, map_tasks, transform_planes, FftConv};
use crate::tensor::{flip_planes, pad_planes, Batch};

/// Gradients as tensors in the dtype and device of the forward input.
#[derive(Debug, Clone)]
pub struct ConvGrads {
    pub dx: Tensor,
    pub dw: Tensor,
    pub db: Tensor,
}

/// Gradients as f64 batches.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchGrads {
    pub dx: Batch,
    pub dw: Batch,
    pub db: Vec<f64>,
}

impl FftConv {
    /// Backward pass on tensors, consuming the forward cache.
    pub fn backward(&self, dout: &Tensor, cache: ConvCache) -> Result<ConvGrads> {
        let dout = Batch::from_tensor(dout)?;
        let dtype = cache.dtype;
        let device = cache.device.clone();
        let grads = self.backward_batch(&dout, cache)?;
        let db_len = grads.db.len();
        Ok(ConvGrads {
            dx: grads.dx.to_tensor(dtype, &device)?,
            dw: grads.dw.to_tensor(dtype, &device)?,
            db: Tensor::from_vec(grads.db, db_len, &device)?.to_dtype(dtype)?,
        })
    }

    /// Backward pass on f64 batches, consuming the forward cache.
    pub fn backward_batch(&self, dout: &Batch, cache: ConvCache) -> Result<BatchGrads> {
        if cache.config != self.config {
            return Err(SpectralError::InvariantViolation(
                "cache was produced by a differently configured convolution".into(),
            ));
        }
        let geometry = cache.geometry;
        let expected = geometry.out_dims();
        if dout.dims() != expected || dout.rank != geometry.rank {
            return Err(SpectralError::shape(&expected, &dout.dims()));
        }

        let kernel = self.kernel();
        let telemetry = self.telemetry.as_ref();
        let parallel = self.config.parallel;
        let (n_batch, cin, cout) = (geometry.batch, geometry.in_channels, geometry.out_channels);

        let db: Vec<f64> = (0..cout)
            .map(|co| (0..n_batch).map(|n| dout.plane(n, co).iter().sum::<f64>()).sum())
            .collect();

        // Filter gradient.
        let pad = (geometry.padding.rows as isize, geometry.padding.cols as isize);
        let xpad = timed(telemetry, Stage::Pad, || pad_planes(&cache.x, pad, pad))?;
        let fft_w = geometry.weight_grad_fft();
        debug!(fft = ?fft_w.as_tuple(), "filter gradient transform size");
        let x_spectra = transform_planes(kernel, &xpad, fft_w, parallel)?;
        let d_spectra = transform_planes(kernel, dout, fft_w, parallel)?;

        let dw_planes = map_tasks(parallel, cout * cin, |task| {
            let (co, ci) = (task / cin, task % cin);
            let mut acc = vec![0.0; geometry.kernel.len()];
            for n in 0..n_batch {
                let part = kernel.correlate_spectra(
                    &x_spectra[n * cin + ci],
                    &d_spectra[n * cout + co],
                    geometry.kernel,
                )?;
                timed(telemetry, Stage::Accumulate, || add_into(&mut acc, &part));
            }
            Ok(acc)
        })?;
        let dw = Batch::from_planes(dw_planes, cout, cin, geometry.kernel, geometry.rank)?;

        // Input gradient.
        let (rows, cols) = geometry.grad_padding();
        if !matches!(cache.mode, CompressionMode::OutSize(_))
            && (rows.before != rows.after || cols.before != cols.after)
        {
            return Err(SpectralError::InvariantViolation(format!(
                "asymmetric dout padding {:?}/{:?} for standard output size",
                rows, cols
            )));
        }
        trace!(
            before = ?(rows.before, cols.before),
            after = ?(rows.after, cols.after),
            crop = rows.before < 0 || cols.before < 0 || rows.after < 0 || cols.after < 0,
            "placing dout for input gradient"
        );
        let dpad = timed(telemetry, Stage::Pad, || {
            pad_planes(dout, (rows.before, cols.before), (rows.after, cols.after))
        })?;
        if dpad.plane != geometry.grad_extent() {
            return Err(SpectralError::InvariantViolation(format!(
                "padded dout is {:?}, expected {:?}",
                dpad.plane.as_tuple(),
                geometry.grad_extent().as_tuple()
            )));
        }

        let fft_x = geometry.input_grad_fft();
        debug!(fft = ?fft_x.as_tuple(), "input gradient transform size");
        let flipped = flip_planes(&cache.w);
        let p_spectra = transform_planes(kernel, &dpad, fft_x, parallel)?;
        let f_spectra = transform_planes(kernel, &flipped, fft_x, parallel)?;

        let dx_planes = map_tasks(parallel, n_batch * cin, |task| {
            let (n, ci) = (task / cin, task % cin);
            let mut acc = vec![0.0; geometry.input.len()];
            for co in 0..cout {
                let part = kernel.correlate_spectra(
                    &p_spectra[n * cout + co],
                    &f_spectra[co * cin + ci],
                    geometry.input,
                )?;
                timed(telemetry, Stage::Accumulate, || add_into(&mut acc, &part));
            }
            Ok(acc)
        })?;
        let dx = Batch::from_planes(dx_planes, n_batch, cin, geometry.input, geometry.rank)?;

        Ok(BatchGrads { dx, dw, db })
    }
}
