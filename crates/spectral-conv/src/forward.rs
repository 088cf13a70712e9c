//! FFT-based convolution layer: configuration, forward pass and task fan-out.

use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use rayon::prelude::*;
use spectral_core::telemetry::timed;
use spectral_core::{
    CompressionMode, ConvConfig, ConvTelemetry, NoopTelemetry, Result, SpectralError, Stage,
};
use spectral_fft::{CrossCorrelation, Extent, IndexRule, Spectrum};
use tracing::debug;

use crate::cache::ConvCache;
use crate::geometry::ConvGeometry;
use crate::tensor::{bias_from_tensor, pad_planes, Batch};

/// Cross-correlation convolution computed in the Fourier domain.
///
/// Shapes follow the usual layer convention: input `[N, Cin, *]`, filter
/// `[Cout, Cin, *]`, bias `[Cout]`, where `*` is `W` or `H, W`.
#[derive(Clone)]
pub struct FftConv {
    pub(crate) config: ConvConfig,
    pub(crate) mode: CompressionMode,
    pub(crate) telemetry: Arc<dyn ConvTelemetry>,
}

impl std::fmt::Debug for FftConv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FftConv")
            .field("config", &self.config)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl FftConv {
    /// Validate `config` for the spectral path (stride 1, one compression mode).
    pub fn new(config: ConvConfig) -> Result<Self> {
        config.validate_for_fft()?;
        let mode = config.compression_mode()?;
        Ok(Self {
            config,
            mode,
            telemetry: Arc::new(NoopTelemetry),
        })
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn ConvTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn config(&self) -> &ConvConfig {
        &self.config
    }

    pub fn mode(&self) -> CompressionMode {
        self.mode
    }

    pub(crate) fn kernel(&self) -> CrossCorrelation<'_> {
        CrossCorrelation::new(IndexRule::from(self.mode)).with_telemetry(self.telemetry.as_ref())
    }

    /// Forward pass on tensors. The output has the dtype and device of `x`.
    pub fn forward(
        &self,
        x: &Tensor,
        w: &Tensor,
        bias: Option<&Tensor>,
    ) -> Result<(Tensor, ConvCache)> {
        let xb = Batch::from_tensor(x)?;
        let wb = Batch::from_tensor(w)?;
        let bias = match bias {
            Some(b) => bias_from_tensor(b)?,
            None => vec![0.0; wb.n],
        };
        let (out, cache) = self.run_forward(xb, wb, bias, x.dtype(), x.device().clone())?;
        Ok((out.to_tensor(x.dtype(), x.device())?, cache))
    }

    /// Forward pass on f64 batches.
    pub fn forward_batch(&self, x: &Batch, w: &Batch, bias: &[f64]) -> Result<(Batch, ConvCache)> {
        self.run_forward(x.clone(), w.clone(), bias.to_vec(), DType::F64, Device::Cpu)
    }

    fn run_forward(
        &self,
        x: Batch,
        w: Batch,
        bias: Vec<f64>,
        dtype: DType,
        device: Device,
    ) -> Result<(Batch, ConvCache)> {
        let geometry = ConvGeometry::resolve(&x, &w, &self.config, self.mode)?;
        if bias.len() != geometry.out_channels {
            return Err(SpectralError::shape(&[geometry.out_channels], &[bias.len()]));
        }
        debug!(
            rank = ?geometry.rank,
            batch = geometry.batch,
            in_channels = geometry.in_channels,
            out_channels = geometry.out_channels,
            fft = ?geometry.fft.as_tuple(),
            out = ?geometry.out.as_tuple(),
            mode = ?self.mode,
            "fft conv forward"
        );

        let kernel = self.kernel();
        let telemetry = self.telemetry.as_ref();
        let parallel = self.config.parallel;
        let pad = (geometry.padding.rows as isize, geometry.padding.cols as isize);

        let xpad = timed(telemetry, Stage::Pad, || pad_planes(&x, pad, pad))?;
        let x_spectra = transform_planes(kernel, &xpad, geometry.fft, parallel)?;
        let w_spectra = transform_planes(kernel, &w, geometry.fft, parallel)?;

        let cin = geometry.in_channels;
        let cout = geometry.out_channels;
        let planes = map_tasks(parallel, geometry.batch * cout, |task| {
            let (n, co) = (task / cout, task % cout);
            let mut acc = vec![bias[co]; geometry.out.len()];
            for ci in 0..cin {
                let part = kernel.correlate_spectra(
                    &x_spectra[n * cin + ci],
                    &w_spectra[co * cin + ci],
                    geometry.out,
                )?;
                timed(telemetry, Stage::Accumulate, || add_into(&mut acc, &part));
            }
            Ok(acc)
        })?;

        let out = Batch::from_planes(planes, geometry.batch, cout, geometry.out, geometry.rank)?;
        let cache = ConvCache {
            x,
            w,
            bias,
            config: self.config.clone(),
            mode: self.mode,
            geometry,
            dtype,
            device,
        };
        Ok((out, cache))
    }
}

/// Run `count` independent tasks, on the rayon pool when `parallel`.
///
/// Each task owns its result slot; results come back in task order.
pub(crate) fn map_tasks<T, F>(parallel: bool, count: usize, task: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> Result<T> + Sync + Send,
{
    if parallel {
        (0..count).into_par_iter().map(task).collect()
    } else {
        (0..count).map(task).collect()
    }
}

/// Spectra of every `(n, c)` plane of `batch` at transform size `fft`.
pub(crate) fn transform_planes(
    kernel: CrossCorrelation<'_>,
    batch: &Batch,
    fft: Extent,
    parallel: bool,
) -> Result<Vec<Spectrum>> {
    let channels = batch.channels;
    map_tasks(parallel, batch.n * channels, |i| {
        kernel.transform(batch.plane(i / channels, i % channels), batch.plane, fft)
    })
}

pub(crate) fn add_into(acc: &mut [f64], part: &[f64]) {
    for (a, p) in acc.iter_mut().zip(part) {
        *a += p;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectral_core::StageTimings;

    #[test]
    fn test_forward_matches_valid_correlation() {
        let conv = FftConv::new(ConvConfig::default()).unwrap();
        let x = Batch::line(vec![1.0, 2.0, 3.0, 4.0], 1, 1, 4).unwrap();
        let w = Batch::line(vec![2.0, 1.0], 1, 1, 2).unwrap();
        let (out, cache) = conv.forward_batch(&x, &w, &[0.5]).unwrap();
        assert_eq!(out.dims(), vec![1, 1, 3]);
        for (a, e) in out.data.iter().zip([4.5, 7.5, 10.5]) {
            assert!((a - e).abs() < 1e-9, "{} vs {}", a, e);
        }
        assert_eq!(cache.geometry().fft, Extent::line(8));
    }

    #[test]
    fn test_stride_rejected() {
        let cfg = ConvConfig {
            stride: 2,
            ..Default::default()
        };
        let err = FftConv::new(cfg).unwrap_err();
        assert!(err.to_string().contains("stride 1 only"));
    }

    #[test]
    fn test_bias_length_checked() {
        let conv = FftConv::new(ConvConfig::default()).unwrap();
        let x = Batch::line(vec![1.0; 4], 1, 1, 4).unwrap();
        let w = Batch::line(vec![1.0; 4], 2, 1, 2).unwrap();
        let err = conv.forward_batch(&x, &w, &[0.0]).unwrap_err();
        assert!(matches!(err, SpectralError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_parallel_matches_serial() {
        let x: Vec<f64> = (0..2 * 3 * 12).map(|i| (i as f64 * 0.3).sin()).collect();
        let w: Vec<f64> = (0..4 * 3 * 3).map(|i| (i as f64 * 0.7).cos()).collect();
        let x = Batch::line(x, 2, 3, 12).unwrap();
        let w = Batch::line(w, 4, 3, 3).unwrap();
        let bias = [0.1, -0.2, 0.3, 0.0];

        let cfg = ConvConfig::default().with_padding(1).with_preserve_energy(90.0);
        let serial = FftConv::new(cfg.clone()).unwrap();
        let parallel = FftConv::new(cfg.with_parallel(true)).unwrap();

        let (a, _) = serial.forward_batch(&x, &w, &bias).unwrap();
        let (b, _) = parallel.forward_batch(&x, &w, &bias).unwrap();
        assert_eq!(a.data, b.data);
    }

    #[test]
    fn test_telemetry_sees_every_pair() {
        let timings = Arc::new(StageTimings::new());
        let conv = FftConv::new(ConvConfig::default())
            .unwrap()
            .with_telemetry(timings.clone());
        let x = Batch::line(vec![1.0; 2 * 3 * 6], 2, 3, 6).unwrap();
        let w = Batch::line(vec![1.0; 4 * 3 * 2], 4, 3, 2).unwrap();
        conv.forward_batch(&x, &w, &[0.0; 4]).unwrap();

        let snap = timings.snapshot();
        // 2*3 input planes + 4*3 filter planes
        assert_eq!(snap[&Stage::Transform].calls, 18);
        // one inverse per (n, cout, cin) triple
        assert_eq!(snap[&Stage::Inverse].calls, 24);
        assert_eq!(snap[&Stage::Pad].calls, 1);
    }
}
