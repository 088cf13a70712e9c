//! Compression modes, output-size override and the shape contract.

use proptest::prelude::*;
use spectral_conv::tensor::pad_planes;
use spectral_conv::{direct, Batch, CompressionMode, ConvConfig, FftConv, SpectralError};
use spectral_fft::{correlate, IndexRule};

fn values(len: usize, phase: f64) -> Vec<f64> {
    (0..len).map(|i| ((i as f64 + phase) * 0.41).cos() * 2.0).collect()
}

fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

#[test]
fn index_back_zero_equals_uncompressed() {
    let x = Batch::line(values(2 * 2 * 13, 0.0), 2, 2, 13).unwrap();
    let w = Batch::line(values(3 * 2 * 4, 1.0), 3, 2, 4).unwrap();
    let bias = [0.0, 1.0, -1.0];

    let plain = FftConv::new(ConvConfig::default().with_padding(1)).unwrap();
    let full = FftConv::new(ConvConfig::default().with_padding(1).with_index_back(0)).unwrap();
    assert_eq!(full.mode(), CompressionMode::IndexBack(0));

    let (a, cache_a) = plain.forward_batch(&x, &w, &bias).unwrap();
    let (b, cache_b) = full.forward_batch(&x, &w, &bias).unwrap();
    assert!(max_abs_diff(&a.data, &b.data) < 1e-9);

    let dout = Batch::from_vec(values(a.data.len(), 2.0), a.n, a.channels, a.plane, a.rank).unwrap();
    let ga = plain.backward_batch(&dout, cache_a).unwrap();
    let gb = full.backward_batch(&dout, cache_b).unwrap();
    assert!(max_abs_diff(&ga.dx.data, &gb.dx.data) < 1e-9);
    assert!(max_abs_diff(&ga.dw.data, &gb.dw.data) < 1e-9);
}

#[test]
fn energy_rate_attenuates_but_keeps_shape() {
    // A slow cosine plus a small alternating component that a 50% energy
    // cut removes.
    let signal: Vec<f64> = values(32, 0.0)
        .iter()
        .enumerate()
        .map(|(i, v)| v + if i % 2 == 0 { 0.5 } else { -0.5 })
        .collect();
    let x = Batch::line(signal, 1, 1, 32).unwrap();
    let w = Batch::line(vec![1.0; 5], 1, 1, 5).unwrap();
    let cfg = ConvConfig::default();
    let reference = direct::conv_forward(&x, &w, &[0.0], &cfg).unwrap();

    let lossy = FftConv::new(cfg.with_preserve_energy(50.0)).unwrap();
    let (out, cache) = lossy.forward_batch(&x, &w, &[0.0]).unwrap();
    assert_eq!(out.dims(), reference.dims());
    assert!(out.data.iter().all(|v| v.is_finite()));
    assert!(max_abs_diff(&out.data, &reference.data) > 1e-6);

    let dout = Batch::line(vec![1.0; out.data.len()], 1, 1, out.data.len()).unwrap();
    let grads = lossy.backward_batch(&dout, cache).unwrap();
    assert_eq!(grads.dx.dims(), vec![1, 1, 32]);
    assert_eq!(grads.dw.dims(), vec![1, 1, 5]);
}

#[test]
fn compress_rate_on_grid() {
    let x = Batch::grid(values(2 * 9 * 9, 0.3), 1, 2, 9, 9).unwrap();
    let w = Batch::grid(values(2 * 2 * 3 * 3, 0.9), 2, 2, 3, 3).unwrap();
    let conv = FftConv::new(ConvConfig::default().with_padding(1).with_compress_rate(25.0)).unwrap();
    let (out, cache) = conv.forward_batch(&x, &w, &[0.0, 0.0]).unwrap();
    assert_eq!(out.dims(), vec![1, 2, 9, 9]);

    let grads = conv.backward_batch(&out, cache).unwrap();
    assert_eq!(grads.dx.dims(), vec![1, 2, 9, 9]);
    assert!(grads.dx.data.iter().all(|v| v.is_finite()));
}

#[test]
fn out_size_overrides_output_length() {
    let x = Batch::line(values(2 * 16, 0.0), 1, 2, 16).unwrap();
    let w = Batch::line(values(3 * 2 * 3, 0.0), 3, 2, 3).unwrap();
    for size in [4, 8, 14, 20] {
        let conv = FftConv::new(ConvConfig::default().with_out_size(size)).unwrap();
        let (out, cache) = conv.forward_batch(&x, &w, &[0.0; 3]).unwrap();
        assert_eq!(out.dims(), vec![1, 3, size], "out_size {}", size);

        let grads = conv.backward_batch(&out, cache).unwrap();
        assert_eq!(grads.dx.dims(), vec![1, 2, 16]);
        assert_eq!(grads.dw.dims(), vec![3, 2, 3]);
        assert_eq!(grads.db.len(), 3);
    }

    let gx = Batch::grid(values(12 * 10, 0.0), 1, 1, 12, 10).unwrap();
    let gw = Batch::grid(values(9, 0.0), 1, 1, 3, 3).unwrap();
    let conv = FftConv::new(ConvConfig::default().with_padding(1).with_out_size(5)).unwrap();
    let (out, cache) = conv.forward_batch(&gx, &gw, &[0.0]).unwrap();
    assert_eq!(out.dims(), vec![1, 1, 5, 5]);
    let grads = conv.backward_batch(&out, cache).unwrap();
    assert_eq!(grads.dx.dims(), vec![1, 1, 12, 10]);
}

#[test]
fn out_size_input_gradient_places_dout_asymmetrically() {
    let x = Batch::line(values(16, 0.0), 1, 1, 16).unwrap();
    let kernel = vec![0.5, -1.0, 2.0];
    let w = Batch::line(kernel.clone(), 1, 1, 3).unwrap();
    let flipped: Vec<f64> = kernel.iter().rev().copied().collect();

    // 4 pads dout as 2 before / 12 after; 20 pads 2 before and crops 4 after.
    for (size, after) in [(4usize, 12isize), (20, -4)] {
        let conv = FftConv::new(ConvConfig::default().with_out_size(size)).unwrap();
        let (out, cache) = conv.forward_batch(&x, &w, &[0.0]).unwrap();
        let geometry = *cache.geometry();
        let (_, cols) = geometry.grad_padding();
        assert_eq!((cols.before, cols.after), (2, after), "out_size {}", size);

        let dout = Batch::line(values(size, 3.0), 1, 1, size).unwrap();
        let grads = conv.backward_batch(&dout, cache).unwrap();
        assert_eq!(out.plane.cols, size);

        let placed = pad_planes(&dout, (0, cols.before), (0, cols.after)).unwrap();
        assert_eq!(placed.plane.cols, 18);
        let expected = correlate(
            placed.plane(0, 0),
            &flipped,
            geometry.input_grad_fft().cols,
            16,
            IndexRule::Fixed(size / 2 + 1),
        )
        .unwrap();
        assert!(
            max_abs_diff(&grads.dx.data, &expected) < 1e-9,
            "out_size {}: {:?} vs {:?}",
            size,
            grads.dx.data,
            expected
        );
        assert!(grads.dx.data.iter().any(|v| v.abs() > 1e-6));
    }
}

#[test]
fn conflicting_modes_are_rejected_up_front() {
    let cfg = ConvConfig::default()
        .with_compress_rate(10.0)
        .with_out_size(4);
    let err = FftConv::new(cfg).unwrap_err();
    assert!(matches!(err, SpectralError::InvalidConfig(_)));
    assert!(err.is_caller_error());
}

#[test]
fn oversized_index_back_is_reported() {
    let x = Batch::line(values(8, 0.0), 1, 1, 8).unwrap();
    let w = Batch::line(vec![1.0, 1.0], 1, 1, 2).unwrap();
    let conv = FftConv::new(ConvConfig::default().with_index_back(100)).unwrap();
    let err = conv.forward_batch(&x, &w, &[0.0]).unwrap_err();
    assert!(matches!(err, SpectralError::NumericDegeneracy(_)));
}

#[test]
fn channel_mismatch_is_reported() {
    let x = Batch::line(values(2 * 8, 0.0), 1, 2, 8).unwrap();
    let w = Batch::line(values(3 * 2, 0.0), 1, 3, 2).unwrap();
    let conv = FftConv::new(ConvConfig::default()).unwrap();
    let err = conv.forward_batch(&x, &w, &[0.0]).unwrap_err();
    assert!(matches!(
        err,
        SpectralError::ChannelMismatch {
            input: 2,
            filter: 3
        }
    ));
}

proptest! {
    /// Property: output length is W + 2p - K + 1 for every compression mode.
    #[test]
    fn output_length_follows_conv_arithmetic(
        width in 4usize..24,
        kernel in 1usize..5,
        pad in 0usize..4,
        energy in 10.0f64..=100.0,
    ) {
        let x = Batch::line(values(width, 0.0), 1, 1, width).unwrap();
        let w = Batch::line(values(kernel, 1.0), 1, 1, kernel).unwrap();
        let conv = FftConv::new(
            ConvConfig::default().with_padding(pad).with_preserve_energy(energy),
        )
        .unwrap();
        let (out, cache) = conv.forward_batch(&x, &w, &[0.0]).unwrap();
        prop_assert_eq!(out.plane.cols, width + 2 * pad - kernel + 1);

        let grads = conv.backward_batch(&out, cache).unwrap();
        prop_assert_eq!(grads.dx.plane.cols, width);
        prop_assert_eq!(grads.dw.plane.cols, kernel);
    }

    /// Property: uncompressed spectral gradients equal the direct ones.
    #[test]
    fn uncompressed_gradients_match_direct(
        width in 3usize..16,
        kernel in 1usize..4,
        pad in 0usize..5,
        seed in 0.0f64..10.0,
    ) {
        prop_assume!(kernel <= width);
        let cfg = ConvConfig::default().with_padding(pad);
        let x = Batch::line(values(2 * width, seed), 1, 2, width).unwrap();
        let w = Batch::line(values(2 * kernel, seed + 1.0), 1, 2, kernel).unwrap();

        let conv = FftConv::new(cfg.clone()).unwrap();
        let (out, cache) = conv.forward_batch(&x, &w, &[0.3]).unwrap();
        let dout = Batch::from_vec(values(out.data.len(), seed + 2.0), 1, 1, out.plane, out.rank).unwrap();
        let grads = conv.backward_batch(&dout, cache).unwrap();
        let expected = direct::conv_backward(&dout, &x, &w, &cfg).unwrap();

        prop_assert!(max_abs_diff(&grads.dx.data, &expected.dx.data) < 1e-6);
        prop_assert!(max_abs_diff(&grads.dw.data, &expected.dw.data) < 1e-6);
        prop_assert!((grads.db[0] - expected.db[0]).abs() < 1e-6);
    }
}
