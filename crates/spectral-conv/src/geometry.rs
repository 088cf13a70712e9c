//! Shape and transform-size bookkeeping for one convolution call.

use spectral_core::{CompressionMode, ConvConfig, FftSizing, Result, SpectralError};
use spectral_fft::Extent;

use crate::tensor::{Batch, SpatialRank};

/// Per-axis sizes derived from the input, filter and configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvGeometry {
    pub rank: SpatialRank,
    pub batch: usize,
    pub in_channels: usize,
    pub out_channels: usize,
    pub input: Extent,
    pub kernel: Extent,
    /// Symmetric padding per axis.
    pub padding: Extent,
    pub padded: Extent,
    pub out: Extent,
    /// Forward transform size.
    pub fft: Extent,
    pub sizing: FftSizing,
}

/// `dout` placement for the input gradient along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradPadding {
    /// Positive pads, negative crops.
    pub before: isize,
    pub after: isize,
}

impl ConvGeometry {
    /// Validate `x` (`[N, Cin, *]`) against `w` (`[Cout, Cin, *]`) and size the
    /// forward correlation.
    pub fn resolve(
        x: &Batch,
        w: &Batch,
        config: &ConvConfig,
        mode: CompressionMode,
    ) -> Result<Self> {
        if x.rank != w.rank {
            return Err(SpectralError::shape(&x.dims(), &w.dims()));
        }
        if x.channels != w.channels {
            return Err(SpectralError::ChannelMismatch {
                input: x.channels,
                filter: w.channels,
            });
        }

        let padding = match x.rank {
            SpatialRank::One => Extent::new(0, config.padding[1]),
            SpatialRank::Two => Extent::new(config.padding[0], config.padding[1]),
        };
        let out_size = mode.out_size();
        let sizing = config.sizing();

        let rows = axis(
            x.plane.rows,
            w.plane.rows,
            padding.rows,
            out_size.filter(|_| x.rank == SpatialRank::Two),
            sizing,
        )?;
        let cols = axis(x.plane.cols, w.plane.cols, padding.cols, out_size, sizing)?;

        Ok(Self {
            rank: x.rank,
            batch: x.n,
            in_channels: x.channels,
            out_channels: w.n,
            input: x.plane,
            kernel: w.plane,
            padding,
            padded: Extent::new(rows.padded, cols.padded),
            out: Extent::new(rows.out, cols.out),
            fft: Extent::new(rows.fft, cols.fft),
            sizing,
        })
    }

    /// Output tensor dimensions.
    pub fn out_dims(&self) -> Vec<usize> {
        self.dims(self.batch, self.out_channels, self.out)
    }

    pub fn input_dims(&self) -> Vec<usize> {
        self.dims(self.batch, self.in_channels, self.input)
    }

    pub fn kernel_dims(&self) -> Vec<usize> {
        self.dims(self.out_channels, self.in_channels, self.kernel)
    }

    fn dims(&self, n: usize, c: usize, plane: Extent) -> Vec<usize> {
        match self.rank {
            SpatialRank::One => vec![n, c, plane.cols],
            SpatialRank::Two => vec![n, c, plane.rows, plane.cols],
        }
    }

    /// Transform size for the filter gradient: padded input against `dout`.
    pub fn weight_grad_fft(&self) -> Extent {
        Extent::new(
            self.sizing.size_for(self.padded.rows + self.out.rows - 1),
            self.sizing.size_for(self.padded.cols + self.out.cols - 1),
        )
    }

    /// Length of padded `dout` so that correlating it with the flipped
    /// filter yields exactly the input extent.
    pub fn grad_extent(&self) -> Extent {
        Extent::new(
            self.input.rows + self.kernel.rows - 1,
            self.input.cols + self.kernel.cols - 1,
        )
    }

    /// Transform size for the input gradient: padded `dout` against the
    /// flipped filter.
    pub fn input_grad_fft(&self) -> Extent {
        let g = self.grad_extent();
        Extent::new(
            self.sizing.size_for(g.rows + self.kernel.rows - 1),
            self.sizing.size_for(g.cols + self.kernel.cols - 1),
        )
    }

    /// How `dout` is padded or cropped per axis as `(rows, cols)`.
    pub fn grad_padding(&self) -> (GradPadding, GradPadding) {
        (
            grad_axis(self.input.rows, self.kernel.rows, self.padding.rows, self.out.rows),
            grad_axis(self.input.cols, self.kernel.cols, self.padding.cols, self.out.cols),
        )
    }
}

struct AxisSizes {
    padded: usize,
    out: usize,
    fft: usize,
}

fn axis(
    len: usize,
    kernel: usize,
    pad: usize,
    out_size: Option<usize>,
    sizing: FftSizing,
) -> Result<AxisSizes> {
    if len == 0 || kernel == 0 {
        return Err(SpectralError::InvalidConfig(format!(
            "empty axis: input {} kernel {}",
            len, kernel
        )));
    }
    let padded = len + 2 * pad;
    if padded < kernel {
        return Err(SpectralError::InvalidConfig(format!(
            "kernel of size {} exceeds padded input of size {}",
            kernel, padded
        )));
    }
    let (out, fft) = match out_size {
        Some(size) => (size, sizing.size_for(padded + size.max(kernel) - 1)),
        None => (padded - kernel + 1, sizing.size_for(padded + kernel - 1)),
    };
    Ok(AxisSizes { padded, out, fft })
}

fn grad_axis(len: usize, kernel: usize, pad: usize, out: usize) -> GradPadding {
    let before = kernel as isize - 1 - pad as isize;
    let total = (len + kernel - 1) as isize;
    GradPadding {
        before,
        after: total - out as isize - before,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize, c: usize, w: usize) -> Batch {
        Batch::line(vec![0.0; n * c * w], n, c, w).unwrap()
    }

    #[test]
    fn test_standard_output_length() {
        let x = line(2, 3, 10);
        let w = line(4, 3, 3);
        let cfg = ConvConfig::default().with_padding(1);
        let g = ConvGeometry::resolve(&x, &w, &cfg, CompressionMode::None).unwrap();
        assert_eq!(g.out, Extent::line(10));
        assert_eq!(g.padded, Extent::line(12));
        // next_power_of_two(12 + 3 - 1)
        assert_eq!(g.fft, Extent::line(16));
        assert_eq!(g.out_dims(), vec![2, 4, 10]);
    }

    #[test]
    fn test_exact_sizing() {
        let x = line(1, 1, 10);
        let w = line(1, 1, 3);
        let cfg = ConvConfig::default().with_next_power2(false);
        let g = ConvGeometry::resolve(&x, &w, &cfg, CompressionMode::None).unwrap();
        assert_eq!(g.fft, Extent::line(12));
    }

    #[test]
    fn test_out_size_override() {
        let x = Batch::grid(vec![0.0; 64], 1, 1, 8, 8).unwrap();
        let w = Batch::grid(vec![0.0; 9], 1, 1, 3, 3).unwrap();
        let g = ConvGeometry::resolve(
            &x,
            &w,
            &ConvConfig::default(),
            CompressionMode::OutSize(4),
        )
        .unwrap();
        assert_eq!(g.out, Extent::new(4, 4));
        assert_eq!(g.fft, Extent::new(16, 16));

        let lx = line(1, 1, 8);
        let lw = line(1, 1, 3);
        let g = ConvGeometry::resolve(&lx, &lw, &ConvConfig::default(), CompressionMode::OutSize(4))
            .unwrap();
        assert_eq!(g.out, Extent::line(4));
        assert_eq!(g.fft.rows, 1);
    }

    #[test]
    fn test_grad_padding_symmetric_for_standard_out() {
        let x = line(1, 1, 9);
        let w = line(1, 1, 4);
        for pad in 0..6 {
            let cfg = ConvConfig::default().with_padding(pad);
            let g = ConvGeometry::resolve(&x, &w, &cfg, CompressionMode::None).unwrap();
            let (_, cols) = g.grad_padding();
            assert_eq!(cols.before, cols.after, "pad {}", pad);
            assert_eq!(cols.before, 3 - pad as isize);
        }
    }

    #[test]
    fn test_mismatches() {
        let x = line(1, 2, 8);
        let w = line(1, 3, 3);
        let err = ConvGeometry::resolve(&x, &w, &ConvConfig::default(), CompressionMode::None)
            .unwrap_err();
        assert!(matches!(
            err,
            SpectralError::ChannelMismatch {
                input: 2,
                filter: 3
            }
        ));

        let big = line(1, 2, 9);
        assert!(
            ConvGeometry::resolve(&line(1, 2, 4), &big, &ConvConfig::default(), CompressionMode::None)
                .is_err()
        );
    }
}
