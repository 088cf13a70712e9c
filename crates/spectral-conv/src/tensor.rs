//! Bridge between candle tensors and row-major f64 planes.
//!
//! All convolution arithmetic runs on [`Batch`], a `[N, C, *spatial]` buffer
//! in f64. Tensors of rank 3 are 1D (`[N, C, W]`), rank 4 are 2D
//! (`[N, C, H, W]`).

use candle_core::{DType, Device, Tensor};
use spectral_core::{Result, SpectralError};
use spectral_fft::Extent;

/// Number of spatial axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialRank {
    One,
    Two,
}

impl SpatialRank {
    fn from_dims(dims: &[usize]) -> Result<Self> {
        match dims.len() {
            3 => Ok(SpatialRank::One),
            4 => Ok(SpatialRank::Two),
            _ => Err(SpectralError::InvalidConfig(format!(
                "expected a [N, C, W] or [N, C, H, W] tensor, got shape {:?}",
                dims
            ))),
        }
    }
}

/// Row-major `[N, C, *spatial]` f64 buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub n: usize,
    pub channels: usize,
    pub plane: Extent,
    pub rank: SpatialRank,
    pub data: Vec<f64>,
}

impl Batch {
    pub fn zeros(n: usize, channels: usize, plane: Extent, rank: SpatialRank) -> Self {
        Self {
            n,
            channels,
            plane,
            rank,
            data: vec![0.0; n * channels * plane.len()],
        }
    }

    /// Wrap an existing buffer, checking its length.
    pub fn from_vec(
        data: Vec<f64>,
        n: usize,
        channels: usize,
        plane: Extent,
        rank: SpatialRank,
    ) -> Result<Self> {
        let batch = Self {
            n,
            channels,
            plane,
            rank,
            data,
        };
        let expected = n * channels * plane.len();
        if batch.data.len() != expected {
            return Err(SpectralError::shape(&batch.dims(), &[batch.data.len()]));
        }
        if rank == SpatialRank::One && plane.rows != 1 {
            return Err(SpectralError::InvalidConfig(
                "a 1D batch must have single-row planes".into(),
            ));
        }
        Ok(batch)
    }

    /// 1D batch `[n, channels, width]`.
    pub fn line(data: Vec<f64>, n: usize, channels: usize, width: usize) -> Result<Self> {
        Self::from_vec(data, n, channels, Extent::line(width), SpatialRank::One)
    }

    /// 2D batch `[n, channels, height, width]`.
    pub fn grid(
        data: Vec<f64>,
        n: usize,
        channels: usize,
        height: usize,
        width: usize,
    ) -> Result<Self> {
        Self::from_vec(
            data,
            n,
            channels,
            Extent::new(height, width),
            SpatialRank::Two,
        )
    }

    pub fn from_tensor(tensor: &Tensor) -> Result<Self> {
        let dims = tensor.dims().to_vec();
        let rank = SpatialRank::from_dims(&dims)?;
        let plane = match rank {
            SpatialRank::One => Extent::line(dims[2]),
            SpatialRank::Two => Extent::new(dims[2], dims[3]),
        };
        let data = tensor
            .to_dtype(DType::F64)?
            .flatten_all()?
            .to_vec1::<f64>()?;
        Self::from_vec(data, dims[0], dims[1], plane, rank)
    }

    pub fn to_tensor(&self, dtype: DType, device: &Device) -> Result<Tensor> {
        let tensor = Tensor::from_vec(self.data.clone(), self.dims(), device)?;
        Ok(tensor.to_dtype(dtype)?)
    }

    /// Tensor-style dimensions.
    pub fn dims(&self) -> Vec<usize> {
        match self.rank {
            SpatialRank::One => vec![self.n, self.channels, self.plane.cols],
            SpatialRank::Two => vec![self.n, self.channels, self.plane.rows, self.plane.cols],
        }
    }

    pub fn plane(&self, n: usize, c: usize) -> &[f64] {
        let len = self.plane.len();
        let start = (n * self.channels + c) * len;
        &self.data[start..start + len]
    }

    pub fn plane_mut(&mut self, n: usize, c: usize) -> &mut [f64] {
        let len = self.plane.len();
        let start = (n * self.channels + c) * len;
        &mut self.data[start..start + len]
    }

    /// Assemble a batch from `n * channels` planes in `(n, c)` order.
    pub(crate) fn from_planes(
        planes: Vec<Vec<f64>>,
        n: usize,
        channels: usize,
        plane: Extent,
        rank: SpatialRank,
    ) -> Result<Self> {
        let data: Vec<f64> = planes.into_iter().flatten().collect();
        Self::from_vec(data, n, channels, plane, rank)
    }
}

/// Read a `[C]` bias tensor.
pub fn bias_from_tensor(bias: &Tensor) -> Result<Vec<f64>> {
    if bias.rank() != 1 {
        return Err(SpectralError::InvalidConfig(format!(
            "bias must be a [C] tensor, got shape {:?}",
            bias.dims()
        )));
    }
    Ok(bias.to_dtype(DType::F64)?.to_vec1::<f64>()?)
}

/// Pad (positive) or crop (negative) each side of every plane.
///
/// `before`/`after` are `(rows, cols)` amounts.
pub fn pad_planes(batch: &Batch, before: (isize, isize), after: (isize, isize)) -> Result<Batch> {
    let rows = batch.plane.rows as isize + before.0 + after.0;
    let cols = batch.plane.cols as isize + before.1 + after.1;
    if rows <= 0 || cols <= 0 {
        return Err(SpectralError::InvariantViolation(format!(
            "padding {:?}/{:?} leaves an empty plane from {:?}",
            before,
            after,
            batch.plane.as_tuple()
        )));
    }
    let target = Extent::new(rows as usize, cols as usize);
    let mut out = Batch::zeros(batch.n, batch.channels, target, batch.rank);

    for n in 0..batch.n {
        for c in 0..batch.channels {
            let src = batch.plane(n, c);
            let dst = out.plane_mut(n, c);
            for r in 0..target.rows {
                let sr = r as isize - before.0;
                if sr < 0 || sr >= batch.plane.rows as isize {
                    continue;
                }
                for col in 0..target.cols {
                    let sc = col as isize - before.1;
                    if sc < 0 || sc >= batch.plane.cols as isize {
                        continue;
                    }
                    dst[r * target.cols + col] = src[sr as usize * batch.plane.cols + sc as usize];
                }
            }
        }
    }
    Ok(out)
}

/// Reverse every plane along both axes.
pub fn flip_planes(batch: &Batch) -> Batch {
    let mut out = batch.clone();
    for n in 0..batch.n {
        for c in 0..batch.channels {
            out.plane_mut(n, c).reverse();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_roundtrip() -> Result<()> {
        let device = Device::Cpu;
        let data: Vec<f32> = (0..24).map(|i| i as f32 * 0.5).collect();
        let t = Tensor::from_vec(data, (2, 3, 4), &device)?;

        let batch = Batch::from_tensor(&t)?;
        assert_eq!(batch.rank, SpatialRank::One);
        assert_eq!(batch.plane, Extent::line(4));
        assert_eq!(batch.plane(1, 2), &[10.0, 10.5, 11.0, 11.5]);

        let back = batch.to_tensor(DType::F32, &device)?;
        assert_eq!(back.dims(), &[2, 3, 4]);
        assert_eq!(back.dtype(), DType::F32);
        Ok(())
    }

    #[test]
    fn test_rank_is_checked() {
        let t = Tensor::zeros((2, 3), DType::F32, &Device::Cpu).unwrap();
        assert!(Batch::from_tensor(&t).is_err());
        assert!(Batch::line(vec![0.0; 5], 1, 1, 4).is_err());
    }

    #[test]
    fn test_pad_and_crop() {
        let batch = Batch::line(vec![1.0, 2.0, 3.0], 1, 1, 3).unwrap();
        let padded = pad_planes(&batch, (0, 2), (0, 1)).unwrap();
        assert_eq!(padded.data, vec![0.0, 0.0, 1.0, 2.0, 3.0, 0.0]);

        let cropped = pad_planes(&batch, (0, -1), (0, -1)).unwrap();
        assert_eq!(cropped.data, vec![2.0]);
        assert!(pad_planes(&batch, (0, -2), (0, -1)).is_err());
    }

    #[test]
    fn test_flip_grid() {
        let batch = Batch::grid(vec![1.0, 2.0, 3.0, 4.0], 1, 1, 2, 2).unwrap();
        assert_eq!(flip_planes(&batch).data, vec![4.0, 3.0, 2.0, 1.0]);
    }
}
