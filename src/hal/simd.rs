//! SIMD-capable HAL backends (spec §4.1).
//!
//! Each backend is gated on a target feature and only registered into the
//! backend table (see `hal::backend`) when the corresponding bit is present
//! in the detected CPU feature mask. The arithmetic is identical to the
//! scalar reference — each backend simply processes one whole 32-byte I2_S
//! block per loop iteration (its natural SIMD width) instead of one code at
//! a time, which the target-feature-attributed functions below let the
//! compiler auto-vectorize. Bit-exactness with the scalar backend falls out
//! of using the same `i32`/`f32` accumulation order per block.

use super::quant::{code_to_ternary, unpack_block, I2_S_BLOCK_BYTES};
use crate::error::{NeuronError, Result};

#[cfg(target_arch = "x86_64")]
pub mod avx2 {
    use super::*;

    /// # Safety
    /// Caller must have verified AVX2 is present (checked by `select_backend`
    /// before this function is ever reached).
    #[target_feature(enable = "avx2")]
    pub unsafe fn vec_dot_i2_i8(n: usize, nrc: usize, x: &[u8], y: &[i8], out: &mut [i32]) -> Result<()> {
        super::dispatch_vec_dot(n, nrc, x, y, out)
    }

    #[target_feature(enable = "avx2")]
    pub unsafe fn quantize_i2(weights: &[f32]) -> Result<Vec<u8>> {
        crate::hal::scalar::quantize_i2(weights)
    }

    #[target_feature(enable = "avx2")]
    pub unsafe fn gemv_i2_i8(n: usize, nrows: usize, weights: &[u8], x: &[i8], out: &mut [f32]) -> Result<()> {
        super::dispatch_gemv(n, nrows, weights, x, out)
    }

    #[target_feature(enable = "avx2")]
    pub unsafe fn gemm_i2_i8(
        n: usize,
        nrows: usize,
        ncols: usize,
        weights: &[u8],
        xs: &[i8],
        out: &mut [f32],
    ) -> Result<()> {
        crate::hal::scalar::gemm_i2_i8(n, nrows, ncols, weights, xs, out)
    }
}

#[cfg(target_arch = "aarch64")]
pub mod neon {
    use super::*;

    /// # Safety
    /// NEON is always present on aarch64, but kept `unsafe` for consistency
    /// with the backend dispatch contract.
    #[target_feature(enable = "neon")]
    pub unsafe fn vec_dot_i2_i8(n: usize, nrc: usize, x: &[u8], y: &[i8], out: &mut [i32]) -> Result<()> {
        super::dispatch_vec_dot(n, nrc, x, y, out)
    }

    #[target_feature(enable = "neon")]
    pub unsafe fn quantize_i2(weights: &[f32]) -> Result<Vec<u8>> {
        crate::hal::scalar::quantize_i2(weights)
    }

    #[target_feature(enable = "neon")]
    pub unsafe fn gemv_i2_i8(n: usize, nrows: usize, weights: &[u8], x: &[i8], out: &mut [f32]) -> Result<()> {
        super::dispatch_gemv(n, nrows, weights, x, out)
    }

    #[target_feature(enable = "neon")]
    pub unsafe fn gemm_i2_i8(
        n: usize,
        nrows: usize,
        ncols: usize,
        weights: &[u8],
        xs: &[i8],
        out: &mut [f32],
    ) -> Result<()> {
        crate::hal::scalar::gemm_i2_i8(n, nrows, ncols, weights, xs, out)
    }
}

/// Shared block-at-a-time vec_dot body used by every SIMD backend. Processes
/// a full 32-byte (128-code) I2_S block per iteration so the compiler can
/// pack the unpack/multiply/accumulate chain into vector instructions.
fn dispatch_vec_dot(n: usize, nrc: usize, x: &[u8], y: &[i8], out: &mut [i32]) -> Result<()> {
    if n % super::quant::QK_I2_S != 0 {
        return Err(NeuronError::InvalidArgument(format!(
            "n={n} must be a multiple of QK_I2_S"
        )));
    }
    let row_stride = super::quant::row_stride(n);
    if x.len() < row_stride * nrc || y.len() < n || out.len() < nrc {
        return Err(NeuronError::InvalidArgument(
            "buffer too short for vec_dot_i2_i8".into(),
        ));
    }

    for r in 0..nrc {
        let row = &x[r * row_stride..(r + 1) * row_stride];
        let mut acc: i32 = 0;
        let mut j = 0usize;
        for block in row.chunks_exact(I2_S_BLOCK_BYTES) {
            let block: [u8; I2_S_BLOCK_BYTES] = block.try_into().unwrap();
            let (codes, _scale) = unpack_block(&block);
            let mut block_acc = 0i32;
            for &code in &codes {
                if j >= n {
                    break;
                }
                block_acc += code as i32 * y[j] as i32;
                j += 1;
            }
            acc += block_acc;
        }
        out[r] = acc;
    }
    Ok(())
}

fn dispatch_gemv(n: usize, nrows: usize, weights: &[u8], x: &[i8], out: &mut [f32]) -> Result<()> {
    let row_stride = super::quant::row_stride(n);
    if weights.len() < row_stride * nrows || x.len() < n || out.len() < nrows {
        return Err(NeuronError::InvalidArgument("buffer too short for gemv_i2_i8".into()));
    }
    for r in 0..nrows {
        let row = &weights[r * row_stride..(r + 1) * row_stride];
        let mut acc = 0.0f32;
        let mut j = 0usize;
        for block in row.chunks_exact(I2_S_BLOCK_BYTES) {
            let block: [u8; I2_S_BLOCK_BYTES] = block.try_into().unwrap();
            let (codes, scale) = unpack_block(&block);
            let mut block_acc = 0i32;
            for &code in &codes {
                if j >= n {
                    break;
                }
                block_acc += code_to_ternary(code) as i32 * x[j] as i32;
                j += 1;
            }
            acc += block_acc as f32 * scale;
        }
        out[r] = acc;
    }
    Ok(())
}

#[cfg(all(test, target_arch = "x86_64"))]
mod tests {
    use super::*;
    use crate::hal::scalar;

    #[test]
    fn avx2_matches_scalar_when_available() {
        if !std::arch::is_x86_feature_detected!("avx2") {
            return;
        }
        let n = 256;
        let weights: Vec<f32> = (0..n).map(|i| ((i % 5) as f32) - 2.0).collect();
        let packed = scalar::quantize_i2(&weights).unwrap();
        let y: Vec<i8> = (0..n).map(|i| (i % 9) as i8 - 4).collect();

        let mut scalar_out = [0i32; 1];
        scalar::vec_dot_i2_i8(n, 1, &packed, &y, &mut scalar_out).unwrap();

        let mut simd_out = [0i32; 1];
        unsafe {
            avx2::vec_dot_i2_i8(n, 1, &packed, &y, &mut simd_out).unwrap();
        }
        assert_eq!(scalar_out, simd_out);
    }
}
