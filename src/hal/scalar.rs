//! Scalar reference kernels for I2_S x int8 ops (spec §4.1).
//!
//! This is the correctness oracle: every other backend's `vec_dot_i2_i8`
//! must match this one bit-for-bit for any `n` divisible by `QK_I2_S`.

use super::quant::{code_to_ternary, quantize_row, unpack_block, I2_S_BLOCK_BYTES, QK_I2_S};
use crate::error::{NeuronError, Result};

/// Dot product of `nrc` packed I2_S rows (each `n` weights) against a shared
/// int8 activation vector `y` (length `n`), accumulating in int32 using the
/// *raw* 2-bit code (unsigned, {0,1,2}) — ternary conversion is deferred to
/// the caller, per spec §4.1.
pub fn vec_dot_i2_i8(n: usize, nrc: usize, x: &[u8], y: &[i8], out: &mut [i32]) -> Result<()> {
    require_n_divisible(n)?;
    let row_stride = super::quant::row_stride(n);
    if x.len() < row_stride * nrc {
        return Err(NeuronError::InvalidArgument(format!(
            "x too short: need {} bytes for {nrc} rows of {n}, got {}",
            row_stride * nrc,
            x.len()
        )));
    }
    if y.len() < n {
        return Err(NeuronError::InvalidArgument(format!(
            "y too short: need {n}, got {}",
            y.len()
        )));
    }
    if out.len() < nrc {
        return Err(NeuronError::InvalidArgument(format!(
            "out too short: need {nrc}, got {}",
            out.len()
        )));
    }

    for r in 0..nrc {
        let row = &x[r * row_stride..(r + 1) * row_stride];
        let mut acc: i32 = 0;
        let mut j = 0usize;
        for block in row.chunks_exact(I2_S_BLOCK_BYTES) {
            let block: [u8; I2_S_BLOCK_BYTES] = block.try_into().unwrap();
            let (codes, _scale) = unpack_block(&block);
            for &code in &codes {
                if j >= n {
                    break;
                }
                acc += code as i32 * y[j] as i32;
                j += 1;
            }
        }
        out[r] = acc;
    }
    Ok(())
}

/// Pack a row of f32 weights into I2_S blocks (spec §4.1 quantization rule).
pub fn quantize_i2(weights: &[f32]) -> Result<Vec<u8>> {
    if weights.len() % QK_I2_S != 0 {
        return Err(NeuronError::InvalidArgument(format!(
            "weight count {} is not a multiple of QK_I2_S ({QK_I2_S})",
            weights.len()
        )));
    }
    Ok(quantize_row(weights))
}

/// Matrix-vector product: `nrows` packed I2_S rows of `n` weights each times
/// an int8 vector `x`, with per-block ternary conversion and scale applied.
pub fn gemv_i2_i8(n: usize, nrows: usize, weights: &[u8], x: &[i8], out: &mut [f32]) -> Result<()> {
    require_n_divisible(n)?;
    let row_stride = super::quant::row_stride(n);
    if weights.len() < row_stride * nrows {
        return Err(NeuronError::InvalidArgument("weights buffer too short".into()));
    }
    if x.len() < n {
        return Err(NeuronError::InvalidArgument("x buffer too short".into()));
    }
    if out.len() < nrows {
        return Err(NeuronError::InvalidArgument("out buffer too short".into()));
    }

    for r in 0..nrows {
        let row = &weights[r * row_stride..(r + 1) * row_stride];
        let mut acc = 0.0f32;
        let mut j = 0usize;
        for block in row.chunks_exact(I2_S_BLOCK_BYTES) {
            let block: [u8; I2_S_BLOCK_BYTES] = block.try_into().unwrap();
            let (codes, scale) = unpack_block(&block);
            let mut block_acc: i32 = 0;
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

/// Matrix-matrix product: `nrows` packed I2_S rows of `n` weights each times
/// `ncols` int8 column vectors (each length `n`, laid out contiguously in
/// `xs`), writing `out[r * ncols + c]` row-major.
pub fn gemm_i2_i8(
    n: usize,
    nrows: usize,
    ncols: usize,
    weights: &[u8],
    xs: &[i8],
    out: &mut [f32],
) -> Result<()> {
    if xs.len() < n * ncols {
        return Err(NeuronError::InvalidArgument("xs buffer too short".into()));
    }
    if out.len() < nrows * ncols {
        return Err(NeuronError::InvalidArgument("out buffer too short".into()));
    }
    let mut col_out = vec![0.0f32; nrows];
    for c in 0..ncols {
        let x = &xs[c * n..(c + 1) * n];
        gemv_i2_i8(n, nrows, weights, x, &mut col_out)?;
        for r in 0..nrows {
            out[r * ncols + c] = col_out[r];
        }
    }
    Ok(())
}

fn require_n_divisible(n: usize) -> Result<()> {
    if n % QK_I2_S != 0 {
        return Err(NeuronError::InvalidArgument(format!(
            "n={n} must be a multiple of QK_I2_S ({QK_I2_S})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row(n: usize, seed: i32) -> Vec<f32> {
        (0..n)
            .map(|i| (((i as i32 * 7 + seed) % 5) - 2) as f32)
            .collect()
    }

    #[test]
    fn vec_dot_matches_manual_reference() {
        let n = 256;
        let weights = sample_row(n, 3);
        let packed = quantize_i2(&weights).unwrap();
        let y: Vec<i8> = (0..n).map(|i| (i % 7) as i8 - 3).collect();
        let mut out = [0i32; 1];
        vec_dot_i2_i8(n, 1, &packed, &y, &mut out).unwrap();

        // Manual reference using raw codes directly.
        let mut expected = 0i32;
        for block in packed.chunks_exact(I2_S_BLOCK_BYTES) {
            let block: [u8; I2_S_BLOCK_BYTES] = block.try_into().unwrap();
            let (codes, _) = unpack_block(&block);
            for (j, &code) in codes.iter().enumerate() {
                expected += code as i32 * y[j] as i32;
            }
        }
        assert_eq!(out[0], expected);
    }

    #[test]
    fn gemv_applies_scale_and_ternary_conversion() {
        let n = 128;
        let mut weights = vec![0.0f32; n];
        weights[0] = 2.0; // +1 * scale(2.0)
        weights[1] = -2.0; // -1 * scale(2.0)
        let packed = quantize_i2(&weights).unwrap();
        let mut x = vec![0i8; n];
        x[0] = 5;
        x[1] = 5;
        let mut out = [0.0f32; 1];
        gemv_i2_i8(n, 1, &packed, &x, &mut out).unwrap();
        // (+1*5 + -1*5) * scale(2.0) = 0.0
        assert_eq!(out[0], 0.0);
    }

    #[test]
    fn rejects_n_not_divisible_by_block_size() {
        let err = vec_dot_i2_i8(100, 1, &[], &[], &mut []).unwrap_err();
        assert!(matches!(err, NeuronError::InvalidArgument(_)));
    }
}
