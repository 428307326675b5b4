//! I2_S ternary weight packing (spec §3, §4.1).
//!
//! A block holds `QK_I2_S` (128) ternary weights in {-1, 0, +1}, packed two
//! bits per weight (32 bytes) followed by a little-endian `f32` scale (4
//! bytes) — 36 bytes per block. Weight `j` lives in byte `j % 32`, in the
//! 2-bit field at `6 - 2*(j / 32) .. 7 - 2*(j / 32)`. The raw 2-bit code
//! `v in {0,1,2}` denotes ternary weight `v - 1`.
//!
//! Layout must be bit-exact across every HAL backend (spec §3 invariant).

pub const QK_I2_S: usize = 128;
pub const I2_S_PACKED_BYTES: usize = QK_I2_S / 4; // 32
pub const I2_S_BLOCK_BYTES: usize = I2_S_PACKED_BYTES + 4; // 36

/// Number of blocks needed to hold `n` weights.
pub fn n_blocks(n: usize) -> usize {
    n.div_ceil(QK_I2_S)
}

/// Row stride in bytes for `n` weights, per spec §3.
pub fn row_stride(n: usize) -> usize {
    n_blocks(n) * I2_S_BLOCK_BYTES
}

/// Pack `QK_I2_S` raw 2-bit codes (`v in {0,1,2}`) plus a scale into one block.
///
/// `codes.len()` must be exactly `QK_I2_S`; panics otherwise (programmer
/// error — this is an internal packing primitive, not an API boundary).
pub fn pack_block(codes: &[u8; QK_I2_S], scale: f32) -> [u8; I2_S_BLOCK_BYTES] {
    let mut out = [0u8; I2_S_BLOCK_BYTES];
    for (j, &v) in codes.iter().enumerate() {
        debug_assert!(v <= 2, "raw I2_S code out of range: {v}");
        let byte_idx = j % I2_S_PACKED_BYTES;
        let group = j / I2_S_PACKED_BYTES; // 0..=3
        let shift = 6 - 2 * group;
        out[byte_idx] |= (v & 0b11) << shift;
    }
    out[I2_S_PACKED_BYTES..].copy_from_slice(&scale.to_le_bytes());
    out
}

/// Unpack one block into its 128 raw 2-bit codes and scale.
pub fn unpack_block(block: &[u8; I2_S_BLOCK_BYTES]) -> ([u8; QK_I2_S], f32) {
    let mut codes = [0u8; QK_I2_S];
    for j in 0..QK_I2_S {
        let byte_idx = j % I2_S_PACKED_BYTES;
        let group = j / I2_S_PACKED_BYTES;
        let shift = 6 - 2 * group;
        codes[j] = (block[byte_idx] >> shift) & 0b11;
    }
    let scale = f32::from_le_bytes(block[I2_S_PACKED_BYTES..].try_into().unwrap());
    (codes, scale)
}

/// Convert a raw 2-bit code to its ternary weight.
#[inline]
pub fn code_to_ternary(v: u8) -> i8 {
    v as i8 - 1
}

/// Convert a ternary weight in {-1,0,1} to its raw 2-bit code.
#[inline]
pub fn ternary_to_code(w: i8) -> u8 {
    (w + 1) as u8
}

/// Quantize a row of `n` f32 weights (`n` a multiple of `QK_I2_S`) to packed
/// I2_S blocks, per spec §4.1: `scale = max|w|`; a weight quantizes to 0 if
/// `|w| < 1e-6`, else to +1 if positive, else -1.
pub fn quantize_row(weights: &[f32]) -> Vec<u8> {
    assert!(
        weights.len() % QK_I2_S == 0,
        "quantize_row requires a length that is a multiple of QK_I2_S"
    );
    let mut out = Vec::with_capacity(row_stride(weights.len()));
    for block_weights in weights.chunks_exact(QK_I2_S) {
        let scale = block_weights.iter().fold(0.0f32, |acc, w| acc.max(w.abs()));
        let mut codes = [0u8; QK_I2_S];
        for (c, &w) in codes.iter_mut().zip(block_weights) {
            *c = if w.abs() < 1e-6 {
                ternary_to_code(0)
            } else if w > 0.0 {
                ternary_to_code(1)
            } else {
                ternary_to_code(-1)
            };
        }
        out.extend_from_slice(&pack_block(&codes, scale));
    }
    out
}

/// Dequantize packed I2_S blocks back to f32 weights.
pub fn dequantize_row(packed: &[u8], n: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(n);
    for block in packed.chunks_exact(I2_S_BLOCK_BYTES) {
        let block: [u8; I2_S_BLOCK_BYTES] = block.try_into().unwrap();
        let (codes, scale) = unpack_block(&block);
        for &c in &codes {
            if out.len() == n {
                break;
            }
            out.push(code_to_ternary(c) as f32 * scale);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_roundtrip_all_codes() {
        let mut codes = [0u8; QK_I2_S];
        for (j, c) in codes.iter_mut().enumerate() {
            *c = (j % 3) as u8;
        }
        let block = pack_block(&codes, 0.5);
        let (unpacked, scale) = unpack_block(&block);
        assert_eq!(unpacked, codes);
        assert_eq!(scale, 0.5);
    }

    #[test]
    fn pack_is_idempotent_over_repack() {
        let codes = [2u8; QK_I2_S];
        let block = pack_block(&codes, 1.0);
        let (unpacked, _) = unpack_block(&block);
        let repacked = pack_block(&unpacked, 1.0);
        assert_eq!(block, repacked);
    }

    #[test]
    fn quantize_dequantize_is_a_fixed_point() {
        // Already-ternary input should map to itself on a second round-trip.
        let weights: Vec<f32> = (0..QK_I2_S)
            .map(|j| match j % 3 {
                0 => -1.0,
                1 => 0.0,
                _ => 1.0,
            })
            .collect();
        let packed = quantize_row(&weights);
        let dequantized = dequantize_row(&packed, weights.len());
        let repacked = quantize_row(&dequantized);
        assert_eq!(packed, repacked);
    }

    #[test]
    fn row_stride_matches_spec_formula() {
        assert_eq!(row_stride(128), 36);
        assert_eq!(row_stride(129), 72);
        assert_eq!(row_stride(256), 72);
    }
}
