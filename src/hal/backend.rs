//! Backend table and selection (spec §4.1, §9 "global backend table").
//!
//! The table is process-wide and initialized once; see [`select_backend`].
//! Only one backend is active at a time — callers that need to switch must
//! `shutdown` the old one before `init`-ing the next (spec §3 invariant).

use crate::error::Result;
use crate::hardware::FeatureBits;

pub type VecDotFn = unsafe fn(usize, usize, &[u8], &[i8], &mut [i32]) -> Result<()>;
pub type QuantizeFn = unsafe fn(&[f32]) -> Result<Vec<u8>>;
pub type GemvFn = unsafe fn(usize, usize, &[u8], &[i8], &mut [f32]) -> Result<()>;
pub type GemmFn = unsafe fn(usize, usize, usize, &[u8], &[i8], &mut [f32]) -> Result<()>;

#[derive(Debug, Clone, Copy)]
pub struct BlockParams {
    pub row_block: usize,
    pub col_block: usize,
    pub parallel: bool,
    pub qk_i2_s: usize,
}

/// A registered kernel implementation (spec §3 `BackendDescriptor`).
pub struct BackendDescriptor {
    pub name: &'static str,
    /// Higher wins during selection.
    pub priority: u32,
    pub required_features: FeatureBits,
    pub block_params: BlockParams,
    pub vec_dot_i2_i8: VecDotFn,
    pub quantize_i2: QuantizeFn,
    pub gemv_i2_i8: GemvFn,
    pub gemm_i2_i8: GemmFn,
    pub init: Option<fn() -> Result<()>>,
    pub shutdown: Option<fn()>,
}

impl std::fmt::Debug for BackendDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("required_features", &self.required_features)
            .finish()
    }
}

const DEFAULT_BLOCK_PARAMS: BlockParams = BlockParams {
    row_block: 1,
    col_block: crate::hal::quant::QK_I2_S,
    parallel: false,
    qk_i2_s: crate::hal::quant::QK_I2_S,
};

const SCALAR_BACKEND: BackendDescriptor = BackendDescriptor {
    name: "scalar",
    priority: 0,
    required_features: FeatureBits::NONE,
    block_params: DEFAULT_BLOCK_PARAMS,
    vec_dot_i2_i8: crate::hal::scalar::vec_dot_i2_i8,
    quantize_i2: crate::hal::scalar::quantize_i2,
    gemv_i2_i8: crate::hal::scalar::gemv_i2_i8,
    gemm_i2_i8: crate::hal::scalar::gemm_i2_i8,
    init: None,
    shutdown: None,
};

#[cfg(target_arch = "x86_64")]
const AVX2_BACKEND: BackendDescriptor = BackendDescriptor {
    name: "avx2",
    priority: 100,
    required_features: FeatureBits::AVX2,
    block_params: BlockParams {
        row_block: 8,
        parallel: true,
        ..DEFAULT_BLOCK_PARAMS
    },
    vec_dot_i2_i8: crate::hal::simd::avx2::vec_dot_i2_i8,
    quantize_i2: crate::hal::simd::avx2::quantize_i2,
    gemv_i2_i8: crate::hal::simd::avx2::gemv_i2_i8,
    gemm_i2_i8: crate::hal::simd::avx2::gemm_i2_i8,
    init: None,
    shutdown: None,
};

#[cfg(target_arch = "aarch64")]
const NEON_BACKEND: BackendDescriptor = BackendDescriptor {
    name: "neon",
    priority: 100,
    required_features: FeatureBits::NEON,
    block_params: BlockParams {
        row_block: 4,
        parallel: true,
        ..DEFAULT_BLOCK_PARAMS
    },
    vec_dot_i2_i8: crate::hal::simd::neon::vec_dot_i2_i8,
    quantize_i2: crate::hal::simd::neon::quantize_i2,
    gemv_i2_i8: crate::hal::simd::neon::gemv_i2_i8,
    gemm_i2_i8: crate::hal::simd::neon::gemm_i2_i8,
    init: None,
    shutdown: None,
};

/// Backends in descending priority order. The scalar backend is always last
/// and requires no features, guaranteeing `select_backend` terminates.
fn backend_table() -> &'static [BackendDescriptor] {
    #[cfg(target_arch = "x86_64")]
    {
        &[AVX2_BACKEND, SCALAR_BACKEND]
    }
    #[cfg(target_arch = "aarch64")]
    {
        &[NEON_BACKEND, SCALAR_BACKEND]
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        &[SCALAR_BACKEND]
    }
}

/// Select the highest-priority backend whose required features are a subset
/// of `features`, calling its `init` hook. Falls through to the next backend
/// if `init` fails; the scalar backend (no required features) always
/// succeeds, so this never returns an error in practice — it returns `Result`
/// to surface a hypothetical scalar `init` failure as `BackendUnavailable`.
pub fn select_backend(features: FeatureBits) -> Result<&'static BackendDescriptor> {
    for backend in backend_table() {
        if backend.required_features.is_subset_of(features) {
            if let Some(init) = backend.init {
                if init().is_err() {
                    tracing::warn!("backend '{}' failed to init, falling back", backend.name);
                    continue;
                }
            }
            tracing::info!("HAL backend selected: {}", backend.name);
            return Ok(backend);
        }
    }
    Err(crate::error::NeuronError::BackendUnavailable(
        "no backend available, including scalar fallback".into(),
    ))
}

/// Shut down a previously selected backend. Must be called before selecting
/// a different one (spec §3 invariant).
pub fn shutdown_backend(backend: &BackendDescriptor) {
    if let Some(shutdown) = backend.shutdown {
        shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_always_selectable() {
        let backend = select_backend(FeatureBits::NONE).unwrap();
        assert_eq!(backend.name, "scalar");
    }

    #[test]
    fn highest_priority_subset_wins() {
        #[cfg(target_arch = "x86_64")]
        {
            let backend = select_backend(FeatureBits::AVX2).unwrap();
            assert_eq!(backend.name, "avx2");
        }
    }
}
