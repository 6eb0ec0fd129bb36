//! CPU feature detection behind `Strategy::Vectorized`.
//!
//! Each vectorized kernel asks [`SimdCapability::detect`] which body to run:
//! the AVX2 intrinsics (plus FMA for the f32 matmul) on x86_64 CPUs that have
//! them, the portable [`LANES`](crate::LANES)-wide chunk loops everywhere else.
//! Detection runs on first use and is shared by every kernel afterwards.

use std::sync::OnceLock;

/// CPU features relevant to kernel dispatch.
///
/// AVX-512 and NEON are reported for diagnostics only; no kernel body needs
/// more than AVX2 + FMA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimdCapability {
    pub avx2: bool,
    pub avx512f: bool,
    pub neon: bool,
    pub fma: bool,
}

static DETECTED: OnceLock<SimdCapability> = OnceLock::new();

#[cfg(target_arch = "x86_64")]
fn query_cpu() -> SimdCapability {
    SimdCapability {
        avx2: is_x86_feature_detected!("avx2"),
        avx512f: is_x86_feature_detected!("avx512f"),
        fma: is_x86_feature_detected!("fma"),
        neon: false,
    }
}

#[cfg(target_arch = "aarch64")]
fn query_cpu() -> SimdCapability {
    // Advanced SIMD is part of the AArch64 base ISA.
    SimdCapability { neon: true, ..SimdCapability::none() }
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn query_cpu() -> SimdCapability {
    SimdCapability::none()
}

impl SimdCapability {
    /// Features of the running CPU, detected once per process.
    pub fn detect() -> &'static SimdCapability {
        DETECTED.get_or_init(query_cpu)
    }

    /// No features at all; every vectorized kernel takes its portable body.
    pub const fn none() -> Self {
        SimdCapability { avx2: false, avx512f: false, neon: false, fma: false }
    }

    /// Widest instruction set present, for banners and logs.
    pub fn best_tier(&self) -> &'static str {
        match (self.avx512f, self.avx2, self.neon) {
            (true, _, _) => "AVX-512",
            (_, true, _) => "AVX2",
            (_, _, true) => "NEON",
            _ => "scalar",
        }
    }

    /// The tiled f32 matmul uses its fused multiply-add body.
    pub fn has_avx2_fma(&self) -> bool {
        self.avx2 && self.fma
    }

    /// Which body `Strategy::Vectorized` runs on this CPU.
    pub fn vectorized_path(&self) -> &'static str {
        if self.has_avx2_fma() {
            "AVX2 + FMA intrinsics"
        } else if self.avx2 {
            "AVX2 intrinsics, portable matmul"
        } else {
            "portable 8-lane chunks"
        }
    }
}
