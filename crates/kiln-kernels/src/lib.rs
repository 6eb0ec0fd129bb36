//! # kiln-kernels
//!
//! Allocation-free CPU kernels over caller-owned buffers.
//!
//! Provides:
//! - Runtime SIMD capability detection (AVX2, AVX-512, FMA, NEON)
//! - ReLU and GELU (in place), numerically stable softmax
//! - Dense f32 matmul with a tiled AVX2/FMA path
//! - Symmetric int8 quantization and int8 → int32 matmul
//! - A typed [`KernelLibrary`] interface, served in-process ([`NativeKernels`])
//!   or from a compiled `kiln-ffi` shared library ([`DynamicKernels`])
//!
//! Every kernel takes a [`Strategy`] selecting the scalar or the vectorized
//! implementation. Both produce the same results (exactly for ReLU,
//! quantization and int8 matmul; within float tolerance elsewhere).

pub mod simd;
pub mod strategy;
pub mod error;
pub mod activation;
pub mod softmax;
pub mod matmul;
pub mod quantize;
pub mod matmul_int8;
pub mod provider;
pub mod dylib;

pub use simd::SimdCapability;
pub use strategy::Strategy;
pub use error::{KernelError, Result};
pub use quantize::{QuantScale, QuantizedTensor, QMAX};
pub use matmul_int8::MAX_INT8_REDUCTION;
pub use provider::{KernelLibrary, NativeKernels};
pub use dylib::{DynamicKernels, LoadError};

/// Version of the `kiln_*` C ABI. Bumped on any signature change.
pub const ABI_VERSION: u32 = 1;

/// Lane count of the vectorized kernels (one 256-bit register of f32/i32).
pub const LANES: usize = 8;
