//! Typed kernel interface.
//!
//! [`KernelLibrary`] has one method per kernel over safe slices. Arguments are
//! validated (lengths, matrix size, scale, int8 reduction length) before the
//! kernel runs, so the raw kernels' preconditions always hold behind it.
//!
//! Providers are constructed explicitly and passed by reference:
//!
//! ```
//! use kiln_kernels::{KernelLibrary, NativeKernels, Strategy};
//!
//! let kernels = NativeKernels::init();
//! let mut data = [-1.0f32, 0.0, 1.0];
//! kernels.relu(&mut data, Strategy::Vectorized).unwrap();
//! assert_eq!(data, [0.0, 0.0, 1.0]);
//! ```

use crate::error::{KernelError, Result};
use crate::quantize::{QuantScale, QuantizedTensor};
use crate::simd::SimdCapability;
use crate::strategy::Strategy;
use crate::{activation, matmul, matmul_int8, quantize, softmax, MAX_INT8_REDUCTION};

/// One capability per kernel, grouped behind a single interface.
pub trait KernelLibrary {
    /// Short provider description for logs and reports.
    fn name(&self) -> &str;

    /// ReLU in place.
    fn relu(&self, data: &mut [f32], strategy: Strategy) -> Result<()>;

    /// GELU (tanh approximation) in place.
    fn gelu(&self, data: &mut [f32], strategy: Strategy) -> Result<()>;

    /// Stable softmax of `input` into `output`.
    fn softmax(&self, input: &[f32], output: &mut [f32], strategy: Strategy) -> Result<()>;

    /// `c = a @ b` for N×N row-major matrices.
    fn matmul_f32(&self, a: &[f32], b: &[f32], c: &mut [f32], n: usize, strategy: Strategy) -> Result<()>;

    /// Symmetric int8 quantization of `input` into `output`.
    fn quantize(&self, input: &[f32], output: &mut [i8], scale: QuantScale, strategy: Strategy) -> Result<()>;

    /// `c = a @ b` for N×N int8 matrices with int32 accumulation.
    fn matmul_int8(&self, a: &[i8], b: &[i8], c: &mut [i32], n: usize, strategy: Strategy) -> Result<()>;

    /// Quantize into `output` and return it paired with its scale.
    fn quantize_tensor<'a>(
        &self,
        input: &[f32],
        output: &'a mut [i8],
        scale: QuantScale,
        strategy: Strategy,
    ) -> Result<QuantizedTensor<'a>> {
        self.quantize(input, output, scale, strategy)?;
        Ok(QuantizedTensor::new(output, scale))
    }

    /// Int8 matmul of two quantized tensors. Returns the factor
    /// `scale_a * scale_b` that `c` must be divided by to dequantize.
    fn matmul_quantized(
        &self,
        a: &QuantizedTensor<'_>,
        b: &QuantizedTensor<'_>,
        c: &mut [i32],
        n: usize,
        strategy: Strategy,
    ) -> Result<f32> {
        self.matmul_int8(a.data(), b.data(), c, n, strategy)?;
        Ok(a.scale().get() * b.scale().get())
    }
}

pub(crate) fn check_same_len(kernel: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected == got {
        Ok(())
    } else {
        Err(KernelError::LengthMismatch { kernel, expected, got })
    }
}

pub(crate) fn check_square(kernel: &'static str, n: usize, lens: &[usize]) -> Result<()> {
    let expected = n.checked_mul(n);
    for &len in lens {
        if expected != Some(len) {
            return Err(KernelError::NotSquare { kernel, n, len });
        }
    }
    Ok(())
}

pub(crate) fn check_reduction(n: usize) -> Result<()> {
    if n <= MAX_INT8_REDUCTION {
        Ok(())
    } else {
        Err(KernelError::ReductionTooLong { n, max: MAX_INT8_REDUCTION })
    }
}

/// In-process kernels.
///
/// `init` reads the CPU features once; there is nothing to tear down, dropping the
/// value is enough.
#[derive(Debug, Clone, Copy)]
pub struct NativeKernels {
    simd: SimdCapability,
}

impl NativeKernels {
    pub fn init() -> Self {
        let simd = *SimdCapability::detect();
        tracing::info!(
            tier = simd.best_tier(),
            avx2 = simd.avx2,
            fma = simd.fma,
            neon = simd.neon,
            "native kernels initialized"
        );
        NativeKernels { simd }
    }

    /// CPU features seen at `init`.
    pub fn simd(&self) -> &SimdCapability {
        &self.simd
    }
}

impl KernelLibrary for NativeKernels {
    fn name(&self) -> &str {
        "native"
    }

    fn relu(&self, data: &mut [f32], strategy: Strategy) -> Result<()> {
        activation::relu(data, strategy);
        Ok(())
    }

    fn gelu(&self, data: &mut [f32], strategy: Strategy) -> Result<()> {
        activation::gelu(data, strategy);
        Ok(())
    }

    fn softmax(&self, input: &[f32], output: &mut [f32], strategy: Strategy) -> Result<()> {
        check_same_len("softmax", input.len(), output.len())?;
        softmax::softmax(input, output, strategy);
        Ok(())
    }

    fn matmul_f32(&self, a: &[f32], b: &[f32], c: &mut [f32], n: usize, strategy: Strategy) -> Result<()> {
        check_square("matmul_f32", n, &[a.len(), b.len(), c.len()])?;
        matmul::matmul_f32(a, b, c, n, strategy);
        Ok(())
    }

    fn quantize(&self, input: &[f32], output: &mut [i8], scale: QuantScale, strategy: Strategy) -> Result<()> {
        check_same_len("quantize", input.len(), output.len())?;
        quantize::quantize(input, output, scale.get(), strategy);
        Ok(())
    }

    fn matmul_int8(&self, a: &[i8], b: &[i8], c: &mut [i32], n: usize, strategy: Strategy) -> Result<()> {
        check_reduction(n)?;
        check_square("matmul_int8", n, &[a.len(), b.len(), c.len()])?;
        matmul_int8::matmul_int8(a, b, c, n, strategy);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_validation() {
        let k = NativeKernels::init();

        let mut out = [0.0f32; 2];
        assert_eq!(
            k.softmax(&[1.0, 2.0, 3.0], &mut out, Strategy::Scalar),
            Err(KernelError::LengthMismatch { kernel: "softmax", expected: 3, got: 2 })
        );

        let mut c = [0.0f32; 4];
        assert_eq!(
            k.matmul_f32(&[1.0; 4], &[1.0; 3], &mut c, 2, Strategy::Vectorized),
            Err(KernelError::NotSquare { kernel: "matmul_f32", n: 2, len: 3 })
        );

        let mut q = [0i8; 1];
        let scale = QuantScale::new(1.0).unwrap();
        assert!(matches!(
            k.quantize(&[1.0, 2.0], &mut q, scale, Strategy::Scalar),
            Err(KernelError::LengthMismatch { kernel: "quantize", .. })
        ));

        let mut ci = [0i32; 0];
        let n = MAX_INT8_REDUCTION + 1;
        assert_eq!(
            k.matmul_int8(&[], &[], &mut ci, n, Strategy::Scalar),
            Err(KernelError::ReductionTooLong { n, max: MAX_INT8_REDUCTION })
        );
    }

    #[test]
    fn test_check_square_overflow() {
        assert!(check_square("m", usize::MAX, &[0]).is_err());
        assert!(check_square("m", 3, &[9, 9, 9]).is_ok());
    }

    #[test]
    fn test_quantized_pipeline() {
        let k = NativeKernels::init();
        let sa = QuantScale::new(127.0).unwrap();
        let sb = QuantScale::new(63.5).unwrap();

        let a = [1.0f32, 0.0, 0.0, 1.0];
        let b = [0.5f32, -0.5, 1.0, 0.25];

        let mut qa = [0i8; 4];
        let mut qb = [0i8; 4];
        let ta = k.quantize_tensor(&a, &mut qa, sa, Strategy::Vectorized).unwrap();
        let tb = k.quantize_tensor(&b, &mut qb, sb, Strategy::Vectorized).unwrap();
        assert_eq!(ta.data(), &[127, 0, 0, 127]);
        assert_eq!(tb.scale(), sb);

        let mut c = [0i32; 4];
        let factor = k.matmul_quantized(&ta, &tb, &mut c, 2, Strategy::Vectorized).unwrap();
        assert_eq!(factor, 127.0 * 63.5);

        for (acc, expected) in c.iter().zip(b.iter()) {
            let approx = *acc as f32 / factor;
            assert!((approx - expected).abs() < 0.01, "{} vs {}", approx, expected);
        }
    }

    #[test]
    fn test_provider_as_trait_object() {
        let native = NativeKernels::init();
        let lib: &dyn KernelLibrary = &native;
        assert_eq!(lib.name(), "native");

        let mut data = [-2.0f32, 3.0];
        lib.relu(&mut data, Strategy::Scalar).unwrap();
        assert_eq!(data, [0.0, 3.0]);
    }
}
