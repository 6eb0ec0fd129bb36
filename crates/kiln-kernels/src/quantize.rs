//! Symmetric int8 quantization with a caller-chosen scale.
//!
//! `q = clamp(round(x * scale), -127, 127)`
//!
//! Rounding is to nearest with ties away from zero (`f32::round`) under every
//! strategy. The range is symmetric: -128 is never produced. Out-of-range
//! values saturate silently; `NaN` maps to 0.
//!
//! The scale is not stored in the output buffer. Callers keep it next to the
//! buffer ([`QuantizedTensor`]) and hand it to whatever dequantizes results.

use crate::error::{KernelError, Result};
use crate::strategy::Strategy;
use crate::LANES;

/// Largest magnitude of a quantized value.
pub const QMAX: i8 = 127;

const QMAX_F: f32 = QMAX as f32;

/// A positive, finite quantization scale.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct QuantScale(f32);

impl QuantScale {
    pub fn new(scale: f32) -> Result<Self> {
        if scale.is_finite() && scale > 0.0 {
            Ok(QuantScale(scale))
        } else {
            Err(KernelError::InvalidScale(scale))
        }
    }

    pub fn get(self) -> f32 {
        self.0
    }

    /// Width of one quantization step in the float domain.
    pub fn step(self) -> f32 {
        1.0 / self.0
    }

    /// Float value represented by `q`.
    pub fn dequantize(self, q: i8) -> f32 {
        q as f32 / self.0
    }

    /// Float value of an int8 × int8 accumulator whose operands were
    /// quantized with `self` and `other`.
    pub fn dequantize_product(self, other: QuantScale, acc: i32) -> f32 {
        (acc as f64 / (self.0 as f64 * other.0 as f64)) as f32
    }
}

/// An int8 buffer together with the scale that produced it.
#[derive(Debug, Clone, Copy)]
pub struct QuantizedTensor<'a> {
    data: &'a [i8],
    scale: QuantScale,
}

impl<'a> QuantizedTensor<'a> {
    pub fn new(data: &'a [i8], scale: QuantScale) -> Self {
        QuantizedTensor { data, scale }
    }

    pub fn data(&self) -> &'a [i8] {
        self.data
    }

    pub fn scale(&self) -> QuantScale {
        self.scale
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Writes the approximate float values into `out` (same length).
    pub fn dequantize_into(&self, out: &mut [f32]) {
        debug_assert_eq!(self.data.len(), out.len());
        for (o, &q) in out.iter_mut().zip(self.data) {
            *o = self.scale.dequantize(q);
        }
    }
}

/// Quantize `input` into `output` (same length) with `scale > 0`.
pub fn quantize(input: &[f32], output: &mut [i8], scale: f32, strategy: Strategy) {
    debug_assert_eq!(input.len(), output.len(), "quantize: length mismatch");
    debug_assert!(scale > 0.0, "quantize: scale must be > 0");
    let output = &mut output[..input.len()];

    match strategy {
        Strategy::Scalar => quantize_scalar(input, output, scale),
        Strategy::Vectorized => quantize_vectorized(input, output, scale),
    }
}

#[inline]
fn quantize_one(x: f32, scale: f32) -> i8 {
    // `as` maps NaN to 0; clamp keeps everything else inside [-127, 127].
    (x * scale).round().clamp(-QMAX_F, QMAX_F) as i8
}

fn quantize_scalar(input: &[f32], output: &mut [i8], scale: f32) {
    for (o, &x) in output.iter_mut().zip(input) {
        *o = quantize_one(x, scale);
    }
}

fn quantize_vectorized(input: &[f32], output: &mut [i8], scale: f32) {
    #[cfg(target_arch = "x86_64")]
    {
        if crate::simd::SimdCapability::detect().avx2 {
            // Safety: AVX2 support checked above
            unsafe { quantize_avx2(input, output, scale) };
            return;
        }
    }

    quantize_lanes(input, output, scale);
}

fn quantize_lanes(input: &[f32], output: &mut [i8], scale: f32) {
    let mut in_chunks = input.chunks_exact(LANES);
    let mut out_chunks = output.chunks_exact_mut(LANES);
    for (xs, qs) in (&mut in_chunks).zip(&mut out_chunks) {
        for (q, &x) in qs.iter_mut().zip(xs) {
            *q = quantize_one(x, scale);
        }
    }
    quantize_scalar(in_chunks.remainder(), out_chunks.into_remainder(), scale);
}

/// AVX2 quantization, 8 values per step.
///
/// Ties-away rounding is built from truncation: `t = trunc(v)`, then step one
/// unit away from zero when `|v - t| >= 0.5` (the subtraction is exact). NaN
/// lanes are masked to 0 before the clamp so they match `quantize_one`.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn quantize_avx2(input: &[f32], output: &mut [i8], scale: f32) {
    use std::arch::x86_64::*;

    let vscale = _mm256_set1_ps(scale);
    let half = _mm256_set1_ps(0.5);
    let one = _mm256_set1_ps(1.0);
    let sign_bit = _mm256_set1_ps(-0.0);
    let lo = _mm256_set1_ps(-QMAX_F);
    let hi = _mm256_set1_ps(QMAX_F);
    let mut lanes = [0i32; LANES];

    let mut in_chunks = input.chunks_exact(LANES);
    let mut out_chunks = output.chunks_exact_mut(LANES);
    for (xs, qs) in (&mut in_chunks).zip(&mut out_chunks) {
        let v = _mm256_mul_ps(_mm256_loadu_ps(xs.as_ptr()), vscale);

        let t = _mm256_round_ps::<{ _MM_FROUND_TO_ZERO | _MM_FROUND_NO_EXC }>(v);
        let frac = _mm256_andnot_ps(sign_bit, _mm256_sub_ps(v, t));
        let away = _mm256_cmp_ps::<_CMP_GE_OQ>(frac, half);
        let unit = _mm256_or_ps(one, _mm256_and_ps(v, sign_bit));
        let rounded = _mm256_add_ps(t, _mm256_and_ps(away, unit));

        let clamped = _mm256_min_ps(_mm256_max_ps(rounded, lo), hi);
        let ordered = _mm256_cmp_ps::<_CMP_ORD_Q>(v, v);
        let q = _mm256_cvtps_epi32(_mm256_and_ps(clamped, ordered));

        _mm256_storeu_si256(lanes.as_mut_ptr() as *mut __m256i, q);
        for (o, &l) in qs.iter_mut().zip(lanes.iter()) {
            *o = l as i8;
        }
    }
    quantize_scalar(in_chunks.remainder(), out_chunks.into_remainder(), scale);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(input: &[f32], scale: f32, strategy: Strategy) -> Vec<i8> {
        let mut out = vec![0i8; input.len()];
        quantize(input, &mut out, scale, strategy);
        out
    }

    #[test]
    fn test_quantize_unit_scale_127() {
        for strategy in Strategy::ALL {
            assert_eq!(run(&[1.0, -1.0, 0.5], 127.0, strategy), vec![127, -127, 64]);
        }
    }

    #[test]
    fn test_quantize_ties_away_from_zero() {
        let input = [0.5, -0.5, 1.5, -1.5, 2.5, -2.5, 0.49999997, -0.49999997, 3.4999998];
        let expected = vec![1, -1, 2, -2, 3, -3, 0, 0, 3];
        for strategy in Strategy::ALL {
            assert_eq!(run(&input, 1.0, strategy), expected, "{:?}", strategy);
        }
    }

    #[test]
    fn test_quantize_saturates_symmetric() {
        let input = [200.0, -200.0, 127.4, -127.6, f32::INFINITY, f32::NEG_INFINITY, f32::NAN, 0.0, -0.0];
        let expected = vec![127, -127, 127, -127, 127, -127, 0, 0, 0];
        for strategy in Strategy::ALL {
            let q = run(&input, 1.0, strategy);
            assert_eq!(q, expected, "{:?}", strategy);
            assert!(q.iter().all(|&v| v != i8::MIN));
        }
    }

    #[test]
    fn test_quantize_strategies_agree_exactly() {
        for len in [0usize, 1, 7, 8, 9, 16, 67] {
            let input: Vec<f32> = (0..len).map(|i| (i as f32 - 33.0) * 0.0371).collect();
            for scale in [1.0, 13.5, 127.0, 1000.0] {
                assert_eq!(
                    run(&input, scale, Strategy::Scalar),
                    run(&input, scale, Strategy::Vectorized),
                    "len={} scale={}", len, scale
                );
            }
        }
    }

    #[test]
    fn test_quantize_lanes_matches_scalar() {
        let input: Vec<f32> = (0..27).map(|i| (i as f32 - 13.0) * 0.25).collect();
        let mut a = vec![0i8; 27];
        let mut b = vec![0i8; 27];
        quantize_scalar(&input, &mut a, 2.0);
        quantize_lanes(&input, &mut b, 2.0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_dequantize_error_within_half_step() {
        let scale = QuantScale::new(50.0).unwrap();
        let input: Vec<f32> = (0..200).map(|i| (i as f32 - 100.0) / 40.0).collect();
        let q = run(&input, scale.get(), Strategy::Vectorized);
        let tensor = QuantizedTensor::new(&q, scale);
        let mut back = vec![0.0f32; input.len()];
        tensor.dequantize_into(&mut back);

        for (x, y) in input.iter().zip(back.iter()) {
            assert!((x - y).abs() <= 0.5 * scale.step() + 1e-6, "{} vs {}", x, y);
        }
    }

    #[test]
    fn test_quant_scale_validation() {
        assert!(QuantScale::new(127.0).is_ok());
        assert_eq!(QuantScale::new(0.0), Err(KernelError::InvalidScale(0.0)));
        assert!(QuantScale::new(-1.0).is_err());
        assert!(QuantScale::new(f32::INFINITY).is_err());
        assert!(QuantScale::new(f32::NAN).is_err());

        let s = QuantScale::new(4.0).unwrap();
        assert_eq!(s.step(), 0.25);
        assert_eq!(s.dequantize(-8), -2.0);
        let t = QuantScale::new(2.0).unwrap();
        assert_eq!(s.dequantize_product(t, 16), 2.0);
    }
}
