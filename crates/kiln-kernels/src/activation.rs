//! Elementwise activations on raw f32 slices (in place).
//!
//! Vectorized paths process [`LANES`]-wide chunks and finish the remainder
//! with the scalar loop, so any slice length is accepted.

use crate::strategy::Strategy;
use crate::LANES;

/// sqrt(2 / pi)
pub const SQRT_2_OVER_PI: f32 = 0.797_884_56;
/// Cubic coefficient of the tanh GELU approximation.
pub const GELU_COEFF: f32 = 0.044715;

/// ReLU: x = x if x > 0 else 0.
///
/// `-0.0` and `NaN` become `+0.0` under both strategies, so the two agree
/// bit for bit.
pub fn relu(data: &mut [f32], strategy: Strategy) {
    match strategy {
        Strategy::Scalar => relu_scalar(data),
        Strategy::Vectorized => relu_vectorized(data),
    }
}

/// GELU (tanh approximation):
/// x = 0.5 * x * (1 + tanh(sqrt(2/pi) * (x + 0.044715 * x^3)))
pub fn gelu(data: &mut [f32], strategy: Strategy) {
    match strategy {
        Strategy::Scalar => gelu_scalar(data),
        Strategy::Vectorized => gelu_vectorized(data),
    }
}

#[inline]
fn relu_one(x: f32) -> f32 {
    if x > 0.0 { x } else { 0.0 }
}

#[inline]
fn gelu_inner(x: f32) -> f32 {
    let x3 = x * x * x;
    SQRT_2_OVER_PI * (x + GELU_COEFF * x3)
}

#[inline]
fn gelu_one(x: f32) -> f32 {
    0.5 * x * (1.0 + gelu_inner(x).tanh())
}

fn relu_scalar(data: &mut [f32]) {
    for v in data.iter_mut() {
        *v = relu_one(*v);
    }
}

fn gelu_scalar(data: &mut [f32]) {
    for v in data.iter_mut() {
        *v = gelu_one(*v);
    }
}

fn relu_vectorized(data: &mut [f32]) {
    #[cfg(target_arch = "x86_64")]
    {
        if crate::simd::SimdCapability::detect().avx2 {
            // Safety: AVX2 support checked above
            unsafe { relu_avx2(data) };
            return;
        }
    }

    relu_lanes(data);
}

fn gelu_vectorized(data: &mut [f32]) {
    #[cfg(target_arch = "x86_64")]
    {
        if crate::simd::SimdCapability::detect().avx2 {
            // Safety: AVX2 support checked above
            unsafe { gelu_avx2(data) };
            return;
        }
    }

    gelu_lanes(data);
}

/// Portable lane-chunked ReLU. The fixed-width inner loop auto-vectorizes.
fn relu_lanes(data: &mut [f32]) {
    let mut chunks = data.chunks_exact_mut(LANES);
    for chunk in &mut chunks {
        for v in chunk.iter_mut() {
            *v = relu_one(*v);
        }
    }
    relu_scalar(chunks.into_remainder());
}

/// Portable lane-chunked GELU: polynomial and combine per chunk, tanh per lane.
fn gelu_lanes(data: &mut [f32]) {
    let mut inner = [0.0f32; LANES];
    let mut chunks = data.chunks_exact_mut(LANES);
    for chunk in &mut chunks {
        for (t, &x) in inner.iter_mut().zip(chunk.iter()) {
            *t = gelu_inner(x).tanh();
        }
        for (v, &t) in chunk.iter_mut().zip(inner.iter()) {
            *v = 0.5 * *v * (1.0 + t);
        }
    }
    gelu_scalar(chunks.into_remainder());
}

/// AVX2 ReLU: `max(x, 0)` on 8 floats per step.
///
/// `_mm256_max_ps` returns its second operand when either input is NaN or
/// both are zero, which reproduces `relu_one` exactly.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn relu_avx2(data: &mut [f32]) {
    use std::arch::x86_64::*;

    let zeros = _mm256_setzero_ps();
    let mut chunks = data.chunks_exact_mut(LANES);
    for chunk in &mut chunks {
        let p = chunk.as_mut_ptr();
        let v = _mm256_loadu_ps(p);
        _mm256_storeu_ps(p, _mm256_max_ps(v, zeros));
    }
    relu_scalar(chunks.into_remainder());
}

/// AVX2 GELU. The cubic polynomial and the final combine run in registers;
/// tanh has no AVX2 instruction and is evaluated per lane. Multiplies and adds
/// follow the scalar operation order, so only tanh rounding could differ.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn gelu_avx2(data: &mut [f32]) {
    use std::arch::x86_64::*;

    let c1 = _mm256_set1_ps(SQRT_2_OVER_PI);
    let c2 = _mm256_set1_ps(GELU_COEFF);
    let half = _mm256_set1_ps(0.5);
    let one = _mm256_set1_ps(1.0);
    let mut lanes = [0.0f32; LANES];

    let mut chunks = data.chunks_exact_mut(LANES);
    for chunk in &mut chunks {
        let p = chunk.as_mut_ptr();
        let x = _mm256_loadu_ps(p);
        let x3 = _mm256_mul_ps(_mm256_mul_ps(x, x), x);
        let inner = _mm256_mul_ps(c1, _mm256_add_ps(x, _mm256_mul_ps(c2, x3)));

        _mm256_storeu_ps(lanes.as_mut_ptr(), inner);
        for t in lanes.iter_mut() {
            *t = t.tanh();
        }
        let th = _mm256_loadu_ps(lanes.as_ptr());

        let y = _mm256_mul_ps(_mm256_mul_ps(half, x), _mm256_add_ps(one, th));
        _mm256_storeu_ps(p, y);
    }
    gelu_scalar(chunks.into_remainder());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|i| ((i * 37 + 11) % 97) as f32 * 0.25 - 12.0).collect()
    }

    #[test]
    fn test_relu() {
        for strategy in Strategy::ALL {
            let mut data = [-1.0, 0.0, 1.0];
            relu(&mut data, strategy);
            assert_eq!(data, [0.0, 0.0, 1.0]);

            let mut data = [-1.0, 0.0, 1.0, -0.5, 2.0];
            relu(&mut data, strategy);
            assert_eq!(data, [0.0, 0.0, 1.0, 0.0, 2.0]);
        }
    }

    #[test]
    fn test_relu_strategies_agree_exactly() {
        // Lengths around the lane width exercise both the chunks and the tail.
        for len in 0..=2 * LANES + 3 {
            let mut scalar = ramp(len);
            if len > 2 {
                scalar[1] = -0.0;
                scalar[2] = f32::NAN;
            }
            let mut vectorized = scalar.clone();

            relu(&mut scalar, Strategy::Scalar);
            relu(&mut vectorized, Strategy::Vectorized);

            let s: Vec<u32> = scalar.iter().map(|v| v.to_bits()).collect();
            let v: Vec<u32> = vectorized.iter().map(|v| v.to_bits()).collect();
            assert_eq!(s, v, "len={}", len);
            assert!(scalar.iter().all(|&x| x >= 0.0));
        }
    }

    #[test]
    fn test_relu_lanes_matches_scalar() {
        let mut a = ramp(29);
        let mut b = a.clone();
        relu_scalar(&mut a);
        relu_lanes(&mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn test_gelu() {
        for strategy in Strategy::ALL {
            let mut data = [0.0, 1.0, -1.0];
            gelu(&mut data, strategy);
            assert!(data[0].abs() < 1e-7); // gelu(0) = 0
            assert!((data[1] - 0.841_192).abs() < 1e-4);
            assert!((data[2] + 0.158_808).abs() < 1e-4);
        }
    }

    #[test]
    fn test_gelu_limits() {
        for strategy in Strategy::ALL {
            let mut data = [10.0, 20.0, -10.0, -20.0];
            gelu(&mut data, strategy);
            assert!((data[0] - 10.0).abs() < 1e-4);
            assert!((data[1] - 20.0).abs() < 1e-4);
            assert!(data[2].abs() < 1e-4);
            assert!(data[3].abs() < 1e-4);
        }
    }

    #[test]
    fn test_gelu_strategies_agree() {
        for len in [0, 1, 7, 8, 9, 64, 131] {
            let mut scalar = ramp(len);
            let mut vectorized = scalar.clone();
            gelu(&mut scalar, Strategy::Scalar);
            gelu(&mut vectorized, Strategy::Vectorized);

            for (i, (&s, &v)) in scalar.iter().zip(vectorized.iter()).enumerate() {
                let tol = 1e-5 * s.abs().max(v.abs()) + 1e-6;
                assert!((s - v).abs() <= tol, "len={} i={}: {} vs {}", len, i, s, v);
            }
        }
    }

    #[test]
    fn test_gelu_lanes_matches_scalar() {
        let mut a = ramp(21);
        let mut b = a.clone();
        gelu_scalar(&mut a);
        gelu_lanes(&mut b);
        assert_eq!(a, b);
    }
}
