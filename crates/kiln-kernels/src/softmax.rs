//! Numerically stable softmax into a caller-supplied output buffer.
//!
//! `out[i] = exp(x[i] - max(x)) / sum_j exp(x[j] - max(x))`
//!
//! Subtracting the max bounds every exponent to `<= 0`: large positive inputs
//! cannot overflow and large negative inputs cannot all underflow to zero,
//! because the max element always contributes `exp(0) = 1` to the sum.
//!
//! The normaliser is accumulated in `f64` under both strategies. An `f32`
//! running sum loses the small terms once it grows past a few thousand and
//! stops growing at all at 2^24, which breaks `sum(out) == 1` on long inputs.

use crate::strategy::Strategy;
use crate::LANES;

/// Softmax over the whole of `input`, written in full to `output`.
///
/// `output.len()` must equal `input.len()`. Empty input writes nothing.
pub fn softmax(input: &[f32], output: &mut [f32], strategy: Strategy) {
    debug_assert_eq!(input.len(), output.len(), "softmax: length mismatch");
    let output = &mut output[..input.len()];
    if input.is_empty() {
        return;
    }

    match strategy {
        Strategy::Scalar => softmax_scalar(input, output),
        Strategy::Vectorized => softmax_vectorized(input, output),
    }
}

fn softmax_scalar(input: &[f32], output: &mut [f32]) {
    let max_val = input.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    let mut sum = 0.0f64;
    for (o, &x) in output.iter_mut().zip(input) {
        let e = (x - max_val).exp();
        *o = e;
        sum += e as f64;
    }

    for o in output.iter_mut() {
        *o = (*o as f64 / sum) as f32;
    }
}

fn softmax_vectorized(input: &[f32], output: &mut [f32]) {
    #[cfg(target_arch = "x86_64")]
    {
        if crate::simd::SimdCapability::detect().avx2 {
            // Safety: AVX2 support checked above
            let max_val = unsafe { max_avx2(input) };
            let sum = exp_shifted_lanes(input, output, max_val);
            unsafe { scale_avx2(output, (1.0 / sum) as f32) };
            return;
        }
    }

    let max_val = max_lanes(input);
    let sum = exp_shifted_lanes(input, output, max_val);
    scale_lanes(output, (1.0 / sum) as f32);
}

/// Max over `LANES` independent running maxima, then across lanes.
fn max_lanes(input: &[f32]) -> f32 {
    let mut acc = [f32::NEG_INFINITY; LANES];
    let mut chunks = input.chunks_exact(LANES);
    for chunk in &mut chunks {
        for (m, &x) in acc.iter_mut().zip(chunk) {
            *m = m.max(x);
        }
    }
    chunks
        .remainder()
        .iter()
        .chain(acc.iter())
        .copied()
        .fold(f32::NEG_INFINITY, f32::max)
}

/// Writes `exp(x - max_val)` to `output` and returns the sum, accumulated in
/// `LANES` partial `f64` sums.
fn exp_shifted_lanes(input: &[f32], output: &mut [f32], max_val: f32) -> f64 {
    let mut sums = [0.0f64; LANES];
    let mut in_chunks = input.chunks_exact(LANES);
    let mut out_chunks = output.chunks_exact_mut(LANES);
    for (xs, os) in (&mut in_chunks).zip(&mut out_chunks) {
        for ((o, &x), s) in os.iter_mut().zip(xs).zip(sums.iter_mut()) {
            let e = (x - max_val).exp();
            *o = e;
            *s += e as f64;
        }
    }

    let mut tail = 0.0f64;
    for (o, &x) in out_chunks.into_remainder().iter_mut().zip(in_chunks.remainder()) {
        let e = (x - max_val).exp();
        *o = e;
        tail += e as f64;
    }

    sums.iter().sum::<f64>() + tail
}

fn scale_lanes(output: &mut [f32], factor: f32) {
    for o in output.iter_mut() {
        *o *= factor;
    }
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn max_avx2(input: &[f32]) -> f32 {
    use std::arch::x86_64::*;

    let mut vmax = _mm256_set1_ps(f32::NEG_INFINITY);
    let mut chunks = input.chunks_exact(LANES);
    for chunk in &mut chunks {
        vmax = _mm256_max_ps(vmax, _mm256_loadu_ps(chunk.as_ptr()));
    }

    let mut lanes = [0.0f32; LANES];
    _mm256_storeu_ps(lanes.as_mut_ptr(), vmax);
    chunks
        .remainder()
        .iter()
        .chain(lanes.iter())
        .copied()
        .fold(f32::NEG_INFINITY, f32::max)
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn scale_avx2(output: &mut [f32], factor: f32) {
    use std::arch::x86_64::*;

    let f = _mm256_set1_ps(factor);
    let mut chunks = output.chunks_exact_mut(LANES);
    for chunk in &mut chunks {
        let p = chunk.as_mut_ptr();
        _mm256_storeu_ps(p, _mm256_mul_ps(_mm256_loadu_ps(p), f));
    }
    scale_lanes(chunks.into_remainder(), factor);
}
