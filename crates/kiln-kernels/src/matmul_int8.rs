//! Quantized matrix multiplication: int8 × int8 → int32, N×N row-major.
//!
//! Each product is bounded by `127 * 127 = 16129`, so an `i32` accumulator
//! holds any reduction of length `N <= MAX_INT8_REDUCTION`. The kernel does
//! not check that bound; the typed interface does.
//!
//! The scales of the operands are not needed here. Dividing the result by
//! `scale_a * scale_b` recovers approximate float values (see
//! [`QuantScale::dequantize_product`](crate::QuantScale::dequantize_product)).

use crate::strategy::Strategy;
use crate::LANES;

/// Longest reduction that cannot overflow an `i32` accumulator when every
/// operand lies in `[-127, 127]`.
pub const MAX_INT8_REDUCTION: usize = (i32::MAX / (127 * 127)) as usize;

/// qC[i][j] = Σ_k qA[i][k] * qB[k][j]
///
/// `a` and `b` hold `n * n` int8 values, `c` holds `n * n` int32 values and is
/// overwritten.
pub fn matmul_int8(a: &[i8], b: &[i8], c: &mut [i32], n: usize, strategy: Strategy) {
    let len = n * n;
    debug_assert_eq!(a.len(), len, "matmul_int8: A is not {n}x{n}");
    debug_assert_eq!(b.len(), len, "matmul_int8: B is not {n}x{n}");
    debug_assert_eq!(c.len(), len, "matmul_int8: C is not {n}x{n}");
    debug_assert!(n <= MAX_INT8_REDUCTION, "matmul_int8: N={n} may overflow i32");

    let (a, b, c) = (&a[..len], &b[..len], &mut c[..len]);
    c.fill(0);

    match strategy {
        Strategy::Scalar => matmul_int8_scalar(a, b, c, n),
        Strategy::Vectorized => matmul_int8_vectorized(a, b, c, n),
    }
}

/// A-stationary i-k-j loop: broadcast `A[i][k]`, stream row `k` of B into
/// row `i` of C.
fn matmul_int8_scalar(a: &[i8], b: &[i8], c: &mut [i32], n: usize) {
    for i in 0..n {
        let c_row = &mut c[i * n..(i + 1) * n];
        for k in 0..n {
            let a_val = a[i * n + k] as i32;
            let b_row = &b[k * n..(k + 1) * n];
            for (cv, &bv) in c_row.iter_mut().zip(b_row) {
                *cv += a_val * bv as i32;
            }
        }
    }
}

fn matmul_int8_vectorized(a: &[i8], b: &[i8], c: &mut [i32], n: usize) {
    #[cfg(target_arch = "x86_64")]
    {
        if crate::simd::SimdCapability::detect().avx2 {
            // Safety: AVX2 support checked above
            unsafe { matmul_int8_avx2(a, b, c, n) };
            return;
        }
    }

    matmul_int8_lanes(a, b, c, n);
}

fn matmul_int8_lanes(a: &[i8], b: &[i8], c: &mut [i32], n: usize) {
    let mut widened = [0i32; LANES];
    for i in 0..n {
        let c_row = &mut c[i * n..(i + 1) * n];
        for k in 0..n {
            let a_val = a[i * n + k] as i32;
            let b_row = &b[k * n..(k + 1) * n];

            let mut c_chunks = c_row.chunks_exact_mut(LANES);
            let mut b_chunks = b_row.chunks_exact(LANES);
            for (cs, bs) in (&mut c_chunks).zip(&mut b_chunks) {
                for (w, &bv) in widened.iter_mut().zip(bs) {
                    *w = bv as i32;
                }
                for (cv, &w) in cs.iter_mut().zip(widened.iter()) {
                    *cv += a_val * w;
                }
            }
            for (cv, &bv) in c_chunks.into_remainder().iter_mut().zip(b_chunks.remainder()) {
                *cv += a_val * bv as i32;
            }
        }
    }
}

/// AVX2 int8 matmul. Eight int8 values of a B row are sign-extended to int32
/// lanes, multiplied by the broadcast A value and added to eight C
/// accumulators. Integer arithmetic, so the result equals the scalar one.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn matmul_int8_avx2(a: &[i8], b: &[i8], c: &mut [i32], n: usize) {
    use std::arch::x86_64::*;

    for i in 0..n {
        let c_row = &mut c[i * n..(i + 1) * n];
        for k in 0..n {
            let a_scalar = a[i * n + k] as i32;
            let a_val = _mm256_set1_epi32(a_scalar);
            let b_row = &b[k * n..(k + 1) * n];

            let mut j = 0;
            while j + LANES <= n {
                let b8 = _mm_loadl_epi64(b_row.as_ptr().add(j) as *const __m128i);
                let b32 = _mm256_cvtepi8_epi32(b8);
                let c_ptr = c_row.as_mut_ptr().add(j) as *mut __m256i;
                let acc = _mm256_loadu_si256(c_ptr);
                _mm256_storeu_si256(c_ptr, _mm256_add_epi32(acc, _mm256_mullo_epi32(a_val, b32)));
                j += LANES;
            }

            // Scalar tail
            while j < n {
                c_row[j] += a_scalar * b_row[j] as i32;
                j += 1;
            }
        }
    }
}
