//! Dense f32 matrix multiplication: C = A @ B for N×N row-major matrices.
//!
//! Both strategies iterate output row `i`, then reduction index `k`, then
//! output column `j`, so the innermost loop streams a row of `B` and a row of
//! `C` sequentially. The vectorized path additionally blocks the loops into
//! cache-sized tiles and uses an 8-wide fused multiply-add.

use crate::strategy::Strategy;
use crate::LANES;

// Block sizes of the tiled path; one 64×64 f32 tile is 16 KiB.
const TILE_M: usize = 64;
const TILE_N: usize = 64;
const TILE_K: usize = 64;

/// C[i][j] = Σ_k A[i][k] * B[k][j]
///
/// `a`, `b` and `c` must each hold `n * n` elements. `c` is overwritten.
pub fn matmul_f32(a: &[f32], b: &[f32], c: &mut [f32], n: usize, strategy: Strategy) {
    let len = n * n;
    debug_assert_eq!(a.len(), len, "matmul_f32: A is not {n}x{n}");
    debug_assert_eq!(b.len(), len, "matmul_f32: B is not {n}x{n}");
    debug_assert_eq!(c.len(), len, "matmul_f32: C is not {n}x{n}");

    let (a, b, c) = (&a[..len], &b[..len], &mut c[..len]);
    c.fill(0.0);

    match strategy {
        Strategy::Scalar => matmul_scalar(a, b, c, n),
        Strategy::Vectorized => matmul_vectorized(a, b, c, n),
    }
}

/// Untiled i-k-j loop.
fn matmul_scalar(a: &[f32], b: &[f32], c: &mut [f32], n: usize) {
    for i in 0..n {
        let c_row = &mut c[i * n..(i + 1) * n];
        for k in 0..n {
            let a_val = a[i * n + k];
            let b_row = &b[k * n..(k + 1) * n];
            for (cv, &bv) in c_row.iter_mut().zip(b_row) {
                *cv += a_val * bv;
            }
        }
    }
}

fn matmul_vectorized(a: &[f32], b: &[f32], c: &mut [f32], n: usize) {
    #[cfg(target_arch = "x86_64")]
    {
        if crate::simd::SimdCapability::detect().has_avx2_fma() {
            // Safety: AVX2 and FMA support checked above
            unsafe { tiled_matmul_avx2(a, b, c, n) };
            return;
        }
    }

    tiled_matmul_lanes(a, b, c, n);
}

/// Portable tiled matmul with a lane-chunked inner loop.
///
/// For a fixed (i, j) the products are still summed in increasing `k`, so
/// this agrees exactly with `matmul_scalar`.
fn tiled_matmul_lanes(a: &[f32], b: &[f32], c: &mut [f32], n: usize) {
    for i0 in (0..n).step_by(TILE_M) {
        let i_end = (i0 + TILE_M).min(n);
        for j0 in (0..n).step_by(TILE_N) {
            let j_end = (j0 + TILE_N).min(n);
            for p0 in (0..n).step_by(TILE_K) {
                let p_end = (p0 + TILE_K).min(n);

                for i in i0..i_end {
                    let c_tile = &mut c[i * n + j0..i * n + j_end];
                    for p in p0..p_end {
                        let a_val = a[i * n + p];
                        let b_tile = &b[p * n + j0..p * n + j_end];

                        let mut c_chunks = c_tile.chunks_exact_mut(LANES);
                        let mut b_chunks = b_tile.chunks_exact(LANES);
                        for (cs, bs) in (&mut c_chunks).zip(&mut b_chunks) {
                            for (cv, &bv) in cs.iter_mut().zip(bs) {
                                *cv += a_val * bv;
                            }
                        }
                        for (cv, &bv) in c_chunks.into_remainder().iter_mut().zip(b_chunks.remainder()) {
                            *cv += a_val * bv;
                        }
                    }
                }
            }
        }
    }
}

/// Same tiling as `tiled_matmul_lanes`, with the row update
/// `c[i, j..j+8] += a[i, p] * b[p, j..j+8]` done as one `vfmadd`. The fused
/// rounding means results can differ from the scalar loop in the last bits.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2,fma")]
unsafe fn tiled_matmul_avx2(a: &[f32], b: &[f32], c: &mut [f32], n: usize) {
    use std::arch::x86_64::*;

    for i0 in (0..n).step_by(TILE_M) {
        let i_end = (i0 + TILE_M).min(n);
        for j0 in (0..n).step_by(TILE_N) {
            let j_end = (j0 + TILE_N).min(n);
            for p0 in (0..n).step_by(TILE_K) {
                let p_end = (p0 + TILE_K).min(n);

                for i in i0..i_end {
                    let c_tile = &mut c[i * n + j0..i * n + j_end];
                    for p in p0..p_end {
                        let a_scalar = a[i * n + p];
                        let a_val = _mm256_set1_ps(a_scalar);
                        let b_tile = &b[p * n + j0..p * n + j_end];

                        let mut j = 0;
                        while j + LANES <= b_tile.len() {
                            let c_ptr = c_tile.as_mut_ptr().add(j);
                            let b_vec = _mm256_loadu_ps(b_tile.as_ptr().add(j));
                            let c_vec = _mm256_loadu_ps(c_ptr);
                            _mm256_storeu_ps(c_ptr, _mm256_fmadd_ps(a_val, b_vec, c_vec));
                            j += LANES;
                        }

                        // Scalar tail
                        while j < b_tile.len() {
                            c_tile[j] += a_scalar * b_tile[j];
                            j += 1;
                        }
                    }
                }
            }
        }
    }
}
