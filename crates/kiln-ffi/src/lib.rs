//! C ABI for the kiln kernels.
//!
//! Build with `cargo build --release -p kiln-ffi` to get `libkiln_ffi.so`
//! (`.dylib` / `.dll`) and `libkiln_ffi.a`. Declarations live in
//! `include/kiln.h`.
//!
//! ```c
//! #include "kiln.h"
//! float x[3] = {-1.0f, 0.0f, 1.0f};
//! kiln_relu(x, 3, KILN_VECTORIZED);
//! ```
//!
//! Buffers are caller-owned and must hold the stated number of elements;
//! nothing is bounds checked beyond what a length allows. A null pointer turns
//! the call into a no-op. `strategy` is `0` (scalar) or `1` (vectorized);
//! other values select vectorized.

use std::slice;

use kiln_kernels::{activation, matmul, matmul_int8, quantize, softmax, Strategy, ABI_VERSION};

/// ABI version of this library; checked by loaders before any other call.
#[no_mangle]
pub extern "C" fn kiln_abi_version() -> u32 {
    ABI_VERSION
}

/// ReLU over `data[0..n]`, in place.
///
/// # Safety
/// `data` must be null or valid for reads and writes of `n` floats.
#[no_mangle]
pub unsafe extern "C" fn kiln_relu(data: *mut f32, n: usize, strategy: u32) {
    if data.is_null() {
        return;
    }
    let data = slice::from_raw_parts_mut(data, n);
    activation::relu(data, Strategy::from_code(strategy));
}

/// GELU over `data[0..n]`, in place.
///
/// # Safety
/// `data` must be null or valid for reads and writes of `n` floats.
#[no_mangle]
pub unsafe extern "C" fn kiln_gelu(data: *mut f32, n: usize, strategy: u32) {
    if data.is_null() {
        return;
    }
    let data = slice::from_raw_parts_mut(data, n);
    activation::gelu(data, Strategy::from_code(strategy));
}

/// Softmax of `input[0..n]` into `output[0..n]`.
///
/// # Safety
/// `input` and `output` must be null or valid for `n` floats and must not
/// overlap.
#[no_mangle]
pub unsafe extern "C" fn kiln_softmax(input: *const f32, output: *mut f32, n: usize, strategy: u32) {
    if input.is_null() || output.is_null() {
        return;
    }
    let input = slice::from_raw_parts(input, n);
    let output = slice::from_raw_parts_mut(output, n);
    softmax::softmax(input, output, Strategy::from_code(strategy));
}

/// `c = a @ b` for N×N row-major float matrices. `c` is overwritten.
///
/// # Safety
/// Each pointer must be null or valid for `n * n` floats; `c` must not
/// overlap `a` or `b`.
#[no_mangle]
pub unsafe extern "C" fn kiln_matmul_f32(a: *const f32, b: *const f32, c: *mut f32, n: usize, strategy: u32) {
    if a.is_null() || b.is_null() || c.is_null() {
        return;
    }
    let Some(len) = n.checked_mul(n) else { return };
    let a = slice::from_raw_parts(a, len);
    let b = slice::from_raw_parts(b, len);
    let c = slice::from_raw_parts_mut(c, len);
    matmul::matmul_f32(a, b, c, n, Strategy::from_code(strategy));
}

/// Symmetric int8 quantization of `input[0..len]` into `output[0..len]`.
/// A non-positive or non-finite `scale` makes the call a no-op.
///
/// # Safety
/// `input` must be null or valid for `len` floats, `output` null or valid
/// for `len` bytes.
#[no_mangle]
pub unsafe extern "C" fn kiln_quantize(input: *const f32, output: *mut i8, len: usize, scale: f32, strategy: u32) {
    if input.is_null() || output.is_null() || !(scale.is_finite() && scale > 0.0) {
        return;
    }
    let input = slice::from_raw_parts(input, len);
    let output = slice::from_raw_parts_mut(output, len);
    quantize::quantize(input, output, scale, Strategy::from_code(strategy));
}

/// `c = a @ b` for N×N int8 matrices into an int32 matrix. `c` is
/// overwritten. Requires `n <= 133144` so the accumulator cannot overflow;
/// larger `n` makes the call a no-op.
///
/// # Safety
/// `a` and `b` must be null or valid for `n * n` bytes, `c` null or valid
/// for `n * n` int32 values.
#[no_mangle]
pub unsafe extern "C" fn kiln_matmul_int8(a: *const i8, b: *const i8, c: *mut i32, n: usize, strategy: u32) {
    if a.is_null() || b.is_null() || c.is_null() || n > matmul_int8::MAX_INT8_REDUCTION {
        return;
    }
    let len = n * n;
    let a = slice::from_raw_parts(a, len);
    let b = slice::from_raw_parts(b, len);
    let c = slice::from_raw_parts_mut(c, len);
    matmul_int8::matmul_int8(a, b, c, n, Strategy::from_code(strategy));
}
