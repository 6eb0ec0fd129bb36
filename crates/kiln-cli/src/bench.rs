//! Kernel benchmark harness.
//!
//! Every kernel runs with [`Strategy::Scalar`] as the baseline and
//! [`Strategy::Vectorized`] as the optimized variant. The int8 row compares
//! vectorized f32 matmul (baseline) with vectorized int8 matmul on operands
//! quantized beforehand; quantization is not timed.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use kiln_kernels::{KernelLibrary, QuantScale, Strategy};

use crate::config::BenchConfig;
use crate::results::ResultRow;

/// Rows in the order they are measured, plus the int8 accuracy check.
#[derive(Debug)]
pub struct BenchOutcome {
    pub rows: Vec<ResultRow>,
    pub int8_max_error: f32,
    pub int8_error_bound: f32,
}

fn timed(f: impl FnOnce() -> kiln_kernels::Result<()>) -> kiln_kernels::Result<Duration> {
    let start = Instant::now();
    f()?;
    Ok(start.elapsed())
}

fn mean_ms(iterations: usize, mut once: impl FnMut() -> kiln_kernels::Result<Duration>) -> kiln_kernels::Result<f64> {
    let mut total = Duration::ZERO;
    for _ in 0..iterations {
        total += once()?;
    }
    Ok(total.as_secs_f64() * 1000.0 / iterations as f64)
}

fn thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn uniform(rng: &mut StdRng, len: usize, bound: f32) -> Vec<f32> {
    (0..len).map(|_| rng.gen_range(-bound..bound)).collect()
}

fn compare(
    kernel: &str,
    size: &str,
    mut measure: impl FnMut(Strategy) -> kiln_kernels::Result<f64>,
) -> kiln_kernels::Result<ResultRow> {
    println!("\n--- {} | Size: {} ---", kernel.to_uppercase(), size);
    let baseline = measure(Strategy::Scalar)?;
    println!("Scalar          : {:.2} ms", baseline);
    let optimized = measure(Strategy::Vectorized)?;
    println!("Vectorized      : {:.2} ms", optimized);

    let row = ResultRow::new(kernel, baseline, optimized);
    println!("Speedup Factor  : {:.2}x", row.speedup);
    Ok(row)
}

/// Run the full benchmark suite through `kernels`.
pub fn run(kernels: &dyn KernelLibrary, cfg: &BenchConfig, scale: QuantScale) -> anyhow::Result<BenchOutcome> {
    tracing::info!(provider = kernels.name(), seed = cfg.seed, iterations = cfg.iterations, "benchmark started");
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let iters = cfg.iterations;

    let longest = cfg.relu_len.max(cfg.softmax_len).max(cfg.gelu_len);
    let data = uniform(&mut rng, longest, 10.0);
    let mut rows = Vec::with_capacity(5);

    let mut buf = vec![0.0f32; cfg.relu_len];
    rows.push(compare("ReLU", &thousands(cfg.relu_len), |strategy| {
        mean_ms(iters, || {
            buf.copy_from_slice(&data[..cfg.relu_len]);
            timed(|| kernels.relu(&mut buf, strategy))
        })
    })?);

    let input = &data[..cfg.softmax_len];
    let mut probs = vec![0.0f32; cfg.softmax_len];
    rows.push(compare("Softmax", &thousands(cfg.softmax_len), |strategy| {
        mean_ms(iters, || timed(|| kernels.softmax(input, &mut probs, strategy)))
    })?);
    drop(probs);

    buf.resize(cfg.gelu_len, 0.0);
    rows.push(compare("GELU", &thousands(cfg.gelu_len), |strategy| {
        mean_ms(iters, || {
            buf.copy_from_slice(&data[..cfg.gelu_len]);
            timed(|| kernels.gelu(&mut buf, strategy))
        })
    })?);
    drop(buf);

    // Matmul operands stay in [-1, 1) so the int8 range covers them at scale 127.
    let n = cfg.matmul_n;
    let a = uniform(&mut rng, n * n, 1.0);
    let b = uniform(&mut rng, n * n, 1.0);
    let mut c = vec![0.0f32; n * n];
    let matmul = compare("MatMul", &format!("{}x{}", n, n), |strategy| {
        mean_ms(iters, || timed(|| kernels.matmul_f32(&a, &b, &mut c, n, strategy)))
    })?;
    let f32_ms = matmul.optimized_ms;
    rows.push(matmul);

    let mut qa = vec![0i8; n * n];
    let mut qb = vec![0i8; n * n];
    let ta = kernels.quantize_tensor(&a, &mut qa, scale, Strategy::Vectorized)?;
    let tb = kernels.quantize_tensor(&b, &mut qb, scale, Strategy::Vectorized)?;
    tracing::debug!(n, scale = scale.get(), "operands quantized");

    let mut acc = vec![0i32; n * n];
    println!("\n--- MATMUL (INT8) | Size: {}x{} ---", n, n);
    let int8_ms = mean_ms(iters, || {
        timed(|| kernels.matmul_quantized(&ta, &tb, &mut acc, n, Strategy::Vectorized).map(|_| ()))
    })?;
    println!("Float32         : {:.2} ms", f32_ms);
    println!("Int8            : {:.2} ms", int8_ms);

    let int8 = ResultRow::new("MatMul (Int8)", f32_ms, int8_ms);
    if int8.is_slowdown() {
        println!("Quantization    : {:.2}x Slower than Float32", int8_ms / f32_ms);
    } else {
        println!("Quantization    : {:.2}x FASTER than Float32", int8.speedup);
    }
    rows.push(int8);

    // `c` holds the last vectorized f32 product.
    let int8_max_error = c
        .iter()
        .zip(acc.iter())
        .map(|(&r, &q)| (r - ta.scale().dequantize_product(tb.scale(), q)).abs())
        .fold(0.0f32, f32::max);
    let half_step = 0.5 * scale.step();
    let int8_error_bound = n as f32 * (2.0 * half_step + half_step * half_step) + 1e-4 * n as f32;
    println!("Max |int8 - f32|: {:.5} (bound {:.5})", int8_max_error, int8_error_bound);
    if int8_max_error > int8_error_bound {
        tracing::warn!(int8_max_error, int8_error_bound, "int8 matmul error exceeds quantization bound");
    }

    tracing::info!(rows = rows.len(), "benchmark finished");
    Ok(BenchOutcome { rows, int8_max_error, int8_error_bound })
}
