//! Known-answer checks for a kernel provider.

use kiln_kernels::{KernelLibrary, QuantScale, Strategy};

#[derive(Debug)]
pub struct Check {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

fn close(got: &[f32], want: &[f32], tol: f32) -> bool {
    got.len() == want.len() && got.iter().zip(want).all(|(g, w)| (g - w).abs() <= tol)
}

fn check(name: &'static str, outcome: Outcome) -> Check {
    match outcome {
        Ok((passed, detail)) => Check { name, passed, detail },
        Err(e) => Check { name, passed: false, detail: e.to_string() },
    }
}

type Outcome = kiln_kernels::Result<(bool, String)>;

fn relu(k: &dyn KernelLibrary, s: Strategy) -> Outcome {
    let mut x = [-1.0f32, 0.0, 1.0];
    k.relu(&mut x, s)?;
    Ok((x == [0.0, 0.0, 1.0], format!("{:?}", x)))
}

fn gelu(k: &dyn KernelLibrary, s: Strategy) -> Outcome {
    let mut x = [0.0f32, 30.0, -30.0];
    k.gelu(&mut x, s)?;
    Ok((close(&x, &[0.0, 30.0, 0.0], 1e-4), format!("{:?}", x)))
}

fn softmax(k: &dyn KernelLibrary, s: Strategy) -> Outcome {
    let mut p = [0.0f32; 3];
    k.softmax(&[1.0, 2.0, 3.0], &mut p, s)?;
    Ok((close(&p, &[0.0900, 0.2447, 0.6652], 1e-4), format!("{:?}", p)))
}

fn matmul_f32(k: &dyn KernelLibrary, s: Strategy) -> Outcome {
    let mut c = [0.0f32; 4];
    k.matmul_f32(&[1.0, 0.0, 0.0, 1.0], &[2.0, 3.0, 4.0, 5.0], &mut c, 2, s)?;
    Ok((c == [2.0, 3.0, 4.0, 5.0], format!("{:?}", c)))
}

fn quantize(k: &dyn KernelLibrary, s: Strategy) -> Outcome {
    let mut q = [0i8; 3];
    k.quantize(&[1.0, -1.0, 0.5], &mut q, QuantScale::new(127.0)?, s)?;
    Ok((q == [127, -127, 64], format!("{:?}", q)))
}

fn matmul_int8(k: &dyn KernelLibrary, s: Strategy) -> Outcome {
    let mut c = [0i32; 4];
    k.matmul_int8(&[1, 0, 0, 1], &[127, -127, 64, 0], &mut c, 2, s)?;
    Ok((c == [127, -127, 64, 0], format!("{:?}", c)))
}

const CASES: [(&str, fn(&dyn KernelLibrary, Strategy) -> Outcome); 6] = [
    ("relu", relu),
    ("gelu", gelu),
    ("softmax", softmax),
    ("matmul_f32", matmul_f32),
    ("quantize", quantize),
    ("matmul_int8", matmul_int8),
];

/// Run every check once with `strategy`.
pub fn run(kernels: &dyn KernelLibrary, strategy: Strategy) -> Vec<Check> {
    CASES
        .iter()
        .map(|&(name, case)| {
            let c = check(name, case(kernels, strategy));
            tracing::debug!(check = c.name, passed = c.passed, detail = %c.detail, "verify");
            c
        })
        .collect()
}
