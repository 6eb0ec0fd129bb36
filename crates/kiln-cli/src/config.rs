//! Benchmark configuration.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use kiln_kernels::{QuantScale, MAX_INT8_REDUCTION};

/// Workload sizes and output location for `kiln bench`.
///
/// Loaded from JSON with every field optional; missing fields keep their
/// defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Elements in the ReLU buffer.
    pub relu_len: usize,

    /// Elements in the softmax input/output buffers.
    pub softmax_len: usize,

    /// Elements in the GELU buffer.
    pub gelu_len: usize,

    /// Side length N of the N×N matmul operands (f32 and int8).
    pub matmul_n: usize,

    /// Quantization scale shared by both int8 operands.
    pub scale: f32,

    /// Timed invocations per kernel and strategy; the mean is reported.
    pub iterations: usize,

    /// Seed for the input data generator.
    pub seed: u64,

    /// Results CSV path.
    pub output: PathBuf,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            relu_len: 10_000_000,
            softmax_len: 1_000_000,
            gelu_len: 1_000_000,
            matmul_n: 500,
            scale: 127.0,
            iterations: 1,
            seed: 42,
            output: PathBuf::from("benchmark_results/results.csv"),
        }
    }
}

impl BenchConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Reject configurations the kernels cannot run.
    pub fn validate(&self) -> anyhow::Result<QuantScale> {
        if self.iterations == 0 {
            bail!("iterations must be at least 1");
        }
        if self.matmul_n == 0 {
            bail!("matmul_n must be at least 1");
        }
        if self.matmul_n > MAX_INT8_REDUCTION {
            bail!("matmul_n {} exceeds the int8 accumulator limit {}", self.matmul_n, MAX_INT8_REDUCTION);
        }
        QuantScale::new(self.scale).context("invalid scale")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_workload() {
        let cfg = BenchConfig::default();
        assert_eq!(cfg.relu_len, 10_000_000);
        assert_eq!(cfg.softmax_len, 1_000_000);
        assert_eq!(cfg.matmul_n, 500);
        assert_eq!(cfg.scale, 127.0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.json");
        std::fs::write(&path, r#"{ "matmul_n": 64, "seed": 7 }"#).unwrap();

        let cfg = BenchConfig::from_file(&path).unwrap();
        assert_eq!(cfg.matmul_n, 64);
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.gelu_len, BenchConfig::default().gelu_len);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_scale = BenchConfig { scale: 0.0, ..BenchConfig::default() };
        assert!(bad_scale.validate().is_err());

        let too_big = BenchConfig { matmul_n: MAX_INT8_REDUCTION + 1, ..BenchConfig::default() };
        assert!(too_big.validate().is_err());

        let no_iters = BenchConfig { iterations: 0, ..BenchConfig::default() };
        assert!(no_iters.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = BenchConfig::from_file(Path::new("/nonexistent/kiln.json")).unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/kiln.json"));
    }
}
