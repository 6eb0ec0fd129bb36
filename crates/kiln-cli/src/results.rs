//! Benchmark results table (CSV).

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// One kernel measurement: baseline against optimized wall time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub kernel: String,
    pub baseline_ms: f64,
    pub optimized_ms: f64,
    pub speedup: f64,
}

impl ResultRow {
    pub fn new(kernel: impl Into<String>, baseline_ms: f64, optimized_ms: f64) -> Self {
        let speedup = if optimized_ms > 0.0 { baseline_ms / optimized_ms } else { f64::INFINITY };
        ResultRow { kernel: kernel.into(), baseline_ms, optimized_ms, speedup }
    }

    /// The optimized variant lost to its baseline.
    pub fn is_slowdown(&self) -> bool {
        self.speedup < 1.0
    }
}

pub fn write_results(path: &Path, rows: &[ResultRow]) -> anyhow::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("opening {} for writing", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    tracing::debug!(path = %path.display(), rows = rows.len(), "results written");
    Ok(())
}

pub fn read_results(path: &Path) -> anyhow::Result<Vec<ResultRow>> {
    let mut reader = csv::Reader::from_path(path).with_context(|| format!("reading {}", path.display()))?;
    let rows = reader
        .deserialize()
        .collect::<Result<Vec<ResultRow>, _>>()
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(rows)
}
