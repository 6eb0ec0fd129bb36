//! Text rendering of a results table.

use std::fmt::Write;

use crate::results::ResultRow;

/// Log-scale horizontal bar chart of speedups, one labelled bar per kernel.
///
/// Slowdowns and non-finite speedups are left out; a trailing note names them.
pub fn render_chart(rows: &[ResultRow], width: usize) -> String {
    let (shown, excluded): (Vec<&ResultRow>, Vec<&ResultRow>) =
        rows.iter().partition(|r| r.speedup.is_finite() && !r.is_slowdown());

    let mut out = String::new();
    let _ = writeln!(out, "Speedup over baseline (log scale)\n");

    if shown.is_empty() {
        let _ = writeln!(out, "  (no speedups to plot)");
    }

    let label_w = shown.iter().map(|r| r.kernel.len()).max().unwrap_or(0);
    let top = shown.iter().map(|r| r.speedup.ln()).fold(0.0f64, f64::max).max(f64::EPSILON);

    for row in &shown {
        let len = ((row.speedup.ln() / top) * width as f64).round().max(1.0) as usize;
        let _ = writeln!(
            out,
            "  {:<label_w$} |{} {:.1}x",
            row.kernel,
            "█".repeat(len.min(width.max(1))),
            row.speedup,
        );
    }

    let (slower, unmeasured): (Vec<&ResultRow>, Vec<&ResultRow>) =
        excluded.into_iter().partition(|r| r.is_slowdown());
    if !slower.is_empty() || !unmeasured.is_empty() {
        out.push('\n');
    }
    excluded_note(&mut out, &slower, "slower than baseline");
    excluded_note(&mut out, &unmeasured, "no measurable optimized time");
    out
}

fn excluded_note(out: &mut String, rows: &[&ResultRow], reason: &str) {
    if rows.is_empty() {
        return;
    }
    let names: Vec<&str> = rows.iter().map(|r| r.kernel.as_str()).collect();
    let _ = writeln!(out, "  {} row(s) excluded ({}): {}", rows.len(), reason, names.join(", "));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(kernel: &str, speedup: f64) -> ResultRow {
        ResultRow { kernel: kernel.into(), baseline_ms: speedup, optimized_ms: 1.0, speedup }
    }

    #[test]
    fn test_excludes_slowdowns() {
        let rows = [row("ReLU", 287.0), row("Softmax", 2.7), row("MatMul (Int8)", 0.87)];
        let chart = render_chart(&rows, 40);

        assert!(chart.contains("ReLU"));
        assert!(chart.contains("287.0x"));
        assert!(chart.contains("2.7x"));
        assert!(!chart.contains("0.9x"));
        assert!(chart.contains("1 row(s) excluded"));
        assert!(chart.contains("MatMul (Int8)"));
    }

    #[test]
    fn test_log_scale_bars() {
        let rows = [row("big", 1000.0), row("mid", 31.6227766), row("one", 1.0)];
        let chart = render_chart(&rows, 40);
        let bar = |name: &str| {
            let line = chart.lines().find(|l| l.trim_start().starts_with(name)).unwrap();
            line.chars().filter(|&c| c == '█').count()
        };
        assert_eq!(bar("big"), 40);
        assert_eq!(bar("mid"), 20);
        assert_eq!(bar("one"), 1);
    }

    #[test]
    fn test_empty_and_infinite() {
        let chart = render_chart(&[row("instant", f64::INFINITY)], 20);
        assert!(chart.contains("no speedups"));
        assert!(chart.contains("1 row(s) excluded (no measurable optimized time): instant"));
        assert!(!chart.contains("slower than baseline"));
    }

    #[test]
    fn test_exclusion_reasons_are_separate() {
        let rows = [row("ReLU", 4.0), row("MatMul (Int8)", 0.5), row("GELU", f64::INFINITY)];
        let chart = render_chart(&rows, 10);
        assert!(chart.contains("1 row(s) excluded (slower than baseline): MatMul (Int8)"));
        assert!(chart.contains("1 row(s) excluded (no measurable optimized time): GELU"));
    }
}
