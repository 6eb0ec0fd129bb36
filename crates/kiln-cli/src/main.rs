use std::path::{Path, PathBuf};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use kiln_kernels::{DynamicKernels, KernelLibrary, NativeKernels, SimdCapability, Strategy, ABI_VERSION};

mod bench;
mod config;
mod report;
mod results;
mod verify;

use config::BenchConfig;

const BANNER: &str = r#"
 _  _____ _     _   _
| |/ /_ _| |   | \ | |
| ' / | || |   |  \| |
| . \ | || |___| |\  |
|_|\_\___|_____|_| \_|"#;

#[derive(Parser)]
#[command(
    name = "kiln",
    about = "Kiln CPU kernel library CLI",
    long_about = "Scalar and vectorized CPU kernels for neural-network inference.\n\nBenchmarks ReLU, GELU, softmax, f32 matmul and int8 quantized matmul,\nin process or through the kiln-ffi shared library.",
    version,
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show platform, SIMD capabilities and the kernel set
    Info,
    /// Time every kernel, scalar against vectorized, and write a results CSV
    Bench {
        /// JSON file with benchmark settings; flags below override it
        #[arg(long)]
        config: Option<PathBuf>,
        /// ReLU buffer length
        #[arg(long)]
        relu_len: Option<usize>,
        /// Softmax buffer length
        #[arg(long)]
        softmax_len: Option<usize>,
        /// GELU buffer length
        #[arg(long)]
        gelu_len: Option<usize>,
        /// Matmul side length N
        #[arg(long)]
        matmul_n: Option<usize>,
        /// Quantization scale for the int8 matmul operands
        #[arg(long)]
        scale: Option<f32>,
        /// Timed runs per kernel and strategy
        #[arg(long)]
        iterations: Option<usize>,
        /// Seed for input data
        #[arg(long)]
        seed: Option<u64>,
        /// Results CSV path
        #[arg(long)]
        output: Option<PathBuf>,
        /// Run through a compiled kiln-ffi shared library instead of in process
        #[arg(long)]
        library: Option<PathBuf>,
    },
    /// Plot the speedups from a results CSV
    Report {
        #[arg(long, default_value = "benchmark_results/results.csv")]
        input: PathBuf,
        /// Width of the longest bar, in characters
        #[arg(long, default_value = "50")]
        width: usize,
    },
    /// Check every kernel against known answers
    Verify {
        /// Run through a compiled kiln-ffi shared library instead of in process
        #[arg(long)]
        library: Option<PathBuf>,
        /// scalar or vectorized; both when omitted
        #[arg(long)]
        strategy: Option<Strategy>,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

/// Kernel provider selected on the command line.
enum Provider {
    Native(NativeKernels),
    Dynamic(DynamicKernels),
}

impl Provider {
    /// Open the provider; a library that fails to load ends the process.
    fn open(library: Option<&Path>) -> Self {
        let Some(path) = library else {
            return Provider::Native(NativeKernels::init());
        };
        match DynamicKernels::load(path) {
            Ok(kernels) => Provider::Dynamic(kernels),
            Err(e) => {
                eprintln!("[ERROR] Could not load {}", path.display());
                eprintln!("  {}", e);
                eprintln!(
                    "Ensure the kernel library is built first: cargo build --release -p kiln-ffi (produces {})",
                    DynamicKernels::file_name().to_string_lossy()
                );
                std::process::exit(1);
            }
        }
    }

    fn as_library(&self) -> &dyn KernelLibrary {
        match self {
            Provider::Native(k) => k,
            Provider::Dynamic(k) => k,
        }
    }

    fn close(self) -> anyhow::Result<()> {
        match self {
            Provider::Native(_) => Ok(()),
            Provider::Dynamic(k) => Ok(k.close()?),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Info => cmd_info(),
        Commands::Bench {
            config,
            relu_len,
            softmax_len,
            gelu_len,
            matmul_n,
            scale,
            iterations,
            seed,
            output,
            library,
        } => {
            let mut cfg = match config {
                Some(path) => BenchConfig::from_file(&path)?,
                None => BenchConfig::default(),
            };
            if let Some(v) = relu_len { cfg.relu_len = v; }
            if let Some(v) = softmax_len { cfg.softmax_len = v; }
            if let Some(v) = gelu_len { cfg.gelu_len = v; }
            if let Some(v) = matmul_n { cfg.matmul_n = v; }
            if let Some(v) = scale { cfg.scale = v; }
            if let Some(v) = iterations { cfg.iterations = v; }
            if let Some(v) = seed { cfg.seed = v; }
            if let Some(v) = output { cfg.output = v; }
            cmd_bench(&cfg, library.as_deref())?;
        }
        Commands::Report { input, width } => cmd_report(&input, width),
        Commands::Verify { library, strategy } => cmd_verify(library.as_deref(), strategy)?,
    }
    Ok(())
}

fn cmd_info() {
    println!("{}", BANNER);
    println!("  v{}  -  CPU kernels for inference\n", env!("CARGO_PKG_VERSION"));

    println!("Platform");
    println!("  OS:   {}", std::env::consts::OS);
    println!("  Arch: {}", std::env::consts::ARCH);

    let simd = SimdCapability::detect();
    println!("\nSIMD (tier: {})", simd.best_tier());
    println!("  AVX2:    {}", if simd.avx2 { "[x]" } else { "[ ]" });
    println!("  AVX-512: {}", if simd.avx512f { "[x]" } else { "[ ]" });
    println!("  FMA:     {}", if simd.fma { "[x]" } else { "[ ]" });
    println!("  NEON:    {}", if simd.neon { "[x]" } else { "[ ]" });
    println!("  Vectorized path: {}", simd.vectorized_path());

    println!("\nKernels (strategies: {}, {})", Strategy::Scalar, Strategy::Vectorized);
    let kernels = [
        ("relu",        "max(x, 0), in place"),
        ("gelu",        "tanh-approximated GELU, in place"),
        ("softmax",     "max-shifted exponentials, normalized"),
        ("matmul_f32",  "N x N row-major, 64-wide tiles"),
        ("quantize",    "symmetric int8, ties away from zero"),
        ("matmul_int8", "N x N int8 with int32 accumulation"),
    ];
    for (name, desc) in kernels {
        println!("  {:<12} {}", name, desc);
    }

    println!("\nC ABI");
    println!("  version: {}", ABI_VERSION);
    println!("  library: {}", DynamicKernels::file_name().to_string_lossy());
}

fn cmd_bench(cfg: &BenchConfig, library: Option<&Path>) -> anyhow::Result<()> {
    let scale = cfg.validate()?;
    let provider = Provider::open(library);

    let simd = SimdCapability::detect();
    println!("=== Kiln Kernel Benchmark ===");
    println!("Provider: {} | SIMD: {}", provider.as_library().name(), simd.best_tier());

    let outcome = bench::run(provider.as_library(), cfg, scale)?;
    provider.close()?;
    tracing::info!(
        max_error = outcome.int8_max_error,
        bound = outcome.int8_error_bound,
        within_bound = outcome.int8_max_error <= outcome.int8_error_bound,
        "int8 matmul accuracy"
    );

    results::write_results(&cfg.output, &outcome.rows)?;
    println!("\n[SUCCESS] Results saved to {}", cfg.output.display());
    println!("Run `kiln report --input {}` to plot them.", cfg.output.display());
    Ok(())
}

fn cmd_report(input: &Path, width: usize) {
    match results::read_results(input) {
        Ok(rows) => print!("{}", report::render_chart(&rows, width)),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            eprintln!("Run `kiln bench` first to generate the results file.");
        }
    }
}

fn cmd_verify(library: Option<&Path>, strategy: Option<Strategy>) -> anyhow::Result<()> {
    let provider = Provider::open(library);
    let strategies = match strategy {
        Some(s) => vec![s],
        None => Strategy::ALL.to_vec(),
    };

    let mut failed = 0;
    for s in strategies {
        for check in verify::run(provider.as_library(), s) {
            let mark = if check.passed { "ok" } else { "FAIL" };
            println!("  [{:<4}] {:<12} {:<10} {}", mark, check.name, s, check.detail);
            if !check.passed {
                failed += 1;
            }
        }
    }
    provider.close()?;

    if failed > 0 {
        eprintln!("{} check(s) failed", failed);
        std::process::exit(1);
    }
    println!("All checks passed.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bench_overrides() {
        let cli = Cli::try_parse_from([
            "kiln", "-v", "bench", "--matmul-n", "64", "--seed", "9", "--output", "out.csv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Bench { matmul_n, seed, output, relu_len, library, .. } => {
                assert_eq!(matmul_n, Some(64));
                assert_eq!(seed, Some(9));
                assert_eq!(output, Some(PathBuf::from("out.csv")));
                assert_eq!(relu_len, None);
                assert!(library.is_none());
            }
            _ => panic!("expected bench"),
        }
    }

    #[test]
    fn test_parse_verify_strategy() {
        let cli = Cli::try_parse_from(["kiln", "verify", "--strategy", "scalar"]).unwrap();
        match cli.command {
            Commands::Verify { strategy, .. } => assert_eq!(strategy, Some(Strategy::Scalar)),
            _ => panic!("expected verify"),
        }
        assert!(Cli::try_parse_from(["kiln", "verify", "--strategy", "turbo"]).is_err());
    }

    #[test]
    fn test_native_provider() {
        let provider = Provider::open(None);
        assert_eq!(provider.as_library().name(), "native");
        provider.close().unwrap();
    }
}
