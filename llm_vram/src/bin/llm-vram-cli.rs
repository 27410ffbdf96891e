//! llm-vram CLI: binary crate entry-point
//! =======================================
//!
//! Command-line wrapper around the `llm_vram` engine. Every subcommand takes
//! the request either from flags or from a JSON file (`--input`) and prints a
//! human-readable report, or JSON with `--json`.
//!
//! ## Typical usage
//! ```text
//! # Where does the memory go?
//! $ llm-vram-cli breakdown --vram 24 --params 7 --quantization awq --batch-size 8
//!
//! # Which format fits?
//! $ llm-vram-cli recommend-quant --vram 16 --params 13
//!
//! # A ready-to-run server command
//! $ llm-vram-cli optimize --strategy latency --vram 80 --params 13 --workload chat
//!
//! # All three strategies side by side
//! $ llm-vram-cli compare --input request.json --json
//! ```
//!
//! Logs go to stderr, so `--json` output can be piped as is.

// cargo run --bin llm-vram-cli -- optimize --vram 80 --params 7

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use llm_vram::{
    deployment::{RawGpuSpecs, RawModelSpecs, RawWorkloadSpecs},
    *,
};

#[derive(Debug, Parser)]
#[command(name = "llm-vram-cli", version, about = "GPU memory estimation and vLLM deployment planning")]
struct Cli {
    /// Print JSON instead of a report
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging on stderr
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// TOML file overriding the calibration constants
    #[arg(long, global = true, value_name = "PATH")]
    calibration: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Per-category VRAM breakdown
    Breakdown(SpecArgs),

    /// Least aggressive quantization that fits
    RecommendQuant(SpecArgs),

    /// Deployment configuration for one strategy
    Optimize {
        #[arg(long, short = 's', default_value = "balanced")]
        strategy: StrategyKind,

        #[command(flatten)]
        spec: SpecArgs,
    },

    /// Run all strategies and recommend one
    Compare(SpecArgs),

    /// Server settings for a workload profile
    Workload(WorkloadArgs),
}

#[derive(Debug, Args)]
struct SpecArgs {
    /// Total VRAM across all GPUs, in GB
    #[arg(long, value_name = "GB")]
    vram: Option<f64>,

    /// Parameter count in billions
    #[arg(long, short = 'p', value_name = "BILLIONS", conflicts_with = "model_size")]
    params: Option<f64>,

    /// Weight footprint in GB, instead of a parameter count
    #[arg(long, value_name = "GB")]
    model_size: Option<f64>,

    /// Weight format, e.g. fp16, awq, int8
    #[arg(long, short = 'q')]
    quantization: Option<String>,

    /// Maximum sequence length
    #[arg(long, value_name = "TOKENS")]
    seq_len: Option<u64>,

    /// Concurrent sequences for breakdowns and recommendations
    #[arg(long, default_value_t = 1)]
    batch_size: u64,

    #[arg(long, short = 'w')]
    workload: Option<WorkloadType>,

    #[arg(long)]
    gpu_count: Option<u32>,

    /// Model path or hub id for the generated command
    #[arg(long, short = 'm')]
    model: Option<String>,

    /// JSON request file; takes the place of the flags above
    #[arg(long, short = 'i', value_name = "PATH")]
    input: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct WorkloadArgs {
    /// Workload name; unknown names fall back to serving
    #[arg(default_value = "serving")]
    name: String,

    #[arg(long, short = 'k', default_value = "workload")]
    kind: OptimizationKind,

    #[arg(long, value_name = "TOKENS")]
    avg_input: Option<u64>,

    #[arg(long, value_name = "TOKENS")]
    avg_output: Option<u64>,

    #[arg(long)]
    concurrency: Option<u64>,

    /// Priority tag such as quality or cost; repeatable
    #[arg(long = "priority")]
    priorities: Vec<String>,

    /// JSON workload profile; takes the place of the flags above
    #[arg(long, short = 'i', value_name = "PATH")]
    input: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // the guard lives as long as `logging`
    let mut logging = LoggingConfig::new()
        .logger_name("llm-vram-cli")
        .logging_enabled(cli.verbose)
        .log_level_debug();
    if cli.verbose {
        logging.load_logger()?;
    }

    let calibration = match &cli.calibration {
        Some(path) => Calibration::load_path(path)?,
        None => Calibration::default(),
    };

    match cli.cmd {
        Cmd::Breakdown(spec) => {
            let config = spec.breakdown_config(calibration)?;
            let report = breakdown(&config)?;
            if cli.json {
                print_json(&report)?;
            } else {
                println!("{report}");
                for line in report.memory_pressure.recommendations {
                    println!("  - {line}");
                }
            }
        }

        Cmd::RecommendQuant(spec) => {
            let vram = spec.required_vram()?;
            let params = match (spec.params, spec.model_size) {
                (Some(params), _) => params,
                (None, Some(size)) => ModelSpec::builder()
                    .model_size_gb(size)
                    .quantization(spec.quantization_format()?)
                    .build()
                    .resolved_params_b()?,
                (None, None) => return Err(anyhow!("--params or --model-size is required")),
            };
            let options = RecommendOptions::builder()
                .batch_size(spec.batch_size)
                .maybe_max_seq_len(spec.seq_len)
                .build();
            let rec = recommend(vram, params, options)?;
            if cli.json {
                print_json(&rec)?;
            } else {
                print_recommendation(&rec);
            }
        }

        Cmd::Optimize { strategy, spec } => {
            let request = spec.optimization_request()?;
            let config = optimized_config(strategy, &request, &calibration)?;
            if cli.json {
                print_json(&config)?;
            } else {
                println!("{config}");
            }
        }

        Cmd::Compare(spec) => {
            let request = spec.optimization_request()?;
            let comparison = compare_strategies(&request, &calibration)?;
            if cli.json {
                print_json(&comparison)?;
            } else {
                print_comparison(&comparison);
            }
        }

        Cmd::Workload(args) => {
            let (kind, profile) = args.profile()?;
            let optimization = optimize_for(kind, &profile)?;
            if cli.json {
                print_json(&optimization)?;
            } else {
                print_workload(&optimization);
            }
        }
    }

    Ok(())
}

impl SpecArgs {
    fn required_vram(&self) -> anyhow::Result<f64> {
        self.vram.ok_or_else(|| anyhow!("--vram is required"))
    }

    fn quantization_format(&self) -> VramResult<QuantizationFormat> {
        self.quantization
            .as_deref()
            .map_or(Ok(QuantizationFormat::Fp16), str::parse::<QuantizationFormat>)
    }

    fn breakdown_config(&self, calibration: Calibration) -> anyhow::Result<BreakdownConfig> {
        if let Some(path) = &self.input {
            let mut config: BreakdownConfig = serde_json::from_value(read_json(path)?)
                .with_context(|| format!("{} is not a breakdown request", path.display()))?;
            config.calibration = calibration;
            return Ok(config);
        }
        if self.params.is_none() && self.model_size.is_none() {
            return Err(anyhow!("--params or --model-size is required"));
        }
        Ok(BreakdownConfig::builder()
            .total_vram_gb(self.required_vram()?)
            .maybe_num_params(self.params)
            .maybe_model_size_gb(self.model_size)
            .quantization(self.quantization_format()?)
            .batch_size(self.batch_size)
            .maybe_max_seq_len(self.seq_len)
            .workload_type(self.workload.unwrap_or_default())
            .calibration(calibration)
            .build())
    }

    fn optimization_request(&self) -> anyhow::Result<RawOptimizationParams> {
        if let Some(path) = &self.input {
            return Ok(RawOptimizationParams::from_value(read_json(path)?)?);
        }
        Ok(RawOptimizationParams {
            flat_gpu: RawGpuSpecs {
                total_vram_gb: Some(self.required_vram()?),
                gpu_count: self.gpu_count,
                ..Default::default()
            },
            flat_model: RawModelSpecs {
                num_params: self.params,
                model_size_gb: self.model_size,
                quantization: self.quantization.clone(),
                model_path: self.model.clone(),
                ..Default::default()
            },
            flat_workload: RawWorkloadSpecs {
                workload_type: self.workload.map(|w| w.key().to_string()),
                max_seq_len: self.seq_len,
                ..Default::default()
            },
            ..Default::default()
        })
    }
}

impl WorkloadArgs {
    fn profile(&self) -> anyhow::Result<(OptimizationKind, WorkloadProfile)> {
        if let Some(path) = &self.input {
            let profile = serde_json::from_value(read_json(path)?)
                .with_context(|| format!("{} is not a workload profile", path.display()))?;
            return Ok((self.kind, profile));
        }
        Ok((
            self.kind,
            WorkloadProfile {
                workload_type: self.name.clone(),
                avg_input_len: self.avg_input,
                avg_output_len: self.avg_output,
                peak_concurrency: self.concurrency,
                priorities: self.priorities.clone(),
            },
        ))
    }
}

fn read_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_recommendation(rec: &QuantizationRecommendation) {
    if rec.can_fit {
        println!(
            "Recommended: {} ({:.2} GB of {:.2} GB usable, {:.1}%)",
            rec.format, rec.total_memory_gb, rec.usable_vram_gb, rec.utilization_percent
        );
    } else {
        println!("No format fits in {:.2} GB usable VRAM", rec.usable_vram_gb);
    }
    println!("{}", rec.reason);
    for fit in &rec.evaluated {
        let mark = if fit.fits { "fits" } else { "too large" };
        println!("  {:<6} {:>8.2} GB  {mark}", fit.format.to_string(), fit.total_memory_gb);
    }
}

fn print_comparison(comparison: &StrategyComparison) {
    for outcome in &comparison.results {
        match &outcome.config {
            Some(config) => println!(
                "{:<11} {:>4} seqs  {:>5.0}% util  KV {:>5.1}% of VRAM  {:>8.0} tok/s",
                outcome.strategy.to_string(),
                config.batch.max_num_seqs,
                config.memory.gpu_memory_utilization * 100.0,
                outcome.memory_efficiency * 100.0,
                config.performance.tokens_per_second
            ),
            None => println!(
                "{:<11} not viable: {}",
                outcome.strategy.to_string(),
                outcome.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
    match comparison.recommended {
        Some(strategy) => println!("Recommended: {strategy} ({})", comparison.reason),
        None => println!("Recommended: none ({})", comparison.reason),
    }
    if let Some(config) = comparison.recommended_config() {
        println!("{}", config.command);
    }
}

fn print_workload(optimization: &WorkloadOptimization) {
    if optimization.fell_back {
        println!("Unknown workload, using {} defaults", optimization.workload_type);
    }
    println!(
        "{} workload: {} strategy, {} weights, {:?} batching",
        optimization.workload_type,
        optimization.strategy,
        optimization.quantization,
        optimization.batching
    );
    println!(
        "  max_num_seqs {}  max_num_batched_tokens {}  gpu_memory_utilization {:.2}  block_size {}",
        optimization.max_num_seqs,
        optimization.max_num_batched_tokens,
        optimization.gpu_memory_utilization,
        optimization.block_size
    );
    let flags = optimization.flags;
    println!(
        "  prefix caching {}  chunked prefill {}  disable log stats {}  enforce eager {}",
        flags.prefix_caching, flags.chunked_prefill, flags.disable_log_stats, flags.enforce_eager
    );
    for adjustment in &optimization.adjustments {
        println!("  - {adjustment}");
    }
}
