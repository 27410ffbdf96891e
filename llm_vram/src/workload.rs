//! Workload-driven presets.
//!
//! A fixed table maps each workload type to a quantization, a strategy and a
//! set of server flags. [`optimize_for`] looks the workload up, sizes the
//! batch from the chosen strategy's profile, then applies the caller's profile:
//!
//! | profile field           | adjustment                                |
//! |-------------------------|-------------------------------------------|
//! | `peak_concurrency`      | caps `max_num_seqs`                       |
//! | `avg_input_len > 2048`  | enables chunked prefill                   |
//! | priority `quality`      | forces fp16 (wins over cost and memory)   |
//! | priority `cost`/`memory`| forces awq                                |
//!
//! Unknown workload names fall back to `serving` with a warning.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{
    error::{ensure_nonzero, VramError, VramResult},
    quantization::QuantizationFormat,
    strategy::StrategyKind,
    types::{WorkloadSpec, WorkloadType, DEFAULT_AVG_INPUT_LEN, DEFAULT_AVG_OUTPUT_LEN},
};

/// Inputs longer than this are prefilled in chunks.
pub const LONG_INPUT_TOKENS: u64 = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationKind {
    /// Use the strategy the workload preset names.
    Workload,
    Latency,
    Balance,
}

impl FromStr for OptimizationKind {
    type Err = VramError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "workload" => Ok(Self::Workload),
            "latency" => Ok(Self::Latency),
            "balance" | "balanced" => Ok(Self::Balance),
            other => Err(VramError::validation(
                "optimization_kind",
                format!("unknown kind '{other}', expected workload, latency or balance"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatchingMode {
    /// Admit requests every step.
    Continuous,
    /// Few sequences, small steps.
    LowLatency,
    /// Large steps sized for offline jobs.
    Offline,
    /// Continuous batching with chunked prefill for mixed prompt lengths.
    Adaptive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServerFlags {
    pub prefix_caching: bool,
    pub chunked_prefill: bool,
    pub disable_log_stats: bool,
    pub enforce_eager: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkloadPreset {
    pub quantization: QuantizationFormat,
    pub strategy: StrategyKind,
    pub batching: BatchingMode,
    pub flags: ServerFlags,
}

const fn preset(
    quantization: QuantizationFormat,
    strategy: StrategyKind,
    batching: BatchingMode,
    prefix_caching: bool,
    chunked_prefill: bool,
    disable_log_stats: bool,
    enforce_eager: bool,
) -> WorkloadPreset {
    WorkloadPreset {
        quantization,
        strategy,
        batching,
        flags: ServerFlags {
            prefix_caching,
            chunked_prefill,
            disable_log_stats,
            enforce_eager,
        },
    }
}

/// The dispatch table.
pub const fn workload_preset(workload_type: WorkloadType) -> WorkloadPreset {
    use BatchingMode::*;
    use QuantizationFormat::{Awq, Fp16};
    use StrategyKind::{Balanced, Latency, Throughput};

    //                                                   prefix chunked nolog  eager
    match workload_type {
        WorkloadType::Serving => preset(Fp16, Balanced, Continuous, true, false, false, false),
        WorkloadType::Batch => preset(Awq, Throughput, Offline, false, false, true, true),
        WorkloadType::Mixed => preset(Fp16, Balanced, Adaptive, true, true, false, false),
        WorkloadType::Chat => preset(Fp16, Latency, Continuous, true, true, false, false),
        WorkloadType::Interactive => preset(Fp16, Latency, LowLatency, true, true, false, false),
        WorkloadType::Realtime => preset(Fp16, Latency, LowLatency, false, true, true, false),
        WorkloadType::Streaming => preset(Fp16, Latency, Continuous, false, true, false, false),
        WorkloadType::WebApi => preset(Awq, Balanced, Adaptive, true, true, false, false),
        WorkloadType::CodeCompletion => preset(Fp16, Latency, LowLatency, true, true, false, false),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationPriority {
    Quality,
    Cost,
    Memory,
    Latency,
    Throughput,
}

impl FromStr for OptimizationPriority {
    type Err = VramError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quality" | "accuracy" => Ok(Self::Quality),
            "cost" => Ok(Self::Cost),
            "memory" => Ok(Self::Memory),
            "latency" | "speed" => Ok(Self::Latency),
            "throughput" => Ok(Self::Throughput),
            other => Err(VramError::validation(
                "priority",
                format!("unknown priority '{other}'"),
            )),
        }
    }
}

/// What the caller knows about their traffic.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkloadProfile {
    /// Workload name; anything unrecognised is treated as `serving`.
    #[serde(default, alias = "workloadType", alias = "type")]
    pub workload_type: String,
    #[serde(default, alias = "averageInputLength", alias = "avgInputLength")]
    pub avg_input_len: Option<u64>,
    #[serde(default, alias = "averageOutputLength", alias = "avgOutputLength")]
    pub avg_output_len: Option<u64>,
    #[serde(default, alias = "peakConcurrency", alias = "concurrency")]
    pub peak_concurrency: Option<u64>,
    /// Free-form tags such as `quality` or `cost`; unknown tags are ignored.
    #[serde(default)]
    pub priorities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkloadOptimization {
    pub kind: OptimizationKind,
    pub workload_type: WorkloadType,
    /// True when the requested workload name was not recognised.
    pub fell_back: bool,
    pub strategy: StrategyKind,
    pub quantization: QuantizationFormat,
    pub batching: BatchingMode,
    pub max_num_seqs: u64,
    pub max_num_batched_tokens: u64,
    pub gpu_memory_utilization: f64,
    pub block_size: u64,
    pub flags: ServerFlags,
    /// Human-readable record of every profile adjustment applied.
    pub adjustments: Vec<String>,
}

pub fn optimize_for(
    kind: OptimizationKind,
    profile: &WorkloadProfile,
) -> VramResult<WorkloadOptimization> {
    let (workload_type, fell_back) = WorkloadType::resolve(&profile.workload_type);
    let preset = workload_preset(workload_type);
    let strategy = match kind {
        OptimizationKind::Workload => preset.strategy,
        OptimizationKind::Latency => StrategyKind::Latency,
        OptimizationKind::Balance => StrategyKind::Balanced,
    };

    let avg_input_len = profile.avg_input_len.unwrap_or(DEFAULT_AVG_INPUT_LEN);
    let avg_output_len = profile.avg_output_len.unwrap_or(DEFAULT_AVG_OUTPUT_LEN);
    ensure_nonzero("avg_input_len", avg_input_len)?;
    ensure_nonzero("avg_output_len", avg_output_len)?;
    if let Some(concurrency) = profile.peak_concurrency {
        ensure_nonzero("peak_concurrency", concurrency)?;
    }

    let workload = WorkloadSpec {
        workload_type,
        avg_input_len,
        avg_output_len,
        concurrency: profile.peak_concurrency,
        ..WorkloadSpec::default()
    };
    let mut strategy_profile = strategy.profile(&workload);
    let mut flags = preset.flags;
    flags.chunked_prefill |= strategy_profile.chunked_prefill;
    let mut quantization = preset.quantization;
    let mut adjustments = Vec::new();

    let mut max_num_seqs = strategy_profile.max_seqs_cap;
    if let Some(concurrency) = profile.peak_concurrency {
        if concurrency < max_num_seqs {
            adjustments.push(format!(
                "max_num_seqs capped at peak concurrency {concurrency} (was {max_num_seqs})"
            ));
            max_num_seqs = concurrency;
        }
    }

    if avg_input_len > LONG_INPUT_TOKENS && !flags.chunked_prefill {
        adjustments.push(format!(
            "chunked prefill enabled for {avg_input_len}-token inputs"
        ));
        flags.chunked_prefill = true;
    }
    strategy_profile.chunked_prefill = flags.chunked_prefill;

    let priorities: Vec<OptimizationPriority> = profile
        .priorities
        .iter()
        .filter_map(|tag| match tag.parse() {
            Ok(priority) => Some(priority),
            Err(_) => {
                tracing::warn!(tag = tag.as_str(), "ignoring unknown priority tag");
                None
            }
        })
        .collect();
    if priorities.contains(&OptimizationPriority::Quality) {
        if quantization != QuantizationFormat::Fp16 {
            adjustments.push(format!("quality priority: {quantization} replaced by fp16"));
        }
        quantization = QuantizationFormat::Fp16;
    } else if priorities
        .iter()
        .any(|p| matches!(p, OptimizationPriority::Cost | OptimizationPriority::Memory))
    {
        if quantization != QuantizationFormat::Awq {
            adjustments.push(format!("cost/memory priority: {quantization} replaced by awq"));
        }
        quantization = QuantizationFormat::Awq;
    }

    let max_num_batched_tokens = strategy_profile.token_budget(max_num_seqs, &workload);

    tracing::debug!(
        workload = %workload_type,
        strategy = %strategy,
        %quantization,
        max_num_seqs,
        max_num_batched_tokens,
        "workload optimization"
    );

    Ok(WorkloadOptimization {
        kind,
        workload_type,
        fell_back,
        strategy,
        quantization,
        batching: preset.batching,
        max_num_seqs,
        max_num_batched_tokens,
        gpu_memory_utilization: strategy_profile.gpu_memory_utilization,
        block_size: strategy_profile.block_size,
        flags,
        adjustments,
    })
}
