use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::{
    architecture::ModelArchitecture,
    error::{ensure_positive, VramError, VramResult},
    quantization::QuantizationFormat,
    types::{AllocationPriority, WorkloadSpec},
};

/// The three optimization goals a deployment can be tuned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Throughput,
    Latency,
    Balanced,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [Self::Throughput, Self::Latency, Self::Balanced];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Throughput => "throughput",
            Self::Latency => "latency",
            Self::Balanced => "balanced",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = VramError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "throughput" => Ok(Self::Throughput),
            "latency" => Ok(Self::Latency),
            "balanced" | "balance" => Ok(Self::Balanced),
            other => Err(VramError::validation(
                "strategy",
                format!("unknown strategy '{other}', expected throughput, latency or balanced"),
            )),
        }
    }
}

/// `--preemption-mode` values understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreemptionMode {
    Recompute,
    Swap,
}

impl PreemptionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recompute => "recompute",
            Self::Swap => "swap",
        }
    }
}

/// The knobs that distinguish one strategy from another. Every strategy runs
/// the same sizing skeleton over its own profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StrategyProfile {
    pub kind: StrategyKind,
    /// Workload, latency tier or balance target the profile was picked for.
    pub target: &'static str,
    pub max_seqs_cap: u64,
    pub max_tokens_cap: u64,
    pub min_tokens: u64,
    pub gpu_memory_utilization: f64,
    /// Share of the post-weight budget handed to the KV cache.
    pub kv_budget_share: f64,
    pub block_size: u64,
    pub priority: AllocationPriority,
    pub chunked_prefill: bool,
    pub prefix_caching: bool,
    pub disable_log_stats: bool,
    pub preemption_mode: Option<PreemptionMode>,
}

/// Resolved inputs shared by every strategy step.
///
/// Built by the deployment normalizer, or directly by callers that already
/// know the model footprint and shape.
#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRequest {
    #[serde(alias = "totalVRAMGB", alias = "totalVramGb")]
    pub total_vram_gb: f64,

    /// Memory the batch sizing may plan with. Defaults to the total VRAM.
    #[serde(default, alias = "availableMemoryGB", alias = "availableMemoryGb")]
    pub available_memory_gb: Option<f64>,

    #[serde(alias = "modelSizeGB", alias = "modelMemoryGB", alias = "model_memory_gb")]
    pub model_size_gb: f64,

    /// Parameter count in billions.
    #[serde(alias = "numParams")]
    pub num_params_b: f64,

    pub architecture: ModelArchitecture,

    #[builder(default = QuantizationFormat::Fp16)]
    #[serde(default = "default_quantization")]
    pub quantization: QuantizationFormat,

    #[serde(default, alias = "kvCacheDtype")]
    pub kv_cache_dtype: Option<QuantizationFormat>,

    #[builder(default)]
    #[serde(default)]
    pub workload: WorkloadSpec,
}

fn default_quantization() -> QuantizationFormat {
    QuantizationFormat::Fp16
}

impl StrategyRequest {
    pub fn available_memory_gb(&self) -> f64 {
        self.available_memory_gb.unwrap_or(self.total_vram_gb)
    }

    pub fn kv_precision(&self) -> QuantizationFormat {
        self.kv_cache_dtype
            .unwrap_or_else(|| self.quantization.compute_precision())
    }

    pub fn validate(&self) -> VramResult<()> {
        ensure_positive("total_vram_gb", self.total_vram_gb)?;
        ensure_positive("available_memory_gb", self.available_memory_gb())?;
        ensure_positive("model_size_gb", self.model_size_gb)?;
        ensure_positive("num_params", self.num_params_b)?;
        self.architecture.validate()?;
        self.workload.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchConfiguration {
    pub max_num_seqs: u64,
    pub max_num_batched_tokens: u64,
    pub memory_utilization: f64,
    pub strategy: StrategyKind,
    /// Selector the configuration was tuned for, e.g. `serving` or `low`.
    pub target: String,
    /// Sequences the KV budget alone would allow, before the profile cap.
    pub memory_bound_seqs: u64,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryAllocationStrategy {
    pub gpu_memory_utilization: f64,
    pub swap_space_gb: f64,
    pub kv_cache_allocation_gb: f64,
    pub recommended_block_size: u64,
    pub chunked_prefill: bool,
    pub prefix_caching: bool,
    /// Skip CUDA graph capture when headroom is too thin to hold the graphs.
    pub enforce_eager: bool,
    pub disable_log_stats: bool,
    pub preemption_mode: Option<PreemptionMode>,
    pub priority: AllocationPriority,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencyPercentiles {
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl LatencyPercentiles {
    pub(crate) fn scaled(p50_ms: f64, p95_factor: f64, p99_factor: f64) -> Self {
        Self {
            p50_ms,
            p95_ms: p50_ms * p95_factor,
            p99_ms: p50_ms * p99_factor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Bottleneck {
    MemoryBandwidth,
    Compute,
    KvCacheCapacity,
    Concurrency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceClass {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl BalanceClass {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::Excellent
        } else if score >= 0.6 {
            Self::Good
        } else if score >= 0.4 {
            Self::Fair
        } else {
            Self::Poor
        }
    }
}

/// Figures only one of the performance models produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum StrategyMetrics {
    Throughput {
        decode_tokens_per_second: f64,
        prefill_tokens_per_second: f64,
        per_sequence_tokens_per_second: f64,
        concurrent_sequences: u64,
    },
    Latency {
        time_to_first_token_ms: f64,
        inter_token_latency_ms: f64,
        ttft_target_ms: f64,
        itl_target_ms: f64,
        meets_target: bool,
    },
    Balanced {
        balance_score: f64,
        throughput_score: f64,
        latency_score: f64,
        class: BalanceClass,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceEstimate {
    pub tokens_per_second: f64,
    pub requests_per_second: f64,
    pub latency: LatencyPercentiles,
    pub bottlenecks: Vec<Bottleneck>,
    pub detail: StrategyMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_kind_parses_and_prints() {
        assert_eq!("Throughput".parse::<StrategyKind>().unwrap(), StrategyKind::Throughput);
        assert_eq!("balance".parse::<StrategyKind>().unwrap(), StrategyKind::Balanced);
        assert!("fastest".parse::<StrategyKind>().is_err());
        assert_eq!(StrategyKind::Latency.to_string(), "latency");
    }

    #[test]
    fn balance_classes() {
        assert_eq!(BalanceClass::from_score(0.95), BalanceClass::Excellent);
        assert_eq!(BalanceClass::from_score(0.8), BalanceClass::Excellent);
        assert_eq!(BalanceClass::from_score(0.6), BalanceClass::Good);
        assert_eq!(BalanceClass::from_score(0.45), BalanceClass::Fair);
        assert_eq!(BalanceClass::from_score(0.1), BalanceClass::Poor);
    }

    #[test]
    fn kv_precision_follows_compute_precision() {
        let arch = crate::architecture::estimate(7.0).unwrap();
        let req = StrategyRequest::builder()
            .total_vram_gb(24.0)
            .model_size_gb(3.85)
            .num_params_b(7.0)
            .architecture(arch)
            .quantization(QuantizationFormat::Awq)
            .build();
        assert_eq!(req.kv_precision(), QuantizationFormat::Fp16);
        assert_eq!(req.available_memory_gb(), 24.0);

        let fp8_kv = StrategyRequest {
            kv_cache_dtype: Some(QuantizationFormat::Fp8),
            ..req
        };
        assert_eq!(fp8_kv.kv_precision(), QuantizationFormat::Fp8);
    }
}
