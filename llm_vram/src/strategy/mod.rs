//! ## Optimization strategies
//!
//! Three ways to turn a model, a GPU pool and a workload into a batch
//! configuration: maximize tokens per second, minimize per-request latency, or
//! balance the two. All three share one sizing skeleton driven by a
//! [`StrategyProfile`]; only their performance models differ.
//!
//! ```text
//! kv_budget      = max(0, available · util − model) · kv_share
//! per_seq_kv     = kv_cache(1, max_seq_len, …)
//! max_num_seqs   = max(1, min(⌊kv_budget / per_seq_kv⌋, seq_cap))
//! batched_tokens = clamp(max_num_seqs · avg_input, token_floor, token_cap)
//!                  (raised to max_seq_len unless chunked prefill is on)
//! ```
//!
//! With the default selectors the caps, utilizations and KV shares are
//! ordered latency ≤ balanced ≤ throughput, so the resulting sequence counts
//! and utilizations are ordered the same way.

pub mod balanced;
pub mod latency;
pub mod throughput;
pub mod types;

pub use types::*;

use crate::{
    error::{ensure_positive, VramError, VramResult},
    memory::{kv_cache_memory, optimal_swap_space, system_overhead, Calibration},
    types::{GpuSpec, WorkloadSpec},
};

/// Below this share of free VRAM after weights, CUDA graphs are skipped.
pub const EAGER_HEADROOM_SHARE: f64 = 0.2;

impl StrategyKind {
    pub fn profile(self, workload: &WorkloadSpec) -> StrategyProfile {
        match self {
            Self::Throughput => throughput::profile(workload),
            Self::Latency => latency::profile(workload),
            Self::Balanced => balanced::profile(workload),
        }
    }

    /// Sequence and token budget for one scheduler step.
    ///
    /// Fails with a configuration error when the weights alone fill the
    /// available memory.
    pub fn optimal_batch_size(self, request: &StrategyRequest) -> VramResult<BatchConfiguration> {
        let available = ensure_positive("available_memory_gb", request.available_memory_gb())?;
        let model = ensure_positive("model_memory_gb", request.model_size_gb)?;
        if available <= model {
            return Err(VramError::configuration(format!(
                "available memory ({available:.2} GB) must exceed model memory ({model:.2} GB)"
            )));
        }
        request.workload.validate()?;
        request.architecture.validate()?;

        let profile = self.profile(&request.workload);
        let arch = request.architecture;
        let per_seq_kv = kv_cache_memory(
            1,
            request.workload.max_seq_len,
            arch.layers,
            arch.hidden_size,
            arch.num_heads,
            request.kv_precision(),
        )?;
        let kv_budget =
            (available * profile.gpu_memory_utilization - model).max(0.0) * profile.kv_budget_share;
        let memory_bound_seqs = (kv_budget / per_seq_kv).floor() as u64;
        let max_num_seqs = memory_bound_seqs.min(profile.max_seqs_cap).max(1);
        let max_num_batched_tokens = profile.token_budget(max_num_seqs, &request.workload);

        let limit = if memory_bound_seqs < profile.max_seqs_cap {
            format!(
                "KV budget of {kv_budget:.1} GB holds {memory_bound_seqs} sequences of {} tokens",
                request.workload.max_seq_len
            )
        } else {
            format!("capped at {} sequences for the {} profile", profile.max_seqs_cap, profile.target)
        };
        let reasoning = format!(
            "{} strategy ({}): {max_num_seqs} concurrent sequences, {max_num_batched_tokens} tokens per step at {:.0}% GPU memory; {limit}",
            self,
            profile.target,
            profile.gpu_memory_utilization * 100.0,
        );

        tracing::debug!(
            strategy = %self,
            target = profile.target,
            max_num_seqs,
            max_num_batched_tokens,
            memory_bound_seqs,
            "sized batch"
        );

        Ok(BatchConfiguration {
            max_num_seqs,
            max_num_batched_tokens,
            memory_utilization: profile.gpu_memory_utilization,
            strategy: self,
            target: profile.target.to_string(),
            memory_bound_seqs,
            reasoning,
        })
    }

    /// Utilization, swap and KV allocation for the whole pool.
    pub fn memory_strategy(self, request: &StrategyRequest) -> VramResult<MemoryAllocationStrategy> {
        let total = ensure_positive("total_vram_gb", request.total_vram_gb)?;
        let model = ensure_positive("model_size_gb", request.model_size_gb)?;
        if total <= model {
            return Err(VramError::configuration(format!(
                "total VRAM ({total:.2} GB) must exceed model size ({model:.2} GB)"
            )));
        }

        let profile = self.profile(&request.workload);
        let swap_space_gb =
            optimal_swap_space(total, model, profile.priority, request.workload.workload_type)?;
        let overhead = system_overhead(model, 1)?;
        let kv_cache_allocation_gb =
            (total * profile.gpu_memory_utilization - model - overhead).max(0.0);
        let enforce_eager = (total - model) / total < EAGER_HEADROOM_SHARE;
        if enforce_eager {
            tracing::debug!(total, model, "thin headroom, disabling CUDA graphs");
        }

        Ok(MemoryAllocationStrategy {
            gpu_memory_utilization: profile.gpu_memory_utilization,
            swap_space_gb,
            kv_cache_allocation_gb,
            recommended_block_size: profile.block_size,
            chunked_prefill: profile.chunked_prefill,
            prefix_caching: profile.prefix_caching,
            enforce_eager,
            disable_log_stats: profile.disable_log_stats,
            preemption_mode: profile.preemption_mode,
            priority: profile.priority,
        })
    }

    /// Expected speed of `batch` on `gpu`, using this strategy's model.
    pub fn estimate_metrics(
        self,
        request: &StrategyRequest,
        batch: &BatchConfiguration,
        gpu: &GpuSpec,
        calibration: &Calibration,
    ) -> VramResult<PerformanceEstimate> {
        let roofline = Roofline::new(request, gpu, calibration)?;
        let profile = self.profile(&request.workload);
        let estimate = match self {
            Self::Throughput => throughput::estimate(&roofline, &profile, batch, &request.workload),
            Self::Latency => latency::estimate(&roofline, batch, &request.workload),
            Self::Balanced => balanced::estimate(&roofline, batch, &request.workload),
        };
        tracing::debug!(
            strategy = %self,
            tokens_per_second = estimate.tokens_per_second,
            p50_ms = estimate.latency.p50_ms,
            "estimated performance"
        );
        Ok(estimate)
    }

    pub fn summary(self, profile: &StrategyProfile, batch: &BatchConfiguration) -> OptimizationSummary {
        match self {
            Self::Throughput => throughput::summary(profile, batch),
            Self::Latency => latency::summary(profile, batch),
            Self::Balanced => balanced::summary(profile, batch),
        }
    }
}

impl StrategyProfile {
    pub fn token_budget(&self, max_num_seqs: u64, workload: &WorkloadSpec) -> u64 {
        let wanted = max_num_seqs.saturating_mul(workload.avg_input_len);
        let budget = wanted.clamp(self.min_tokens, self.max_tokens_cap);
        if self.chunked_prefill {
            budget
        } else {
            // without chunked prefill one step must hold a whole prompt
            budget.max(workload.max_seq_len)
        }
    }
}

/// Hardware ceilings shared by the performance models.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Roofline {
    /// Decode speed of one sequence when weight reads dominate.
    pub decode_per_seq_tok_s: f64,
    /// Token rate the pool's arithmetic allows, prefill or decode.
    pub compute_tok_s: f64,
    /// Time to stream the weights once, in milliseconds.
    pub weight_read_ms: f64,
}

impl Roofline {
    pub(crate) fn new(
        request: &StrategyRequest,
        gpu: &GpuSpec,
        calibration: &Calibration,
    ) -> VramResult<Self> {
        gpu.validate()?;
        let model_gb = ensure_positive("model_size_gb", request.model_size_gb)?;
        let params_b = ensure_positive("num_params", request.num_params_b)?;

        let bandwidth = gpu.total_bandwidth_gbps() * calibration.bandwidth_efficiency;
        let tflops = calibration.effective_tflops(gpu.base_fp16_tflops(), gpu.tensor_cores)
            * gpu.gpu_count as f64
            * calibration.compute_efficiency;

        Ok(Self {
            decode_per_seq_tok_s: bandwidth / model_gb,
            compute_tok_s: tflops * 1e12 / (2.0 * params_b * 1e9),
            weight_read_ms: model_gb / bandwidth * 1000.0,
        })
    }

    /// Aggregate decode rate for `seqs` sequences and whether compute, not
    /// bandwidth, is the limit.
    pub(crate) fn decode_tok_s(&self, seqs: u64) -> (f64, bool) {
        let bandwidth_bound = self.decode_per_seq_tok_s * seqs as f64;
        if bandwidth_bound > self.compute_tok_s {
            (self.compute_tok_s, true)
        } else {
            (bandwidth_bound, false)
        }
    }

    /// Inter-token latency with `seqs` sequences sharing each step.
    pub(crate) fn inter_token_ms(&self, seqs: u64) -> f64 {
        self.weight_read_ms * (1.0 + CONCURRENCY_PENALTY * (seqs.saturating_sub(1)) as f64)
    }

    pub(crate) fn time_to_first_token_ms(&self, input_tokens: u64) -> f64 {
        input_tokens as f64 / self.compute_tok_s * 1000.0
    }
}

/// Inter-token slowdown per extra sequence in the step.
pub const CONCURRENCY_PENALTY: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ExpectedImprovement {
    pub metric: String,
    /// Signed percentage such as `"+40%"`.
    pub change: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize)]
pub struct OptimizationSummary {
    pub primary_optimizations: Vec<String>,
    pub tradeoffs: Vec<String>,
    pub expected_improvements: Vec<ExpectedImprovement>,
}

pub(crate) fn improvement(metric: &str, change: &str) -> ExpectedImprovement {
    ExpectedImprovement {
        metric: metric.to_string(),
        change: change.to_string(),
    }
}
