//! Middle ground between the throughput and latency strategies, tuned per
//! deployment target.
//!
//! The performance model scores both sides and blends them:
//!
//! ```text
//! throughput_score = decode_tok_s / compute_roofline_tok_s      ∈ (0, 1]
//! latency_score    = min(1, reference_itl / itl)                ∈ (0, 1]
//! balance_score    = ½ · throughput_score + ½ · latency_score
//! ```

use super::{
    improvement, BalanceClass, Bottleneck, BatchConfiguration, LatencyPercentiles,
    OptimizationSummary, PerformanceEstimate, Roofline, StrategyKind, StrategyMetrics,
    StrategyProfile,
};
use crate::types::{AllocationPriority, BalanceTarget, WorkloadSpec};

pub const MAX_BATCHED_TOKENS: u64 = 4096;
pub const MIN_BATCHED_TOKENS: u64 = 1024;
pub const BLOCK_SIZE: u64 = 16;

/// Inter-token latency that earns a full latency score.
pub const REFERENCE_ITL_MS: f64 = 50.0;

/// Per target: sequence cap and utilization.
pub const fn target_limits(target: BalanceTarget) -> (u64, f64) {
    match target {
        BalanceTarget::General => (128, 0.85),
        BalanceTarget::WebApi => (64, 0.85),
        BalanceTarget::MultiUser => (192, 0.88),
        BalanceTarget::CostOptimized => (160, 0.90),
        BalanceTarget::Production => (32, 0.80),
    }
}

pub(super) fn profile(workload: &WorkloadSpec) -> StrategyProfile {
    let target = workload.balance_target;
    let (max_seqs_cap, gpu_memory_utilization) = target_limits(target);
    let chunked_prefill = workload.max_seq_len > MAX_BATCHED_TOKENS
        || matches!(target, BalanceTarget::WebApi | BalanceTarget::MultiUser);

    StrategyProfile {
        kind: StrategyKind::Balanced,
        target: target.key(),
        max_seqs_cap,
        max_tokens_cap: MAX_BATCHED_TOKENS,
        min_tokens: MIN_BATCHED_TOKENS,
        gpu_memory_utilization,
        kv_budget_share: 0.95,
        block_size: BLOCK_SIZE,
        priority: match target {
            BalanceTarget::Production => AllocationPriority::Conservative,
            _ => AllocationPriority::Balanced,
        },
        chunked_prefill,
        prefix_caching: !matches!(target, BalanceTarget::CostOptimized),
        // production keeps stats for monitoring
        disable_log_stats: !matches!(target, BalanceTarget::Production),
        preemption_mode: None,
    }
}

pub(super) fn estimate(
    roofline: &Roofline,
    batch: &BatchConfiguration,
    workload: &WorkloadSpec,
) -> PerformanceEstimate {
    let seqs = batch.max_num_seqs;
    let (decode_tok_s, compute_bound) = roofline.decode_tok_s(seqs);
    let itl_ms = roofline.inter_token_ms(seqs);
    let ttft_ms = roofline.time_to_first_token_ms(workload.avg_input_len);
    let p50_ms = ttft_ms + itl_ms * workload.avg_output_len as f64;

    let throughput_score = (decode_tok_s / roofline.compute_tok_s).clamp(0.0, 1.0);
    let latency_score = (REFERENCE_ITL_MS / itl_ms).clamp(0.0, 1.0);
    let balance_score = 0.5 * throughput_score + 0.5 * latency_score;

    let mut bottlenecks = Vec::new();
    if compute_bound {
        bottlenecks.push(Bottleneck::Compute);
    } else {
        bottlenecks.push(Bottleneck::MemoryBandwidth);
    }
    if latency_score < throughput_score {
        bottlenecks.push(Bottleneck::Concurrency);
    }

    PerformanceEstimate {
        tokens_per_second: decode_tok_s,
        requests_per_second: seqs as f64 / (p50_ms / 1000.0),
        latency: LatencyPercentiles::scaled(p50_ms, 1.4, 1.8),
        bottlenecks,
        detail: StrategyMetrics::Balanced {
            balance_score,
            throughput_score,
            latency_score,
            class: BalanceClass::from_score(balance_score),
        },
    }
}

pub(super) fn summary(profile: &StrategyProfile, batch: &BatchConfiguration) -> OptimizationSummary {
    let mut primary_optimizations = vec![
        format!(
            "{} concurrent sequences tuned for {}",
            batch.max_num_seqs, profile.target
        ),
        format!(
            "{:.0}% GPU memory utilization",
            profile.gpu_memory_utilization * 100.0
        ),
    ];
    if profile.chunked_prefill {
        primary_optimizations.push("Chunked prefill keeps decode steps responsive".to_string());
    }
    if profile.prefix_caching {
        primary_optimizations.push("Prefix caching for repeated system prompts".to_string());
    }

    let (throughput_gain, latency_gain) = match profile.target {
        "cost-optimized" | "multi-user" => ("+30%", "+5%"),
        "production" => ("+10%", "-10%"),
        _ => ("+20%", "-15%"),
    };

    OptimizationSummary {
        primary_optimizations,
        tradeoffs: vec![
            "Neither peak throughput nor minimum latency".to_string(),
            "Moderate memory headroom for bursts".to_string(),
        ],
        expected_improvements: vec![
            improvement("throughput", throughput_gain),
            improvement("p95 latency", latency_gain),
        ],
    }
}
