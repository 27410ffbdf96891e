//! Response time first: few sequences, small scheduler steps, chunked prefill.

use super::{
    improvement, Bottleneck, BatchConfiguration, LatencyPercentiles, OptimizationSummary,
    PerformanceEstimate, PreemptionMode, Roofline, StrategyKind, StrategyMetrics, StrategyProfile,
};
use crate::types::{AllocationPriority, LatencyTier, WorkloadSpec};

/// Per tier: sequence cap, token cap, utilization, block size.
pub const fn tier_limits(tier: LatencyTier) -> (u64, u64, f64, u64) {
    match tier {
        LatencyTier::UltraLow => (8, 512, 0.75, 8),
        LatencyTier::Low => (32, 2048, 0.80, 16),
        LatencyTier::Balanced => (64, 4096, 0.85, 16),
    }
}

/// Per tier: time-to-first-token and inter-token targets in milliseconds.
pub const fn tier_targets(tier: LatencyTier) -> (f64, f64) {
    match tier {
        LatencyTier::UltraLow => (100.0, 20.0),
        LatencyTier::Low => (300.0, 50.0),
        LatencyTier::Balanced => (800.0, 100.0),
    }
}

/// Sequences beyond which step sharing dominates the inter-token latency.
const CONCURRENCY_BOTTLENECK_SEQS: u64 = 16;

pub(super) fn profile(workload: &WorkloadSpec) -> StrategyProfile {
    let tier = workload.latency_tier;
    let (max_seqs_cap, max_tokens_cap, gpu_memory_utilization, block_size) = tier_limits(tier);

    StrategyProfile {
        kind: StrategyKind::Latency,
        target: tier.key(),
        max_seqs_cap,
        max_tokens_cap,
        min_tokens: max_tokens_cap / 4,
        gpu_memory_utilization,
        kv_budget_share: 0.9,
        block_size,
        priority: AllocationPriority::Latency,
        chunked_prefill: true,
        prefix_caching: true,
        disable_log_stats: true,
        preemption_mode: Some(PreemptionMode::Recompute),
    }
}

pub(super) fn estimate(
    roofline: &Roofline,
    batch: &BatchConfiguration,
    workload: &WorkloadSpec,
) -> PerformanceEstimate {
    let seqs = batch.max_num_seqs;
    let (ttft_target_ms, itl_target_ms) = tier_targets(workload.latency_tier);

    let ttft_ms = roofline.time_to_first_token_ms(workload.avg_input_len);
    let itl_ms = roofline.inter_token_ms(seqs);
    let p50_ms = ttft_ms + itl_ms * workload.avg_output_len as f64;

    let mut bottlenecks = vec![if itl_ms * workload.avg_output_len as f64 >= ttft_ms {
        Bottleneck::MemoryBandwidth
    } else {
        Bottleneck::Compute
    }];
    if seqs > CONCURRENCY_BOTTLENECK_SEQS {
        bottlenecks.push(Bottleneck::Concurrency);
    }

    PerformanceEstimate {
        tokens_per_second: seqs as f64 * 1000.0 / itl_ms,
        requests_per_second: seqs as f64 / (p50_ms / 1000.0),
        latency: LatencyPercentiles::scaled(p50_ms, 1.25, 1.5),
        bottlenecks,
        detail: StrategyMetrics::Latency {
            time_to_first_token_ms: ttft_ms,
            inter_token_latency_ms: itl_ms,
            ttft_target_ms,
            itl_target_ms,
            meets_target: ttft_ms <= ttft_target_ms && itl_ms <= itl_target_ms,
        },
    }
}

pub(super) fn summary(profile: &StrategyProfile, batch: &BatchConfiguration) -> OptimizationSummary {
    let (ttft_gain, itl_gain) = match profile.target {
        "ultra-low" => ("-50%", "-40%"),
        "low" => ("-30%", "-25%"),
        _ => ("-15%", "-10%"),
    };

    OptimizationSummary {
        primary_optimizations: vec![
            format!("At most {} concurrent sequences", batch.max_num_seqs),
            format!(
                "{}-token scheduler steps with chunked prefill",
                batch.max_num_batched_tokens
            ),
            format!("Block size {} to reduce padding", profile.block_size),
            "Recompute preempted sequences instead of swapping".to_string(),
        ],
        tradeoffs: vec![
            "Lower aggregate throughput".to_string(),
            format!(
                "GPU memory utilization held at {:.0}%",
                profile.gpu_memory_utilization * 100.0
            ),
        ],
        expected_improvements: vec![
            improvement("time to first token", ttft_gain),
            improvement("inter-token latency", itl_gain),
            improvement("throughput", "-20%"),
        ],
    }
}
