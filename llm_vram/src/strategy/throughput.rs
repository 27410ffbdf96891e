//! Tokens-per-second first: large batches, big blocks, high utilization.
//!
//! Decode is modelled as bandwidth-bound (every step streams the weights once
//! and serves every running sequence) until it reaches the compute roofline.
//! Prefill is compute-bound.

use super::{
    improvement, Bottleneck, BatchConfiguration, LatencyPercentiles, OptimizationSummary,
    PerformanceEstimate, PreemptionMode, Roofline, StrategyKind, StrategyMetrics, StrategyProfile,
};
use crate::types::{AllocationPriority, WorkloadSpec, WorkloadType};

pub const MAX_SEQS: u64 = 256;
pub const MAX_BATCHED_TOKENS: u64 = 8192;
pub const MIN_BATCHED_TOKENS: u64 = 2048;
pub const BLOCK_SIZE: u64 = 32;

pub(super) fn profile(workload: &WorkloadSpec) -> StrategyProfile {
    let batch = workload.workload_type.is_batch();
    let (target, gpu_memory_utilization) = match workload.workload_type {
        WorkloadType::Batch => ("batch", 0.95),
        WorkloadType::Mixed => ("mixed", 0.85),
        _ => ("serving", 0.90),
    };

    StrategyProfile {
        kind: StrategyKind::Throughput,
        target,
        max_seqs_cap: MAX_SEQS,
        max_tokens_cap: MAX_BATCHED_TOKENS,
        min_tokens: MIN_BATCHED_TOKENS,
        gpu_memory_utilization,
        kv_budget_share: 1.0,
        block_size: BLOCK_SIZE,
        priority: AllocationPriority::Throughput,
        chunked_prefill: workload.max_seq_len > MAX_BATCHED_TOKENS,
        prefix_caching: !batch,
        disable_log_stats: true,
        preemption_mode: batch.then_some(PreemptionMode::Swap),
    }
}

pub(super) fn estimate(
    roofline: &Roofline,
    profile: &StrategyProfile,
    batch: &BatchConfiguration,
    workload: &WorkloadSpec,
) -> PerformanceEstimate {
    let seqs = batch.max_num_seqs;
    let (decode_tok_s, compute_bound) = roofline.decode_tok_s(seqs);
    let prefill_tok_s = roofline.compute_tok_s;
    let per_sequence_tok_s = decode_tok_s / seqs as f64;

    let request_s = workload.avg_input_len as f64 / prefill_tok_s
        + workload.avg_output_len as f64 / per_sequence_tok_s;

    let mut bottlenecks = vec![if compute_bound {
        Bottleneck::Compute
    } else {
        Bottleneck::MemoryBandwidth
    }];
    if batch.memory_bound_seqs < profile.max_seqs_cap {
        bottlenecks.push(Bottleneck::KvCacheCapacity);
    }

    PerformanceEstimate {
        tokens_per_second: decode_tok_s,
        requests_per_second: seqs as f64 / request_s,
        latency: LatencyPercentiles::scaled(request_s * 1000.0, 1.5, 2.0),
        bottlenecks,
        detail: StrategyMetrics::Throughput {
            decode_tokens_per_second: decode_tok_s,
            prefill_tokens_per_second: prefill_tok_s,
            per_sequence_tokens_per_second: per_sequence_tok_s,
            concurrent_sequences: seqs,
        },
    }
}

pub(super) fn summary(profile: &StrategyProfile, batch: &BatchConfiguration) -> OptimizationSummary {
    let mut primary_optimizations = vec![
        format!("Up to {} concurrent sequences", batch.max_num_seqs),
        format!(
            "{} batched tokens per scheduler step",
            batch.max_num_batched_tokens
        ),
        format!(
            "{:.0}% GPU memory utilization",
            profile.gpu_memory_utilization * 100.0
        ),
        format!("Block size {} for fewer block-table lookups", profile.block_size),
    ];
    if profile.prefix_caching {
        primary_optimizations.push("Prefix caching for shared prompts".to_string());
    }
    if profile.preemption_mode == Some(PreemptionMode::Swap) {
        primary_optimizations.push("Swap preempted sequences to CPU memory".to_string());
    }

    let throughput_gain = if batch.max_num_seqs >= 128 {
        "+60%"
    } else if batch.max_num_seqs >= 32 {
        "+40%"
    } else {
        "+20%"
    };

    OptimizationSummary {
        primary_optimizations,
        tradeoffs: vec![
            "Higher per-request latency under full load".to_string(),
            "Less memory headroom for traffic spikes".to_string(),
        ],
        expected_improvements: vec![
            improvement("throughput", throughput_gain),
            improvement("gpu utilization", "+15%"),
            improvement("p95 latency", "+25%"),
        ],
    }
}
