use serde::Serialize;

use crate::{
    error::VramResult,
    memory::Calibration,
    strategy::StrategyKind,
    types::WorkloadType,
};

use super::{configure, normalize::normalize, DeploymentConfiguration, RawOptimizationParams};

/// One strategy's attempt at the request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyOutcome {
    pub strategy: StrategyKind,
    pub viable: bool,
    /// Why the strategy could not produce a configuration.
    pub error: Option<String>,
    pub config: Option<DeploymentConfiguration>,
    /// KV cache allocation as a share of total VRAM, zero when not viable.
    pub memory_efficiency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyComparison {
    pub results: Vec<StrategyOutcome>,
    pub recommended: Option<StrategyKind>,
    pub reason: String,
}

impl StrategyComparison {
    pub fn outcome(&self, strategy: StrategyKind) -> Option<&StrategyOutcome> {
        self.results.iter().find(|o| o.strategy == strategy)
    }

    pub fn recommended_config(&self) -> Option<&DeploymentConfiguration> {
        self.recommended
            .and_then(|kind| self.outcome(kind))
            .and_then(|o| o.config.as_ref())
    }
}

/// The strategy a workload naturally calls for.
pub fn preferred_strategy(workload_type: WorkloadType) -> StrategyKind {
    match workload_type {
        WorkloadType::Batch => StrategyKind::Throughput,
        WorkloadType::Chat
        | WorkloadType::Interactive
        | WorkloadType::Realtime
        | WorkloadType::Streaming => StrategyKind::Latency,
        _ => StrategyKind::Balanced,
    }
}

/// Picks the workload's preferred strategy when it is viable, otherwise the
/// viable one with the largest KV cache share of VRAM.
pub fn select_strategy(
    results: &[StrategyOutcome],
    workload_type: WorkloadType,
) -> (Option<StrategyKind>, String) {
    let preferred = preferred_strategy(workload_type);
    if results.iter().any(|o| o.strategy == preferred && o.viable) {
        return (
            Some(preferred),
            format!("{preferred} suits the {workload_type} workload"),
        );
    }
    let best = results
        .iter()
        .filter(|o| o.viable)
        .max_by(|a, b| a.memory_efficiency.total_cmp(&b.memory_efficiency));
    match best {
        Some(best) => (
            Some(best.strategy),
            format!(
                "{preferred} is not viable; {} leaves the most memory for the KV cache ({:.0}% of VRAM)",
                best.strategy,
                best.memory_efficiency * 100.0
            ),
        ),
        None => (
            None,
            "no strategy can fit the model on this GPU configuration".to_string(),
        ),
    }
}

/// Runs every strategy against the same request and picks one.
///
/// Malformed input fails the whole comparison. A strategy that cannot size
/// the deployment is reported as not viable instead.
pub fn compare_strategies(
    params: &RawOptimizationParams,
    calibration: &Calibration,
) -> VramResult<StrategyComparison> {
    let params = normalize(params)?;

    let results: Vec<StrategyOutcome> = StrategyKind::ALL
        .into_iter()
        .map(|strategy| match configure(strategy, &params, calibration) {
            Ok(config) => StrategyOutcome {
                strategy,
                viable: true,
                error: None,
                memory_efficiency: config.memory.kv_cache_allocation_gb / params.gpu.total_vram_gb,
                config: Some(config),
            },
            Err(e) => {
                tracing::debug!(%strategy, error = %e, "strategy not viable");
                StrategyOutcome {
                    strategy,
                    viable: false,
                    error: Some(e.to_string()),
                    config: None,
                    memory_efficiency: 0.0,
                }
            }
        })
        .collect();

    let (recommended, reason) = select_strategy(&results, params.workload.workload_type);
    tracing::debug!(?recommended, %reason, "compared strategies");

    Ok(StrategyComparison {
        results,
        recommended,
        reason,
    })
}
