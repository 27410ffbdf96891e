//! ## Deployment configuration
//!
//! Turns a request into a ready-to-run server command:
//!
//! ```text
//! raw request ─ normalize ─► typed params ─ strategy ─► batch + memory + estimate
//!                                                         │
//!                         validation ◄─ command ◄─ argument map
//! ```
//!
//! [`optimized_config`] runs this for one strategy; [`compare_strategies`]
//! runs it for all three and picks one.

pub mod command;
pub mod compare;
pub mod normalize;
pub mod validate;

pub use command::{build_args, kebab_case, serialize_command, ArgMap, ArgValue, VLLM_ENTRYPOINT};
pub use compare::{
    compare_strategies, preferred_strategy, select_strategy, StrategyComparison, StrategyOutcome,
};
pub use normalize::{
    normalize, OptimizationParams, RawGpuSpecs, RawModelSpecs, RawOptimizationParams,
    RawWorkloadSpecs,
};
pub use validate::{validate, ValidationResult};

use serde::Serialize;

use crate::{
    error::VramResult,
    memory::Calibration,
    strategy::{
        BatchConfiguration, MemoryAllocationStrategy, OptimizationSummary, PerformanceEstimate,
        StrategyKind,
    },
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentConfiguration {
    pub strategy: StrategyKind,
    pub params: OptimizationParams,
    pub batch: BatchConfiguration,
    pub memory: MemoryAllocationStrategy,
    pub performance: PerformanceEstimate,
    /// Server arguments in command order.
    pub parameters: ArgMap,
    pub command: String,
    pub validation: ValidationResult,
    pub summary: OptimizationSummary,
}

/// Normalizes `params`, sizes the deployment with `strategy` and renders the
/// server command.
pub fn optimized_config(
    strategy: StrategyKind,
    params: &RawOptimizationParams,
    calibration: &Calibration,
) -> VramResult<DeploymentConfiguration> {
    calibration.validate()?;
    let params = normalize(params)?;
    configure(strategy, &params, calibration)
}

impl StrategyKind {
    /// [`optimized_config`] with the default calibration.
    pub fn optimized_config(
        self,
        params: &RawOptimizationParams,
    ) -> VramResult<DeploymentConfiguration> {
        optimized_config(self, params, &Calibration::default())
    }
}

pub(crate) fn configure(
    strategy: StrategyKind,
    params: &OptimizationParams,
    calibration: &Calibration,
) -> VramResult<DeploymentConfiguration> {
    let request = params.strategy_request()?;
    let batch = strategy.optimal_batch_size(&request)?;
    let memory = strategy.memory_strategy(&request)?;
    let performance = strategy.estimate_metrics(&request, &batch, &params.gpu, calibration)?;

    let parameters = build_args(params, &batch, &memory);
    let command = serialize_command(&parameters);
    let validation = validate(&parameters);
    for warning in &validation.warnings {
        tracing::warn!(%strategy, "{warning}");
    }
    let summary = strategy.summary(&strategy.profile(&params.workload), &batch);

    tracing::trace!(%strategy, %command, "generated deployment command");

    Ok(DeploymentConfiguration {
        strategy,
        params: params.clone(),
        batch,
        memory,
        performance,
        parameters,
        command,
        validation,
        summary,
    })
}

impl std::fmt::Display for DeploymentConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        writeln!(f, "DeploymentConfiguration ({} strategy):", self.strategy)?;
        crate::i_nlns(
            f,
            &[
                format_args!("Max sequences: {}", self.batch.max_num_seqs),
                format_args!("Batched tokens: {}", self.batch.max_num_batched_tokens),
                format_args!(
                    "GPU memory utilization: {:.0}%",
                    self.memory.gpu_memory_utilization * 100.0
                ),
                format_args!("KV cache: {:.2} GB", self.memory.kv_cache_allocation_gb),
                format_args!("Swap: {:.2} GB", self.memory.swap_space_gb),
                format_args!("Tokens/s: {:.0}", self.performance.tokens_per_second),
                format_args!("p50 latency: {:.1} ms", self.performance.latency.p50_ms),
                format_args!("Valid: {}", self.validation.is_valid),
            ],
        )?;
        for warning in &self.validation.warnings {
            crate::i_nln(f, format_args!("warning: {warning}"))?;
        }
        for error in &self.validation.errors {
            crate::i_nln(f, format_args!("error: {error}"))?;
        }
        crate::i_nln(f, format_args!("{}", self.batch.reasoning))?;
        crate::i_nln(f, format_args!("{}", self.command))?;
        Ok(())
    }
}
