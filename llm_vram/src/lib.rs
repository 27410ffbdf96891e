//! llm_vram – GPU memory estimation and vLLM deployment planning
//! =============================================================
//!
//! ## Memory accounting
//! - **Per-category breakdown** – Weights, KV cache, activations, system overhead, fragmentation, swap and reserve with [`breakdown`].
//! - **Quantization aware** – Eight formats from fp32 to int4 in one immutable catalog, see [`QuantizationFormat`].
//! - **Recommendations** – [`recommend`] picks the least aggressive format that fits; "does not fit" is a value, not an error.
//!
//! ## Deployment planning
//! - **Three strategies** – Throughput, latency and balanced, sharing one sizing skeleton ([`StrategyKind`]).
//! - **Server commands** – [`optimized_config`] emits a validated `vllm` command line.
//! - **Comparison** – [`compare_strategies`] runs all three and recommends one for the workload.
//!
//! ## CLI
//! - **`llm-vram-cli`** – Breakdowns, quantization advice and deployment commands from flags or a JSON request.
//!
//! ---
//!
//! ```rust
//! use llm_vram::*;
//!
//! fn main() -> VramResult<()> {
//!     let report = breakdown(
//!         &BreakdownConfig::builder()
//!             .total_vram_gb(80.0)
//!             .num_params(13.0)
//!             .batch_size(32)
//!             .build(),
//!     )?;
//!     assert!(report.compatibility.supports_model);
//!
//!     let request: RawOptimizationParams = serde_json::from_value(serde_json::json!({
//!         "gpu_specs": { "total_vram_gb": 80 },
//!         "model_specs": { "num_params": 7, "model_path": "meta-llama/Llama-2-7b-hf" },
//!         "workload_specs": { "workload_type": "chat" }
//!     }))
//!     .map_err(|e| VramError::validation("request", e.to_string()))?;
//!
//!     let config = StrategyKind::Latency.optimized_config(&request)?;
//!     println!("{}", config.command);
//!     Ok(())
//! }
//! ```
//!
//! ```sh,no_run
//! cargo run --bin llm-vram-cli -- breakdown --vram 24 --params 7 --quantization awq
//! cargo run --bin llm-vram-cli -- optimize --strategy throughput --vram 80 --params 13
//! cargo run --bin llm-vram-cli -- compare --input request.json --json
//! ```
//!
//! ---
//!
//! ## How It Works
//!
//! ```text
//! ModelSpec + GpuSpec + WorkloadSpec
//!       │
//!       ├─→ architecture    (layers / hidden size / heads from parameter count)
//!       ├─→ memory          (primitives → breakdown → pressure)
//!       ├─→ strategy        (batch sizing → memory allocation → performance)
//!       └─→ deployment      (argument map → command → validation)
//! ```
//!
//! Every entry point is a pure function over plain data. Tunable constants
//! live in [`Calibration`], which can be read from a TOML file.

#[allow(unused_imports)]
use tracing::{debug, error, info, span, trace, warn, Level};

pub mod architecture;
pub mod catalog;
pub mod deployment;
pub mod error;
pub mod logging;
pub mod memory;
pub mod quantization;
pub mod strategy;
pub mod types;
pub mod workload;

pub use architecture::ModelArchitecture;
pub use catalog::{
    detect_quantization, extract_size, is_valid_gpu, is_valid_model, GpuCatalogEntry,
    HubModelMetadata, ModelCatalogEntry,
};
pub use deployment::{
    compare_strategies, normalize, optimized_config, serialize_command, validate, ArgMap,
    ArgValue, DeploymentConfiguration, OptimizationParams, RawOptimizationParams,
    StrategyComparison, StrategyOutcome, ValidationResult,
};
pub use error::{VramError, VramResult};
pub use logging::{i_nln, i_nlns, LoggingConfig, LoggingConfigTrait};
pub use memory::{
    breakdown, kv_cache_memory, weights_memory, BreakdownConfig, Calibration, MemoryBreakdown,
    MemoryPressure, PressureLevel,
};
pub use quantization::{recommend, QuantizationFormat, QuantizationRecommendation, RecommendOptions};
pub use strategy::{
    BatchConfiguration, MemoryAllocationStrategy, PerformanceEstimate, StrategyKind,
    StrategyRequest,
};
pub use types::{
    AllocationPriority, BalanceTarget, GpuSpec, LatencyTier, ModelSpec, WorkloadSpec, WorkloadType,
};
pub use workload::{optimize_for, OptimizationKind, WorkloadOptimization, WorkloadProfile};
