use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::{
    architecture::ModelArchitecture,
    error::{ensure_nonzero, ensure_positive, VramError, VramResult},
    memory::{
        calibration::Calibration,
        pressure::MemoryPressure,
        primitives::{
            kv_cache_memory, optimal_swap_space, reserved_memory, system_overhead, weights_memory,
        },
    },
    quantization::QuantizationFormat,
    types::{AllocationPriority, WorkloadType, DEFAULT_MAX_SEQ_LEN},
};

/// Share of the concurrent-sequence ceiling suggested as the batch size.
const RECOMMENDED_BATCH_SHARE: f64 = 0.8;
const MAX_RECOMMENDED_BATCH: u64 = 256;

/// Everything [`breakdown`] needs. Either `model_size_gb` or `num_params` must
/// be set.
#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownConfig {
    #[serde(alias = "totalVRAMGB", alias = "totalVramGb")]
    pub total_vram_gb: f64,

    #[serde(default, alias = "modelSizeGB", alias = "modelSizeGb")]
    pub model_size_gb: Option<f64>,

    /// Parameter count in billions.
    #[serde(default, alias = "numParams")]
    pub num_params: Option<f64>,

    #[builder(default = QuantizationFormat::Fp16)]
    #[serde(default = "default_quantization")]
    pub quantization: QuantizationFormat,

    #[builder(default = 1)]
    #[serde(default = "default_batch_size", alias = "batchSize")]
    pub batch_size: u64,

    #[builder(default = DEFAULT_MAX_SEQ_LEN)]
    #[serde(default = "default_max_seq_len", alias = "maxSeqLen")]
    pub max_seq_len: u64,

    /// Tokens processed per scheduler step; bounds the activation working
    /// set. Defaults to one full-length sequence.
    #[serde(default, alias = "maxNumBatchedTokens")]
    pub max_num_batched_tokens: Option<u64>,

    #[serde(default)]
    pub architecture: Option<ModelArchitecture>,

    /// KV cache element type; follows the weight format's compute precision
    /// when unset.
    #[serde(default, alias = "kvCacheDtype")]
    pub kv_cache_dtype: Option<QuantizationFormat>,

    #[builder(default)]
    #[serde(default)]
    pub priority: AllocationPriority,

    #[builder(default)]
    #[serde(default, alias = "workloadType")]
    pub workload_type: WorkloadType,

    #[builder(default)]
    #[serde(default)]
    pub calibration: Calibration,
}

fn default_quantization() -> QuantizationFormat {
    QuantizationFormat::Fp16
}

fn default_batch_size() -> u64 {
    1
}

fn default_max_seq_len() -> u64 {
    DEFAULT_MAX_SEQ_LEN
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryComponent {
    pub size_gb: f64,
    /// Share of total VRAM.
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryComponents {
    pub model_weights: MemoryComponent,
    pub kv_cache: MemoryComponent,
    pub activations: MemoryComponent,
    pub system_overhead: MemoryComponent,
    pub fragmentation: MemoryComponent,
    pub swap: MemoryComponent,
    pub reserved: MemoryComponent,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemorySummary {
    /// weights + kv cache + activations + system overhead + fragmentation
    pub used_memory: f64,
    /// used + swap + reserved
    pub total_allocated: f64,
    /// VRAM left after allocation, never negative.
    pub available_memory: f64,
    pub utilization_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Compatibility {
    pub supports_model: bool,
    /// VRAM minus total allocation; negative when the model does not fit.
    pub safety_margin_gb: f64,
    pub recommended_batch_size: u64,
    pub max_concurrent_sequences: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryBreakdown {
    pub total_vram_gb: f64,
    pub quantization: QuantizationFormat,
    pub architecture: ModelArchitecture,
    pub components: MemoryComponents,
    pub summary: MemorySummary,
    pub compatibility: Compatibility,
    pub memory_pressure: MemoryPressure,
}

/// Full per-category memory picture for one model on one GPU pool.
pub fn breakdown(config: &BreakdownConfig) -> VramResult<MemoryBreakdown> {
    let total_vram_gb = ensure_positive("total_vram_gb", config.total_vram_gb)?;
    let batch_size = ensure_nonzero("batch_size", config.batch_size)?;
    let max_seq_len = ensure_nonzero("max_seq_len", config.max_seq_len)?;
    let quantization = config.quantization;
    let cal = &config.calibration;

    let (model_weights, num_params_b) = match (config.model_size_gb, config.num_params) {
        (Some(size), params) => {
            let size = ensure_positive("model_size_gb", size)?;
            let params = match params {
                Some(p) => ensure_positive("num_params", p)?,
                None => size / quantization.bytes_per_param(),
            };
            (size, params)
        }
        (None, Some(params)) => (weights_memory(params, quantization)?, params),
        (None, None) => {
            return Err(VramError::validation(
                "model",
                "either model_size_gb or num_params is required",
            ))
        }
    };

    let architecture = match config.architecture {
        Some(arch) => {
            arch.validate()?;
            arch
        }
        None => crate::architecture::estimate(num_params_b)?,
    };

    let compute_precision = quantization.compute_precision();
    let kv_precision = config.kv_cache_dtype.unwrap_or(compute_precision);

    let kv_cache = kv_cache_memory(
        batch_size,
        max_seq_len,
        architecture.layers,
        architecture.hidden_size,
        architecture.num_heads,
        kv_precision,
    )?;

    let token_budget = match config.max_num_batched_tokens {
        Some(tokens) => ensure_nonzero("max_num_batched_tokens", tokens)?,
        None => max_seq_len,
    };
    let step_tokens = batch_size.saturating_mul(max_seq_len).min(token_budget);
    let activations = cal.activation_memory(
        1,
        step_tokens,
        architecture.hidden_size,
        architecture.layers,
        compute_precision,
    )?;

    let system = system_overhead(model_weights, batch_size)?;
    let fragmentation =
        cal.fragmentation(total_vram_gb, batch_size, max_seq_len, Some(quantization))?;
    let swap = optimal_swap_space(
        total_vram_gb,
        model_weights,
        config.priority,
        config.workload_type,
    )?;
    let reserved = reserved_memory(total_vram_gb, config.priority)?;

    let used_memory = model_weights + kv_cache + activations + system + fragmentation;
    let total_allocated = used_memory + swap + reserved;
    let utilization_percent = total_allocated / total_vram_gb * 100.0;
    let supports_model = total_allocated <= total_vram_gb;

    // Room left for KV once every non-KV allocation is placed.
    let per_sequence_kv = kv_cache / batch_size as f64;
    let kv_room = total_vram_gb - (total_allocated - kv_cache);
    let max_concurrent_sequences = if kv_room > 0.0 {
        (kv_room / per_sequence_kv).floor() as u64
    } else {
        0
    };
    let recommended_batch_size = if max_concurrent_sequences == 0 {
        0
    } else {
        ((max_concurrent_sequences as f64 * RECOMMENDED_BATCH_SHARE).floor() as u64)
            .clamp(1, MAX_RECOMMENDED_BATCH)
    };

    let component = |size_gb: f64| MemoryComponent {
        size_gb,
        percentage: size_gb / total_vram_gb * 100.0,
    };

    let result = MemoryBreakdown {
        total_vram_gb,
        quantization,
        architecture,
        components: MemoryComponents {
            model_weights: component(model_weights),
            kv_cache: component(kv_cache),
            activations: component(activations),
            system_overhead: component(system),
            fragmentation: component(fragmentation),
            swap: component(swap),
            reserved: component(reserved),
        },
        summary: MemorySummary {
            used_memory,
            total_allocated,
            available_memory: (total_vram_gb - total_allocated).max(0.0),
            utilization_percent,
        },
        compatibility: Compatibility {
            supports_model,
            safety_margin_gb: total_vram_gb - total_allocated,
            recommended_batch_size,
            max_concurrent_sequences,
        },
        memory_pressure: MemoryPressure::classify(utilization_percent),
    };

    tracing::debug!(
        total_vram_gb,
        total_allocated,
        utilization_percent,
        supports_model,
        pressure = result.memory_pressure.level.as_str(),
        "memory breakdown"
    );
    Ok(result)
}

impl std::fmt::Display for MemoryBreakdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let c = &self.components;
        writeln!(f)?;
        writeln!(
            f,
            "MemoryBreakdown ({:.1} GB VRAM, {}):",
            self.total_vram_gb, self.quantization
        )?;
        let rows = [
            ("Model weights", c.model_weights),
            ("KV cache", c.kv_cache),
            ("Activations", c.activations),
            ("System overhead", c.system_overhead),
            ("Fragmentation", c.fragmentation),
            ("Swap", c.swap),
            ("Reserved", c.reserved),
        ];
        for (label, component) in rows {
            crate::i_nln(
                f,
                format_args!(
                    "{label:<16} {:>8.2} GB ({:>5.1}%)",
                    component.size_gb, component.percentage
                ),
            )?;
        }
        crate::i_nlns(
            f,
            &[
                format_args!("Used: {:.2} GB", self.summary.used_memory),
                format_args!("Allocated: {:.2} GB", self.summary.total_allocated),
                format_args!("Utilization: {:.1}%", self.summary.utilization_percent),
                format_args!("Supports model: {}", self.compatibility.supports_model),
                format_args!(
                    "Recommended batch size: {}",
                    self.compatibility.recommended_batch_size
                ),
                format_args!("Memory pressure: {}", self.memory_pressure.level.as_str()),
            ],
        )?;
        Ok(())
    }
}
