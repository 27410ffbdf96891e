use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ensure_nonzero, ensure_positive, VramResult},
    memory::{kv_cache_memory, system_overhead, weights_memory, Calibration},
    quantization::QuantizationFormat,
    types::DEFAULT_MAX_SEQ_LEN,
};

/// Formats tried in order, least aggressive first.
pub const RECOMMENDATION_PRIORITY: [QuantizationFormat; 5] = [
    QuantizationFormat::Fp16,
    QuantizationFormat::Awq,
    QuantizationFormat::Gptq,
    QuantizationFormat::Int8,
    QuantizationFormat::Int4,
];

/// Share of VRAM a recommendation may plan to use.
pub const USABLE_VRAM_SHARE: f64 = 0.9;

#[derive(Builder, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecommendOptions {
    #[builder(default = 1)]
    #[serde(default = "default_batch_size", alias = "batchSize")]
    pub batch_size: u64,

    #[builder(default = DEFAULT_MAX_SEQ_LEN)]
    #[serde(default = "default_max_seq_len", alias = "maxSeqLen")]
    pub max_seq_len: u64,
}

fn default_batch_size() -> u64 {
    1
}

fn default_max_seq_len() -> u64 {
    DEFAULT_MAX_SEQ_LEN
}

impl Default for RecommendOptions {
    fn default() -> Self {
        RecommendOptions::builder().build()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FormatFit {
    pub format: QuantizationFormat,
    pub total_memory_gb: f64,
    pub fits: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuantizationRecommendation {
    pub format: QuantizationFormat,
    pub can_fit: bool,
    pub total_memory_gb: f64,
    pub usable_vram_gb: f64,
    pub utilization_percent: f64,
    pub reason: String,
    /// Every format tried, in priority order.
    pub evaluated: Vec<FormatFit>,
}

/// Picks the least aggressive format that fits in 90% of `vram_gb`.
///
/// "Nothing fits" is a normal outcome reported through `can_fit`; only
/// malformed input is an error.
pub fn recommend(
    vram_gb: f64,
    model_params_b: f64,
    options: RecommendOptions,
) -> VramResult<QuantizationRecommendation> {
    let vram_gb = ensure_positive("vram_gb", vram_gb)?;
    let model_params_b = ensure_positive("model_params_b", model_params_b)?;
    ensure_nonzero("batch_size", options.batch_size)?;
    ensure_nonzero("max_seq_len", options.max_seq_len)?;

    let architecture = crate::architecture::estimate(model_params_b)?;
    let usable_vram_gb = vram_gb * USABLE_VRAM_SHARE;
    let calibration = Calibration::default();

    let mut evaluated = Vec::with_capacity(RECOMMENDATION_PRIORITY.len());
    for format in RECOMMENDATION_PRIORITY {
        let precision = format.compute_precision();
        let weights = weights_memory(model_params_b, format)?;
        let kv = kv_cache_memory(
            options.batch_size,
            options.max_seq_len,
            architecture.layers,
            architecture.hidden_size,
            architecture.num_heads,
            precision,
        )?;
        // one scheduler step of one full sequence
        let activations = calibration.activation_memory(
            1,
            options.max_seq_len,
            architecture.hidden_size,
            architecture.layers,
            precision,
        )?;
        let overhead = system_overhead(weights, options.batch_size)?;
        let total_memory_gb = weights + kv + activations + overhead;

        evaluated.push(FormatFit {
            format,
            total_memory_gb,
            fits: total_memory_gb <= usable_vram_gb,
        });
    }

    let fitting = evaluated.iter().find(|fit| fit.fits).copied();
    let recommendation = match fitting {
        Some(fit) => {
            let utilization_percent = fit.total_memory_gb / vram_gb * 100.0;
            let reason = if fit.format == RECOMMENDATION_PRIORITY[0] {
                format!(
                    "{} fits without quantization: {:.1} GB of {:.1} GB usable ({:.0}% of VRAM)",
                    fit.format, fit.total_memory_gb, usable_vram_gb, utilization_percent
                )
            } else {
                format!(
                    "{} is the least aggressive format that fits: {:.1} GB of {:.1} GB usable ({:.0}% of VRAM)",
                    fit.format, fit.total_memory_gb, usable_vram_gb, utilization_percent
                )
            };
            QuantizationRecommendation {
                format: fit.format,
                can_fit: true,
                total_memory_gb: fit.total_memory_gb,
                usable_vram_gb,
                utilization_percent,
                reason,
                evaluated,
            }
        }
        None => {
            let most_aggressive = evaluated[evaluated.len() - 1];
            let shortfall = most_aggressive.total_memory_gb - usable_vram_gb;
            QuantizationRecommendation {
                format: most_aggressive.format,
                can_fit: false,
                total_memory_gb: most_aggressive.total_memory_gb,
                usable_vram_gb,
                utilization_percent: most_aggressive.total_memory_gb / vram_gb * 100.0,
                reason: format!(
                    "Model too large: needs {:.1} GB even with {}, {:.1} GB more than the {:.1} GB usable",
                    most_aggressive.total_memory_gb,
                    most_aggressive.format,
                    shortfall,
                    usable_vram_gb
                ),
                evaluated,
            }
        }
    };

    tracing::debug!(
        vram_gb,
        model_params_b,
        format = %recommendation.format,
        can_fit = recommendation.can_fit,
        "quantization recommendation"
    );
    Ok(recommendation)
}
