//! One normalization step from loosely-shaped request JSON to typed specs.
//!
//! Requests arrive either structured (`gpu_specs`, `model_specs`,
//! `workload_specs`) or flat with every field at the top level, often in
//! camelCase. Both may be present; each field is resolved on its own:
//!
//! | source                         | precedence |
//! |--------------------------------|------------|
//! | field inside the nested object | 1          |
//! | same field at the top level    | 2          |
//! | built-in default               | 3          |
//!
//! Defaults: bandwidth 900 GB/s, compute capability 8.0, tensor cores on,
//! one GPU, fp16 weights, workload `serving`, 2048-token context, 512 input
//! and 256 output tokens, latency tier `low`, balance target `general`.
//! VRAM and one of parameter count or model size have no default.

use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    architecture::ModelArchitecture,
    error::{VramError, VramResult},
    quantization::QuantizationFormat,
    strategy::StrategyRequest,
    types::{
        BalanceTarget, GpuSpec, LatencyTier, ModelSpec, WorkloadSpec, WorkloadType,
        DEFAULT_AVG_INPUT_LEN, DEFAULT_AVG_OUTPUT_LEN, DEFAULT_BANDWIDTH_GBPS,
        DEFAULT_COMPUTE_CAPABILITY, DEFAULT_MAX_SEQ_LEN,
    },
};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawGpuSpecs {
    #[serde(default, alias = "totalVRAMGB", alias = "totalVramGb", alias = "vram_gb", alias = "vramGB")]
    pub total_vram_gb: Option<f64>,
    #[serde(
        default,
        alias = "memoryBandwidthGBps",
        alias = "memoryBandwidth",
        alias = "memory_bandwidth"
    )]
    pub memory_bandwidth_gbps: Option<f64>,
    #[serde(default, alias = "computeCapability")]
    pub compute_capability: Option<f64>,
    #[serde(default, alias = "tensorCores")]
    pub tensor_cores: Option<bool>,
    #[serde(default, alias = "gpuCount", alias = "tensorParallelSize", alias = "tensor_parallel_size")]
    pub gpu_count: Option<u32>,
    #[serde(default, alias = "fp16Tflops")]
    pub fp16_tflops: Option<f64>,
    #[serde(default, alias = "gpuName")]
    pub gpu_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawModelSpecs {
    #[serde(default, alias = "numParams", alias = "num_params_b", alias = "params")]
    pub num_params: Option<f64>,
    #[serde(default, alias = "modelSizeGB", alias = "modelSizeGb", alias = "sizeGB", alias = "size_gb")]
    pub model_size_gb: Option<f64>,
    /// Kept as text so unknown formats surface as `UnsupportedFormat`.
    #[serde(default)]
    pub quantization: Option<String>,
    #[serde(default)]
    pub architecture: Option<ModelArchitecture>,
    #[serde(default, alias = "modelPath", alias = "model", alias = "modelName")]
    pub model_path: Option<String>,
    #[serde(default, alias = "kvCacheDtype")]
    pub kv_cache_dtype: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawWorkloadSpecs {
    /// Kept as text; unknown names resolve to `serving`.
    #[serde(default, alias = "workloadType")]
    pub workload_type: Option<String>,
    #[serde(default, alias = "maxSeqLen", alias = "maxModelLen", alias = "max_model_len")]
    pub max_seq_len: Option<u64>,
    #[serde(default, alias = "averageInputLength", alias = "avgInputLength")]
    pub avg_input_len: Option<u64>,
    #[serde(default, alias = "averageOutputLength", alias = "avgOutputLength")]
    pub avg_output_len: Option<u64>,
    #[serde(default, alias = "expectedConcurrency", alias = "peakConcurrency")]
    pub concurrency: Option<u64>,
    #[serde(default, alias = "latencyTier", alias = "latencyTarget")]
    pub latency_tier: Option<LatencyTier>,
    #[serde(default, alias = "balanceTarget", alias = "optimizationTarget")]
    pub balance_target: Option<BalanceTarget>,
}

/// A request in either shape. Deserializing reads the nested objects and the
/// top-level fields separately so [`normalize`] can apply precedence.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawOptimizationParams {
    pub gpu_specs: Option<RawGpuSpecs>,
    pub model_specs: Option<RawModelSpecs>,
    pub workload_specs: Option<RawWorkloadSpecs>,
    pub flat_gpu: RawGpuSpecs,
    pub flat_model: RawModelSpecs,
    pub flat_workload: RawWorkloadSpecs,
}

impl RawOptimizationParams {
    pub fn from_value(value: serde_json::Value) -> VramResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| VramError::validation("params", "request must be a JSON object"))?;

        fn nested<T: serde::de::DeserializeOwned>(
            object: &serde_json::Map<String, serde_json::Value>,
            keys: [&str; 2],
        ) -> VramResult<Option<T>> {
            match keys.iter().find_map(|key| object.get(*key)) {
                None | Some(serde_json::Value::Null) => Ok(None),
                Some(value) => serde_json::from_value(value.clone())
                    .map(Some)
                    .map_err(|e| VramError::validation("params", format!("{}: {e}", keys[0]))),
            }
        }

        fn flat<T: serde::de::DeserializeOwned>(value: &serde_json::Value) -> VramResult<T> {
            serde_json::from_value(value.clone())
                .map_err(|e| VramError::validation("params", e.to_string()))
        }

        Ok(Self {
            gpu_specs: nested(object, ["gpu_specs", "gpuSpecs"])?,
            model_specs: nested(object, ["model_specs", "modelSpecs"])?,
            workload_specs: nested(object, ["workload_specs", "workloadSpecs"])?,
            flat_gpu: flat(&value)?,
            flat_model: flat(&value)?,
            flat_workload: flat(&value)?,
        })
    }
}

impl<'de> Deserialize<'de> for RawOptimizationParams {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

impl From<&OptimizationParams> for RawOptimizationParams {
    fn from(params: &OptimizationParams) -> Self {
        Self {
            gpu_specs: Some(RawGpuSpecs {
                total_vram_gb: Some(params.gpu.total_vram_gb),
                memory_bandwidth_gbps: Some(params.gpu.memory_bandwidth_gbps),
                compute_capability: Some(params.gpu.compute_capability),
                tensor_cores: Some(params.gpu.tensor_cores),
                gpu_count: Some(params.gpu.gpu_count),
                fp16_tflops: params.gpu.fp16_tflops,
                gpu_name: params.gpu.name.clone(),
            }),
            model_specs: Some(RawModelSpecs {
                num_params: params.model.num_params,
                model_size_gb: params.model.model_size_gb,
                quantization: Some(params.model.quantization.key().to_string()),
                architecture: params.model.architecture,
                model_path: params.model.model_path.clone(),
                kv_cache_dtype: params.kv_cache_dtype.map(|dtype| dtype.key().to_string()),
            }),
            workload_specs: Some(RawWorkloadSpecs {
                workload_type: Some(params.workload.workload_type.key().to_string()),
                max_seq_len: Some(params.workload.max_seq_len),
                avg_input_len: Some(params.workload.avg_input_len),
                avg_output_len: Some(params.workload.avg_output_len),
                concurrency: params.workload.concurrency,
                latency_tier: Some(params.workload.latency_tier),
                balance_target: Some(params.workload.balance_target),
            }),
            ..Default::default()
        }
    }
}

/// Fully resolved request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationParams {
    pub gpu: GpuSpec,
    pub model: ModelSpec,
    pub workload: WorkloadSpec,
    #[serde(default)]
    pub kv_cache_dtype: Option<QuantizationFormat>,
}

macro_rules! pick {
    ($structured:expr, $flat:expr, $field:ident) => {
        $structured
            .and_then(|s| s.$field.clone())
            .or_else(|| $flat.$field.clone())
    };
}

pub fn normalize(params: &RawOptimizationParams) -> VramResult<OptimizationParams> {
    let gpu_s = params.gpu_specs.as_ref();
    let model_s = params.model_specs.as_ref();
    let work_s = params.workload_specs.as_ref();
    let (gpu_f, model_f, work_f) = (&params.flat_gpu, &params.flat_model, &params.flat_workload);

    let total_vram_gb = pick!(gpu_s, gpu_f, total_vram_gb)
        .ok_or_else(|| VramError::validation("total_vram_gb", "is required"))?;

    let gpu = GpuSpec {
        total_vram_gb,
        memory_bandwidth_gbps: pick!(gpu_s, gpu_f, memory_bandwidth_gbps)
            .unwrap_or(DEFAULT_BANDWIDTH_GBPS),
        compute_capability: pick!(gpu_s, gpu_f, compute_capability)
            .unwrap_or(DEFAULT_COMPUTE_CAPABILITY),
        tensor_cores: pick!(gpu_s, gpu_f, tensor_cores).unwrap_or(true),
        gpu_count: pick!(gpu_s, gpu_f, gpu_count).unwrap_or(1),
        fp16_tflops: pick!(gpu_s, gpu_f, fp16_tflops),
        name: pick!(gpu_s, gpu_f, gpu_name),
    };
    gpu.validate()?;

    let quantization = match pick!(model_s, model_f, quantization) {
        Some(raw) => raw.parse::<QuantizationFormat>()?,
        None => QuantizationFormat::Fp16,
    };
    let kv_cache_dtype = pick!(model_s, model_f, kv_cache_dtype)
        .map(|raw| raw.parse::<QuantizationFormat>())
        .transpose()?;
    let model = ModelSpec {
        num_params: pick!(model_s, model_f, num_params),
        model_size_gb: pick!(model_s, model_f, model_size_gb),
        quantization,
        architecture: pick!(model_s, model_f, architecture),
        model_path: pick!(model_s, model_f, model_path),
    };
    // fails when neither size nor parameter count is usable
    model.resolved_size_gb()?;

    let workload = WorkloadSpec {
        workload_type: pick!(work_s, work_f, workload_type)
            .map(|name| WorkloadType::resolve(&name).0)
            .unwrap_or_default(),
        max_seq_len: pick!(work_s, work_f, max_seq_len).unwrap_or(DEFAULT_MAX_SEQ_LEN),
        avg_input_len: pick!(work_s, work_f, avg_input_len).unwrap_or(DEFAULT_AVG_INPUT_LEN),
        avg_output_len: pick!(work_s, work_f, avg_output_len).unwrap_or(DEFAULT_AVG_OUTPUT_LEN),
        concurrency: pick!(work_s, work_f, concurrency),
        latency_tier: pick!(work_s, work_f, latency_tier).unwrap_or_default(),
        balance_target: pick!(work_s, work_f, balance_target).unwrap_or_default(),
    };
    workload.validate()?;

    tracing::trace!(?gpu, ?model, ?workload, "normalized request");

    Ok(OptimizationParams {
        gpu,
        model,
        workload,
        kv_cache_dtype,
    })
}

impl OptimizationParams {
    /// Fills in what the strategies need: footprint, parameter count and
    /// architecture.
    pub fn strategy_request(&self) -> VramResult<StrategyRequest> {
        Ok(StrategyRequest {
            total_vram_gb: self.gpu.total_vram_gb,
            available_memory_gb: None,
            model_size_gb: self.model.resolved_size_gb()?,
            num_params_b: self.model.resolved_params_b()?,
            architecture: self.model.resolved_architecture()?,
            quantization: self.model.quantization,
            kv_cache_dtype: self.kv_cache_dtype,
            workload: self.workload.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> OptimizationParams {
        let raw: RawOptimizationParams = serde_json::from_value(value).unwrap();
        normalize(&raw).unwrap()
    }

    #[test]
    fn flat_legacy_shape() {
        let params = parse(json!({
            "totalVRAMGB": 24,
            "numParams": 7,
            "quantization": "awq",
            "modelPath": "TheBloke/Llama-2-7B-AWQ",
            "maxSeqLen": 4096,
            "workloadType": "chat"
        }));
        assert_eq!(params.gpu.total_vram_gb, 24.0);
        assert_eq!(params.gpu.memory_bandwidth_gbps, DEFAULT_BANDWIDTH_GBPS);
        assert_eq!(params.model.quantization, QuantizationFormat::Awq);
        assert_eq!(params.model.model_path.as_deref(), Some("TheBloke/Llama-2-7B-AWQ"));
        assert_eq!(params.workload.max_seq_len, 4096);
        assert_eq!(params.workload.workload_type, WorkloadType::Chat);
        assert_eq!(params.workload.avg_output_len, DEFAULT_AVG_OUTPUT_LEN);
    }

    #[test]
    fn structured_fields_win_over_flat_ones() {
        let params = parse(json!({
            "gpu_specs": { "total_vram_gb": 80, "gpu_count": 2 },
            "model_specs": { "num_params": 13 },
            "workload_specs": { "latency_tier": "ultra-low" },
            "totalVRAMGB": 24,
            "memoryBandwidth": 2039,
            "numParams": 70,
            "quantization": "gptq",
            "latencyTier": "balanced",
            "balanceTarget": "production"
        }));
        // nested wins
        assert_eq!(params.gpu.total_vram_gb, 80.0);
        assert_eq!(params.model.num_params, Some(13.0));
        assert_eq!(params.workload.latency_tier, LatencyTier::UltraLow);
        assert_eq!(params.gpu.gpu_count, 2);
        // flat fills what the nested objects leave out
        assert_eq!(params.gpu.memory_bandwidth_gbps, 2039.0);
        assert_eq!(params.model.quantization, QuantizationFormat::Gptq);
        assert_eq!(params.workload.balance_target, BalanceTarget::Production);
        // defaults last
        assert!(params.gpu.tensor_cores);
        assert_eq!(params.workload.workload_type, WorkloadType::Serving);
    }

    #[test]
    fn camel_case_nested_objects() {
        let params = parse(json!({
            "gpuSpecs": { "totalVRAMGB": 48 },
            "modelSpecs": { "modelSizeGB": 26, "kvCacheDtype": "fp8" }
        }));
        assert_eq!(params.gpu.total_vram_gb, 48.0);
        assert_eq!(params.model.model_size_gb, Some(26.0));
        assert_eq!(params.kv_cache_dtype, Some(QuantizationFormat::Fp8));

        let request = params.strategy_request().unwrap();
        assert_eq!(request.num_params_b, 13.0);
        assert_eq!(request.architecture.layers, 40);
    }

    #[test]
    fn missing_or_bad_fields_are_errors() {
        let no_vram: RawOptimizationParams = serde_json::from_value(json!({ "numParams": 7 })).unwrap();
        assert!(matches!(
            normalize(&no_vram),
            Err(VramError::Validation { field: "total_vram_gb", .. })
        ));

        let no_model: RawOptimizationParams =
            serde_json::from_value(json!({ "totalVRAMGB": 24 })).unwrap();
        assert!(normalize(&no_model).is_err());

        let bad_format: RawOptimizationParams = serde_json::from_value(json!({
            "totalVRAMGB": 24, "numParams": 7, "quantization": "q3_k_m"
        }))
        .unwrap();
        assert!(matches!(normalize(&bad_format), Err(VramError::UnsupportedFormat(_))));

        assert!(RawOptimizationParams::from_value(json!([1, 2])).is_err());
    }

    #[test]
    fn unknown_workload_names_fall_back_to_serving() {
        let params = parse(json!({
            "totalVRAMGB": 80, "numParams": 7, "workloadType": "summarization"
        }));
        assert_eq!(params.workload.workload_type, WorkloadType::Serving);

        let nested = parse(json!({
            "gpu_specs": { "total_vram_gb": 80 },
            "model_specs": { "num_params": 7 },
            "workload_specs": { "workload_type": "summarization" },
            "workloadType": "batch"
        }));
        assert_eq!(nested.workload.workload_type, WorkloadType::Serving);

        let known = parse(json!({ "totalVRAMGB": 80, "numParams": 7, "workloadType": "Offline" }));
        assert_eq!(known.workload.workload_type, WorkloadType::Batch);
    }

    #[test]
    fn typed_params_round_trip_through_raw() {
        let params = parse(json!({ "totalVRAMGB": 80, "numParams": 7, "gpuCount": 2 }));
        let again = normalize(&RawOptimizationParams::from(&params)).unwrap();
        assert_eq!(again, params);
    }
}
