//! Plain input descriptions shared by every stage of the engine.
//!
//! All three specs are `Deserialize` with snake_case names and the camelCase
//! spellings used by browser front ends as aliases, so catalog loaders and UI
//! state can hand their JSON straight in.

use std::str::FromStr;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::{
    architecture::ModelArchitecture,
    error::{ensure_positive, VramError, VramResult},
    quantization::QuantizationFormat,
};

/// Hardware the model will be served on.
#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[builder(on(String, into))]
pub struct GpuSpec {
    /// Aggregate VRAM across all GPUs, in GB.
    #[serde(alias = "totalVRAMGB", alias = "totalVramGb", alias = "vram_gb")]
    pub total_vram_gb: f64,

    /// Per-GPU memory bandwidth in GB/s.
    #[builder(default = DEFAULT_BANDWIDTH_GBPS)]
    #[serde(default = "default_bandwidth", alias = "memoryBandwidthGBps", alias = "memoryBandwidth")]
    pub memory_bandwidth_gbps: f64,

    /// CUDA compute capability, e.g. `8.0` for A100.
    #[builder(default = DEFAULT_COMPUTE_CAPABILITY)]
    #[serde(default = "default_compute_capability", alias = "computeCapability")]
    pub compute_capability: f64,

    #[builder(default = true)]
    #[serde(default = "default_true", alias = "tensorCores")]
    pub tensor_cores: bool,

    #[builder(default = 1)]
    #[serde(default = "default_gpu_count", alias = "gpuCount")]
    pub gpu_count: u32,

    /// Peak dense fp16 throughput per GPU without tensor cores. Estimated from
    /// the compute capability when absent.
    #[serde(default, alias = "fp16Tflops", skip_serializing_if = "Option::is_none")]
    pub fp16_tflops: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

pub const DEFAULT_BANDWIDTH_GBPS: f64 = 900.0;
pub const DEFAULT_COMPUTE_CAPABILITY: f64 = 8.0;

fn default_bandwidth() -> f64 {
    DEFAULT_BANDWIDTH_GBPS
}

fn default_compute_capability() -> f64 {
    DEFAULT_COMPUTE_CAPABILITY
}

fn default_true() -> bool {
    true
}

fn default_gpu_count() -> u32 {
    1
}

impl GpuSpec {
    pub fn validate(&self) -> VramResult<()> {
        ensure_positive("total_vram_gb", self.total_vram_gb)?;
        ensure_positive("memory_bandwidth_gbps", self.memory_bandwidth_gbps)?;
        ensure_positive("compute_capability", self.compute_capability)?;
        if self.gpu_count == 0 {
            return Err(VramError::validation("gpu_count", "must be at least 1"));
        }
        if let Some(tflops) = self.fp16_tflops {
            ensure_positive("fp16_tflops", tflops)?;
        }
        Ok(())
    }

    /// Aggregate bandwidth over all GPUs.
    pub fn total_bandwidth_gbps(&self) -> f64 {
        self.memory_bandwidth_gbps * self.gpu_count as f64
    }

    /// Per-GPU fp16 TFLOPS on plain CUDA cores.
    pub fn base_fp16_tflops(&self) -> f64 {
        if let Some(tflops) = self.fp16_tflops {
            return tflops;
        }
        let cc = self.compute_capability;
        if cc >= 9.0 {
            134.0
        } else if cc >= 8.9 {
            90.0
        } else if cc >= 8.6 {
            35.0
        } else if cc >= 8.0 {
            78.0
        } else if cc >= 7.5 {
            16.0
        } else if cc >= 7.0 {
            31.0
        } else {
            10.0
        }
    }
}

/// The model being served.
#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[builder(on(String, into))]
pub struct ModelSpec {
    /// Parameter count in billions.
    #[serde(default, alias = "numParams", alias = "num_params_b", skip_serializing_if = "Option::is_none")]
    pub num_params: Option<f64>,

    /// Weight footprint in GB, used when the parameter count is unknown.
    #[serde(default, alias = "sizeGB", alias = "modelSizeGB", alias = "size_gb", skip_serializing_if = "Option::is_none")]
    pub model_size_gb: Option<f64>,

    #[builder(default = QuantizationFormat::Fp16)]
    #[serde(default = "default_quantization")]
    pub quantization: QuantizationFormat,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<ModelArchitecture>,

    /// Model path or hub id passed to `--model`.
    #[serde(default, alias = "modelPath", alias = "name", skip_serializing_if = "Option::is_none")]
    pub model_path: Option<String>,
}

fn default_quantization() -> QuantizationFormat {
    QuantizationFormat::Fp16
}

impl ModelSpec {
    /// Parameter count, derived from the weight size when only that is known.
    pub fn resolved_params_b(&self) -> VramResult<f64> {
        match (self.num_params, self.model_size_gb) {
            (Some(params), _) => ensure_positive("num_params", params),
            (None, Some(size)) => {
                let size = ensure_positive("model_size_gb", size)?;
                Ok(size / self.quantization.bytes_per_param())
            }
            (None, None) => Err(VramError::validation(
                "model",
                "either num_params or model_size_gb is required",
            )),
        }
    }

    /// Weight footprint, computed from the parameter count when not given.
    pub fn resolved_size_gb(&self) -> VramResult<f64> {
        match (self.model_size_gb, self.num_params) {
            (Some(size), _) => ensure_positive("model_size_gb", size),
            (None, Some(params)) => crate::memory::weights_memory(params, self.quantization),
            (None, None) => Err(VramError::validation(
                "model",
                "either num_params or model_size_gb is required",
            )),
        }
    }

    pub fn resolved_architecture(&self) -> VramResult<ModelArchitecture> {
        match self.architecture {
            Some(arch) => {
                arch.validate()?;
                Ok(arch)
            }
            None => crate::architecture::estimate(self.resolved_params_b()?),
        }
    }

    pub fn model_path_or_default(&self) -> String {
        self.model_path
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL_PATH.to_string())
    }
}

pub const DEFAULT_MODEL_PATH: &str = "model";

/// How the deployment will be used.
#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    #[builder(default)]
    #[serde(default, alias = "workloadType")]
    pub workload_type: WorkloadType,

    #[builder(default = DEFAULT_MAX_SEQ_LEN)]
    #[serde(default = "default_max_seq_len", alias = "maxSeqLen", alias = "max_model_len")]
    pub max_seq_len: u64,

    #[builder(default = DEFAULT_AVG_INPUT_LEN)]
    #[serde(default = "default_avg_input_len", alias = "averageInputLength", alias = "avgInputLength")]
    pub avg_input_len: u64,

    #[builder(default = DEFAULT_AVG_OUTPUT_LEN)]
    #[serde(default = "default_avg_output_len", alias = "averageOutputLength", alias = "avgOutputLength")]
    pub avg_output_len: u64,

    /// Expected number of simultaneous requests, when known.
    #[serde(default, alias = "expectedConcurrency", alias = "peakConcurrency", skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<u64>,

    #[builder(default)]
    #[serde(default, alias = "latencyTier", alias = "latencyTarget")]
    pub latency_tier: LatencyTier,

    #[builder(default)]
    #[serde(default, alias = "balanceTarget", alias = "optimizationTarget")]
    pub balance_target: BalanceTarget,
}

pub const DEFAULT_MAX_SEQ_LEN: u64 = 2048;
pub const DEFAULT_AVG_INPUT_LEN: u64 = 512;
pub const DEFAULT_AVG_OUTPUT_LEN: u64 = 256;

fn default_max_seq_len() -> u64 {
    DEFAULT_MAX_SEQ_LEN
}

fn default_avg_input_len() -> u64 {
    DEFAULT_AVG_INPUT_LEN
}

fn default_avg_output_len() -> u64 {
    DEFAULT_AVG_OUTPUT_LEN
}

impl Default for WorkloadSpec {
    fn default() -> Self {
        WorkloadSpec::builder().build()
    }
}

impl WorkloadSpec {
    pub fn validate(&self) -> VramResult<()> {
        for (field, value) in [
            ("max_seq_len", self.max_seq_len),
            ("avg_input_len", self.avg_input_len),
            ("avg_output_len", self.avg_output_len),
        ] {
            crate::error::ensure_nonzero(field, value)?;
        }
        if let Some(concurrency) = self.concurrency {
            crate::error::ensure_nonzero("concurrency", concurrency)?;
        }
        Ok(())
    }
}

macro_rules! named_enum {
    (
        $(#[$meta:meta])*
        $name:ident, default = $default:ident {
            $( $variant:ident => $key:literal $(, $alias:literal)* ; )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $key $(, alias = $alias)*)]
                $variant,
            )*
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$( $name::$variant ),*];

            pub const fn key(self) -> &'static str {
                match self { $( $name::$variant => $key ),* }
            }
        }

        impl FromStr for $name {
            type Err = VramError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let norm = s.trim().to_ascii_lowercase().replace(['_', ' '], "-");
                match norm.as_str() {
                    $( $key $(| $alias)* => Ok($name::$variant), )*
                    _ => Err(VramError::validation(stringify!($name), format!("unknown value '{s}'"))),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.key())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }
    };
}

named_enum! {
    /// Kind of traffic the deployment serves.
    WorkloadType, default = Serving {
        Serving => "serving";
        Batch => "batch", "offline";
        Mixed => "mixed";
        Chat => "chat", "chatbot";
        Interactive => "interactive";
        Realtime => "realtime", "real-time";
        Streaming => "streaming";
        WebApi => "web-api", "api";
        CodeCompletion => "code-completion", "code";
    }
}

named_enum! {
    /// Latency strategy tier.
    LatencyTier, default = Low {
        UltraLow => "ultra-low", "ultralow";
        Low => "low";
        Balanced => "balanced";
    }
}

named_enum! {
    /// Balanced strategy target.
    BalanceTarget, default = General {
        General => "general";
        WebApi => "web-api", "api";
        MultiUser => "multi-user", "multiuser";
        CostOptimized => "cost-optimized", "cost";
        Production => "production";
    }
}

named_enum! {
    /// Allocation priority used by the reserve and swap heuristics.
    AllocationPriority, default = Balanced {
        Throughput => "throughput";
        Balanced => "balanced";
        Latency => "latency";
        Conservative => "conservative";
    }
}

impl WorkloadType {
    /// Parses a workload name, falling back to [`WorkloadType::Serving`] for
    /// anything unrecognised. The flag is true when the fallback applied.
    pub fn resolve(name: &str) -> (Self, bool) {
        match name.parse::<WorkloadType>() {
            Ok(workload_type) => (workload_type, false),
            Err(_) => {
                tracing::warn!(workload = name, "unknown workload type, falling back to serving");
                (WorkloadType::Serving, true)
            }
        }
    }

    /// Batch and offline jobs favour raw throughput over response time.
    pub fn is_batch(self) -> bool {
        matches!(self, WorkloadType::Batch)
    }

    pub fn is_latency_sensitive(self) -> bool {
        matches!(
            self,
            WorkloadType::Chat
                | WorkloadType::Interactive
                | WorkloadType::Realtime
                | WorkloadType::Streaming
                | WorkloadType::CodeCompletion
        )
    }
}
