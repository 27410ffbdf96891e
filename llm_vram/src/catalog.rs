//! Input contracts for GPU and model catalogs, plus helpers that read sizes
//! and formats out of model-hub names and tags.
//!
//! Catalog loaders hand in untyped JSON; [`is_valid_gpu`] and
//! [`is_valid_model`] decide whether an entry is usable before it reaches the
//! engine.

use serde::{Deserialize, Serialize};

use crate::{
    architecture::ModelArchitecture,
    error::{ensure_positive, VramError, VramResult},
    quantization::QuantizationFormat,
    types::{GpuSpec, ModelSpec},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuCatalogEntry {
    pub name: String,
    #[serde(alias = "vramGB", alias = "vramGb", alias = "vram")]
    pub vram_gb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCatalogEntry {
    pub name: String,
    /// Weight footprint in GB.
    #[serde(alias = "sizeGB", alias = "sizeGb", alias = "size")]
    pub size_gb: f64,
    #[serde(default = "default_quantization")]
    pub quantization: String,
    #[serde(alias = "memoryFactor")]
    pub memory_factor: f64,
}

fn default_quantization() -> String {
    QuantizationFormat::Fp16.key().to_string()
}

impl GpuCatalogEntry {
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty() && self.vram_gb.is_finite() && self.vram_gb > 0.0
    }

    /// A [`GpuSpec`] for `gpu_count` of these cards, with bandwidth and
    /// compute capability taken from the built-in table.
    pub fn to_gpu_spec(&self, gpu_count: u32) -> VramResult<GpuSpec> {
        if !self.is_valid() {
            return Err(VramError::validation(
                "gpu",
                format!("catalog entry '{}' is not usable", self.name),
            ));
        }
        if gpu_count == 0 {
            return Err(VramError::validation("gpu_count", "must be at least 1"));
        }
        let known = known_gpu(&self.name);
        if known.is_none() {
            tracing::debug!(gpu = self.name.as_str(), "unknown GPU, using conservative defaults");
        }
        let (bandwidth, compute_capability) = known
            .map(|gpu| (gpu.memory_bandwidth_gbps, gpu.compute_capability))
            .unwrap_or((UNKNOWN_GPU_BANDWIDTH_GBPS, UNKNOWN_GPU_COMPUTE_CAPABILITY));

        Ok(GpuSpec::builder()
            .total_vram_gb(self.vram_gb * gpu_count as f64)
            .memory_bandwidth_gbps(bandwidth)
            .compute_capability(compute_capability)
            .gpu_count(gpu_count)
            .name(self.name.clone())
            .build())
    }
}

impl ModelCatalogEntry {
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty()
            && self.size_gb.is_finite()
            && self.size_gb > 0.0
            && self.memory_factor.is_finite()
            && self.memory_factor > 0.0
            && self.memory_factor <= 1.0
            && self.quantization.parse::<QuantizationFormat>().is_ok()
    }

    pub fn to_model_spec(&self) -> VramResult<ModelSpec> {
        let quantization: QuantizationFormat = self.quantization.parse()?;
        let size_gb = ensure_positive("size_gb", self.size_gb)?;
        Ok(ModelSpec::builder()
            .model_size_gb(size_gb)
            .quantization(quantization)
            .model_path(self.name.clone())
            .build())
    }
}

/// True when `entry` deserializes into a usable [`GpuCatalogEntry`].
pub fn is_valid_gpu(entry: &serde_json::Value) -> bool {
    serde_json::from_value::<GpuCatalogEntry>(entry.clone())
        .map(|gpu| gpu.is_valid())
        .unwrap_or(false)
}

/// True when `entry` deserializes into a usable [`ModelCatalogEntry`].
pub fn is_valid_model(entry: &serde_json::Value) -> bool {
    serde_json::from_value::<ModelCatalogEntry>(entry.clone())
        .map(|model| model.is_valid())
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KnownGpu {
    /// Lowercase model fragment matched at a word start of the catalog name.
    /// It must not run into further digits, so `l4` never matches `L40`.
    pub pattern: &'static str,
    pub memory_bandwidth_gbps: f64,
    pub compute_capability: f64,
}

pub const UNKNOWN_GPU_BANDWIDTH_GBPS: f64 = 500.0;
pub const UNKNOWN_GPU_COMPUTE_CAPABILITY: f64 = 7.5;

/// First match wins, so longer fragments come before their prefixes.
pub const KNOWN_GPUS: &[KnownGpu] = &[
    known("h100", 3350.0, 9.0),
    known("a100 40", 1555.0, 8.0),
    known("a100", 2039.0, 8.0),
    known("l40s", 864.0, 8.9),
    known("l4", 300.0, 8.9),
    known("a10g", 600.0, 8.6),
    known("t4", 320.0, 7.5),
    known("4090", 1008.0, 8.9),
    known("3090", 936.0, 8.6),
    known("v100", 900.0, 7.0),
];

const fn known(pattern: &'static str, memory_bandwidth_gbps: f64, compute_capability: f64) -> KnownGpu {
    KnownGpu {
        pattern,
        memory_bandwidth_gbps,
        compute_capability,
    }
}

pub fn known_gpu(name: &str) -> Option<&'static KnownGpu> {
    // "NVIDIA A100-40GB" -> "nvidia a100 40gb"
    let normalized = name
        .to_ascii_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let bytes = normalized.as_bytes();
    // word starts, plus letter-to-digit steps such as "rtx|4090"
    let starts = (0..bytes.len()).filter(|&i| {
        i == 0
            || bytes[i - 1] == b' '
            || (bytes[i - 1].is_ascii_alphabetic() && bytes[i].is_ascii_digit())
    });
    let matches_at = |gpu: &KnownGpu, i: usize| {
        normalized[i..].starts_with(gpu.pattern)
            && !bytes
                .get(i + gpu.pattern.len())
                .is_some_and(u8::is_ascii_digit)
    };
    starts
        .flat_map(|i| KNOWN_GPUS.iter().map(move |gpu| (i, gpu)))
        .find(|&(i, gpu)| matches_at(gpu, i))
        .map(|(_, gpu)| gpu)
}

/// Model-hub response for one repository.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HubModelMetadata {
    #[serde(default)]
    pub success: bool,
    #[serde(default, alias = "modelId", alias = "id")]
    pub model_id: Option<String>,
    /// The repository's `config.json`, when it was fetched.
    #[serde(default)]
    pub config: Option<serde_json::Value>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl HubModelMetadata {
    pub fn architecture(&self) -> VramResult<ModelArchitecture> {
        match (&self.config, self.success) {
            (Some(config), true) => ModelArchitecture::from_hf_config(config),
            _ => Err(VramError::validation(
                "config",
                "hub metadata carries no usable config",
            )),
        }
    }

    pub fn size_b(&self) -> Option<f64> {
        extract_size(self.model_id.as_deref().unwrap_or_default(), &self.tags)
    }

    pub fn quantization(&self) -> QuantizationFormat {
        detect_quantization(self.model_id.as_deref().unwrap_or_default(), &self.tags)
    }
}

/// Parameter count in billions read from a repository name or its tags,
/// e.g. `7b`, `1.5B`, `8x7b` (56) or `350m` (0.35). The name wins over tags.
pub fn extract_size<S: AsRef<str>>(name: &str, tags: &[S]) -> Option<f64> {
    std::iter::once(name)
        .chain(tags.iter().map(AsRef::as_ref))
        .find_map(size_in)
}

fn size_in(text: &str) -> Option<f64> {
    static MOE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    static DENSE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let moe = MOE.get_or_init(|| {
        regex::Regex::new(
            r"(?xi)
            (?:^|[^a-z0-9.])              # start or separator
            (?P<experts>\d+) x
            (?P<size>\d+(?:\.\d+)?)
            (?P<unit>[bm])
            (?:[^a-z0-9]|$)               # separator or end
            ",
        )
        .expect("static regex must compile")
    });
    let dense = DENSE.get_or_init(|| {
        regex::Regex::new(
            r"(?xi)
            (?:^|[^a-z0-9.])
            (?P<size>\d+(?:\.\d+)?)
            (?P<unit>[bm])
            (?:[^a-z0-9]|$)
            ",
        )
        .expect("static regex must compile")
    });

    let scaled = |size: &str, unit: &str| -> Option<f64> {
        let value: f64 = size.parse().ok()?;
        let value = if unit.eq_ignore_ascii_case("m") {
            value / 1000.0
        } else {
            value
        };
        (value > 0.0).then_some(value)
    };

    if let Some(caps) = moe.captures(text) {
        let experts: f64 = caps.name("experts")?.as_str().parse().ok()?;
        let size = scaled(caps.name("size")?.as_str(), caps.name("unit")?.as_str())?;
        return Some(experts * size);
    }
    let caps = dense.captures(text)?;
    scaled(caps.name("size")?.as_str(), caps.name("unit")?.as_str())
}

/// Storage format implied by a repository name or its tags; fp16 when
/// nothing more specific is found.
pub fn detect_quantization<S: AsRef<str>>(name: &str, tags: &[S]) -> QuantizationFormat {
    let haystack = std::iter::once(name)
        .chain(tags.iter().map(AsRef::as_ref))
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase();

    const MARKERS: &[(&[&str], QuantizationFormat)] = &[
        (&["awq"], QuantizationFormat::Awq),
        (&["gptq"], QuantizationFormat::Gptq),
        (&["fp8", "float8"], QuantizationFormat::Fp8),
        (&["int4", "4bit", "4-bit", "nf4", "q4"], QuantizationFormat::Int4),
        (&["int8", "8bit", "8-bit", "q8"], QuantizationFormat::Int8),
        (&["bf16", "bfloat16"], QuantizationFormat::Bf16),
        (&["fp32", "float32"], QuantizationFormat::Fp32),
    ];

    MARKERS
        .iter()
        .find(|(needles, _)| needles.iter().any(|needle| haystack.contains(needle)))
        .map(|&(_, format)| format)
        .unwrap_or(QuantizationFormat::Fp16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NO_TAGS: &[&str] = &[];

    #[test]
    fn validates_untyped_gpu_entries() {
        assert!(is_valid_gpu(&json!({"name": "A100 80GB", "vram_gb": 80})));
        assert!(is_valid_gpu(&json!({"name": "RTX 4090", "vramGB": 24})));
        assert!(!is_valid_gpu(&json!({"name": "", "vram_gb": 80})));
        assert!(!is_valid_gpu(&json!({"name": "ghost", "vram_gb": 0})));
        assert!(!is_valid_gpu(&json!({"name": "ghost"})));
        assert!(!is_valid_gpu(&json!("A100")));
    }

    #[test]
    fn validates_untyped_model_entries() {
        let ok = json!({"name": "llama-2-7b", "size_gb": 13.5, "quantization": "fp16", "memory_factor": 0.5});
        assert!(is_valid_model(&ok));
        let bad_format = json!({"name": "x", "size_gb": 4, "quantization": "q3_k", "memory_factor": 0.2});
        assert!(!is_valid_model(&bad_format));
        let bad_factor = json!({"name": "x", "sizeGB": 4, "quantization": "awq", "memoryFactor": 1.5});
        assert!(!is_valid_model(&bad_factor));
    }

    #[test]
    fn catalog_entries_convert_to_specs() {
        let gpu = GpuCatalogEntry {
            name: "NVIDIA H100 SXM".into(),
            vram_gb: 80.0,
        };
        let spec = gpu.to_gpu_spec(4).unwrap();
        assert_eq!(spec.total_vram_gb, 320.0);
        assert_eq!(spec.memory_bandwidth_gbps, 3350.0);
        assert_eq!(spec.compute_capability, 9.0);
        assert_eq!(spec.gpu_count, 4);
        assert!(gpu.to_gpu_spec(0).is_err());

        let mystery = GpuCatalogEntry {
            name: "Mystery Accelerator".into(),
            vram_gb: 32.0,
        };
        assert_eq!(
            mystery.to_gpu_spec(1).unwrap().memory_bandwidth_gbps,
            UNKNOWN_GPU_BANDWIDTH_GBPS
        );

        let model = ModelCatalogEntry {
            name: "TheBloke/Llama-2-13B-AWQ".into(),
            size_gb: 7.25,
            quantization: "AWQ".into(),
            memory_factor: 0.175,
        };
        let spec = model.to_model_spec().unwrap();
        assert_eq!(spec.quantization, QuantizationFormat::Awq);
        assert_eq!(spec.model_size_gb, Some(7.25));
        assert_eq!(spec.model_path.as_deref(), Some("TheBloke/Llama-2-13B-AWQ"));
    }

    #[test]
    fn gpu_table_prefers_specific_patterns() {
        assert_eq!(known_gpu("A100-40GB").unwrap().memory_bandwidth_gbps, 1555.0);
        assert_eq!(known_gpu("a100 80gb").unwrap().memory_bandwidth_gbps, 2039.0);
        assert_eq!(known_gpu("L40S").unwrap().pattern, "l40s");
        assert_eq!(known_gpu("NVIDIA L4").unwrap().pattern, "l4");
        assert_eq!(known_gpu("NVIDIA RTX4090").unwrap().pattern, "4090");
        assert!(known_gpu("MI300X").is_none());
    }

    #[test]
    fn gpu_table_does_not_match_into_longer_model_numbers() {
        assert!(known_gpu("NVIDIA L40").is_none());
        assert!(known_gpu("A1000").is_none());
        assert_eq!(known_gpu("Tesla T4").unwrap().pattern, "t4");
        let l40 = GpuCatalogEntry {
            name: "NVIDIA L40".into(),
            vram_gb: 48.0,
        };
        let spec = l40.to_gpu_spec(1).unwrap();
        assert_eq!(spec.memory_bandwidth_gbps, UNKNOWN_GPU_BANDWIDTH_GBPS);
    }

    #[test]
    fn sizes_from_names() {
        let cases = [
            ("meta-llama/Llama-2-7b-chat-hf", Some(7.0)),
            ("Qwen/Qwen2.5-1.5B-Instruct", Some(1.5)),
            ("mistralai/Mixtral-8x7B-v0.1", Some(56.0)),
            ("facebook/opt-350m", Some(0.35)),
            ("TheBloke/Llama-2-13B-AWQ", Some(13.0)),
            ("google/gemma-2b-it", Some(2.0)),
            ("bigscience/bloom", None),
        ];
        for (name, expected) in cases {
            assert_eq!(extract_size(name, NO_TAGS), expected, "{name}");
        }
    }

    #[test]
    fn sizes_fall_back_to_tags() {
        assert_eq!(extract_size("org/model", &["text-generation", "70b"]), Some(70.0));
        assert_eq!(extract_size("org/model-3b", &["70b"]), Some(3.0));
    }

    #[test]
    fn quantization_from_names_and_tags() {
        assert_eq!(detect_quantization("TheBloke/Llama-2-13B-AWQ", NO_TAGS), QuantizationFormat::Awq);
        assert_eq!(detect_quantization("TheBloke/Llama-2-7B-GPTQ", NO_TAGS), QuantizationFormat::Gptq);
        assert_eq!(detect_quantization("org/model", &["4bit", "bitsandbytes"]), QuantizationFormat::Int4);
        assert_eq!(detect_quantization("neuralmagic/Meta-Llama-3-8B-FP8", NO_TAGS), QuantizationFormat::Fp8);
        assert_eq!(detect_quantization("org/model-bf16", NO_TAGS), QuantizationFormat::Bf16);
        assert_eq!(detect_quantization("meta-llama/Llama-2-7b-hf", NO_TAGS), QuantizationFormat::Fp16);
    }

    #[test]
    fn hub_metadata_reads_config() {
        let meta: HubModelMetadata = serde_json::from_value(json!({
            "success": true,
            "modelId": "meta-llama/Llama-2-7b-hf",
            "config": {
                "num_hidden_layers": 32,
                "hidden_size": 4096,
                "num_attention_heads": 32,
                "vocab_size": 32000,
                "intermediate_size": 11008,
                "model_type": "llama"
            },
            "tags": ["pytorch", "llama"]
        }))
        .unwrap();
        let arch = meta.architecture().unwrap();
        assert_eq!((arch.layers, arch.hidden_size, arch.num_heads), (32, 4096, 32));
        assert_eq!(meta.size_b(), Some(7.0));
        assert_eq!(meta.quantization(), QuantizationFormat::Fp16);

        let failed = HubModelMetadata {
            success: false,
            ..meta
        };
        assert!(failed.architecture().is_err());
    }
}
