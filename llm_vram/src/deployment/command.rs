use serde::{ser::SerializeMap, Serialize, Serializer};

use crate::strategy::{BatchConfiguration, MemoryAllocationStrategy};

use super::normalize::OptimizationParams;

pub const VLLM_ENTRYPOINT: &str = "python -m vllm.entrypoints.openai.api_server";

/// Block sizes the paged-attention kernels accept.
pub const VALID_BLOCK_SIZES: [u64; 3] = [8, 16, 32];

/// Units appended to numeric values in the command string. The argument map
/// keeps the bare number.
const ARG_UNITS: &[(&str, &str)] = &[("swapSpace", "GB")];

fn unit_of(key: &str) -> &'static str {
    ARG_UNITS
        .iter()
        .find(|(k, _)| *k == key)
        .map_or("", |(_, unit)| *unit)
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Flag(bool),
    Int(u64),
    Float(f64),
    Text(String),
}

impl ArgValue {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 && *v >= 0.0 => Some(*v as u64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl std::fmt::Display for ArgValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flag(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            // two decimals is as fine as any server knob gets
            Self::Float(v) => write!(f, "{}", (v * 100.0).round() / 100.0),
            Self::Text(v) if v.chars().any(char::is_whitespace) => write!(f, "'{v}'"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<bool> for ArgValue {
    fn from(v: bool) -> Self {
        Self::Flag(v)
    }
}

impl From<u64> for ArgValue {
    fn from(v: u64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for ArgValue {
    fn from(v: u32) -> Self {
        Self::Int(v as u64)
    }
}

impl From<f64> for ArgValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ArgValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl Serialize for ArgValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Flag(v) => serializer.serialize_bool(*v),
            Self::Int(v) => serializer.serialize_u64(*v),
            Self::Float(v) => serializer.serialize_f64(*v),
            Self::Text(v) => serializer.serialize_str(v),
        }
    }
}

/// Server arguments keyed by camelCase name, in insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArgMap(Vec<(String, ArgValue)>);

impl ArgMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key`, keeping its original position when it already exists.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ArgValue>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
        self
    }

    pub fn set_opt<V: Into<ArgValue>>(&mut self, key: impl Into<String>, value: Option<V>) -> &mut Self {
        if let Some(value) = value {
            self.set(key, value);
        }
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ArgValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for ArgMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// `maxNumSeqs` → `max-num-seqs`; snake_case keys work as well.
pub fn kebab_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, c) in key.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 && !out.ends_with('-') {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else if c == '_' {
            out.push('-');
        } else {
            out.push(c);
        }
    }
    out
}

/// Renders `args` after the server entry point. `true` flags become bare
/// switches, `false` flags are left out and sized values carry their unit
/// (`--swap-space 4GB`).
pub fn serialize_command(args: &ArgMap) -> String {
    let mut command = String::from(VLLM_ENTRYPOINT);
    for (key, value) in args.iter() {
        match value {
            ArgValue::Flag(false) => continue,
            ArgValue::Flag(true) => {
                command.push_str(" --");
                command.push_str(&kebab_case(key));
            }
            value @ (ArgValue::Int(_) | ArgValue::Float(_)) => {
                command.push_str(&format!(" --{} {value}{}", kebab_case(key), unit_of(key)));
            }
            value => {
                command.push_str(&format!(" --{} {value}", kebab_case(key)));
            }
        }
    }
    command
}

/// The server arguments for one strategy's results, in the order the
/// server documents them.
pub fn build_args(
    params: &OptimizationParams,
    batch: &BatchConfiguration,
    memory: &MemoryAllocationStrategy,
) -> ArgMap {
    let mut args = ArgMap::new();
    args.set("model", params.model.model_path_or_default())
        .set("gpuMemoryUtilization", memory.gpu_memory_utilization)
        .set("maxNumSeqs", batch.max_num_seqs)
        .set("maxNumBatchedTokens", batch.max_num_batched_tokens)
        .set("maxModelLen", params.workload.max_seq_len)
        .set("blockSize", memory.recommended_block_size)
        .set("swapSpace", memory.swap_space_gb)
        .set_opt(
            "quantization",
            params.model.quantization.vllm_quantization_arg(),
        )
        .set_opt(
            "kvCacheDtype",
            params
                .kv_cache_dtype
                .filter(|dtype| *dtype == crate::quantization::QuantizationFormat::Fp8)
                .map(|dtype| dtype.key()),
        );
    if params.gpu.gpu_count > 1 {
        args.set("tensorParallelSize", params.gpu.gpu_count);
    }
    args.set("enableChunkedPrefill", memory.chunked_prefill)
        .set("enablePrefixCaching", memory.prefix_caching)
        .set("disableLogStats", memory.disable_log_stats)
        .set("enforceEager", memory.enforce_eager)
        .set_opt("preemptionMode", memory.preemption_mode.map(|mode| mode.as_str()));
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booleans_render_as_switches() {
        let args = ArgMap::new()
            .with("model", "meta-llama/Llama-2-7b-hf")
            .with("enableChunkedPrefill", true)
            .with("enforceEager", false);
        let command = serialize_command(&args);
        assert_eq!(
            command,
            "python -m vllm.entrypoints.openai.api_server --model meta-llama/Llama-2-7b-hf --enable-chunked-prefill"
        );
        assert!(!command.contains("--enforce-eager"));
    }

    #[test]
    fn order_is_preserved_and_set_replaces_in_place() {
        let mut args = ArgMap::new()
            .with("maxNumSeqs", 64u64)
            .with("blockSize", 16u64)
            .with("gpuMemoryUtilization", 0.9);
        args.set("maxNumSeqs", 32u64);
        let keys: Vec<&str> = args.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["maxNumSeqs", "blockSize", "gpuMemoryUtilization"]);
        assert_eq!(
            serialize_command(&args),
            format!("{VLLM_ENTRYPOINT} --max-num-seqs 32 --block-size 16 --gpu-memory-utilization 0.9")
        );
    }

    #[test]
    fn swap_space_carries_its_unit() {
        let args = ArgMap::new()
            .with("blockSize", 32u64)
            .with("swapSpace", 12.0)
            .with("enablePrefixCaching", true);
        assert_eq!(
            serialize_command(&args),
            format!("{VLLM_ENTRYPOINT} --block-size 32 --swap-space 12GB --enable-prefix-caching")
        );
        assert_eq!(args.get("swapSpace"), Some(&ArgValue::Float(12.0)));

        let fractional = ArgMap::new().with("swapSpace", 24.0 * 0.15);
        assert!(serialize_command(&fractional).ends_with(" --swap-space 3.6GB"));
    }

    #[test]
    fn kebab_case_conversion() {
        assert_eq!(kebab_case("maxNumBatchedTokens"), "max-num-batched-tokens");
        assert_eq!(kebab_case("max_model_len"), "max-model-len");
        assert_eq!(kebab_case("model"), "model");
    }

    #[test]
    fn floats_are_rounded_for_display() {
        assert_eq!(ArgValue::Float(24.0 * 0.15).to_string(), "3.6");
        assert_eq!(ArgValue::Float(12.0).to_string(), "12");
        assert_eq!(ArgValue::Text("my model".into()).to_string(), "'my model'");
    }

    #[test]
    fn arg_map_serializes_as_ordered_object() {
        let args = ArgMap::new().with("model", "m").with("maxNumSeqs", 8u64);
        assert_eq!(
            serde_json::to_string(&args).unwrap(),
            r#"{"model":"m","maxNumSeqs":8}"#
        );
    }
}
