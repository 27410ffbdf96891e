use serde::{Deserialize, Serialize};

use crate::error::{ensure_positive, VramError, VramResult};

/// Transformer shape needed by the memory formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelArchitecture {
    #[serde(alias = "num_hidden_layers", alias = "n_layer", alias = "num_layers")]
    pub layers: u64,
    #[serde(alias = "hiddenSize", alias = "n_embd")]
    pub hidden_size: u64,
    #[serde(alias = "numHeads", alias = "num_attention_heads", alias = "n_head")]
    pub num_heads: u64,
    #[serde(default, alias = "vocabSize", skip_serializing_if = "Option::is_none")]
    pub vocab_size: Option<u64>,
    #[serde(
        default,
        alias = "intermediateSize",
        alias = "n_inner",
        skip_serializing_if = "Option::is_none"
    )]
    pub intermediate_size: Option<u64>,
}

/// Reference shapes keyed by parameter count in billions, ascending.
pub const REFERENCE_ARCHITECTURES: &[(f64, ModelArchitecture)] = &[
    (0.5, reference(24, 1024, 16, 32_000, 2_816)),
    (1.0, reference(24, 2048, 16, 32_000, 5_504)),
    (3.0, reference(26, 3200, 32, 32_000, 8_640)),
    (7.0, reference(32, 4096, 32, 32_000, 11_008)),
    (13.0, reference(40, 5120, 40, 32_000, 13_824)),
    (30.0, reference(60, 6656, 52, 32_000, 17_920)),
    (65.0, reference(80, 8192, 64, 32_000, 22_016)),
    (175.0, reference(96, 12288, 96, 50_257, 49_152)),
];

const fn reference(
    layers: u64,
    hidden_size: u64,
    num_heads: u64,
    vocab_size: u64,
    intermediate_size: u64,
) -> ModelArchitecture {
    ModelArchitecture {
        layers,
        hidden_size,
        num_heads,
        vocab_size: Some(vocab_size),
        intermediate_size: Some(intermediate_size),
    }
}

/// Nearest reference shape for `num_params_b` billion parameters.
///
/// No interpolation is done. On an exact tie the smaller reference wins.
pub fn estimate(num_params_b: f64) -> VramResult<ModelArchitecture> {
    let num_params_b = ensure_positive("num_params", num_params_b)?;

    let mut best = REFERENCE_ARCHITECTURES[0];
    for &(size, arch) in &REFERENCE_ARCHITECTURES[1..] {
        if (size - num_params_b).abs() < (best.0 - num_params_b).abs() {
            best = (size, arch);
        }
    }
    tracing::trace!(num_params_b, reference_b = best.0, "estimated architecture");
    Ok(best.1)
}

impl ModelArchitecture {
    pub fn head_dim(&self) -> u64 {
        self.hidden_size / self.num_heads.max(1)
    }

    /// Reads the shape out of a Hugging Face `config.json` document.
    pub fn from_hf_config(config: &serde_json::Value) -> VramResult<Self> {
        let arch: ModelArchitecture = serde_json::from_value(config.clone())
            .map_err(|e| VramError::validation("architecture", e.to_string()))?;
        arch.validate()?;
        Ok(arch)
    }

    pub fn validate(&self) -> VramResult<()> {
        for (field, value) in [
            ("layers", self.layers),
            ("hidden_size", self.hidden_size),
            ("num_heads", self.num_heads),
        ] {
            if value == 0 {
                return Err(VramError::validation(field, "must be greater than zero"));
            }
        }
        Ok(())
    }
}
