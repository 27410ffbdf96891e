//! Empirical constants behind the activation, fragmentation and performance
//! models.
//!
//! None of these are derived from first principles; they approximate observed
//! behaviour of paged-attention servers and should be re-fit against real
//! measurements. Callers may override them per request, and the CLI loads them
//! from a TOML file via [`Calibration::load_path`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{VramError, VramResult};

/// Multiplier approximating attention and MLP intermediate buffers per token
/// per layer, relative to one hidden-state vector.
pub const ACTIVATION_MULTIPLIER: f64 = 12.0;

pub const FRAGMENTATION_FLOOR_GB: f64 = 0.1;

/// `(upper VRAM bound in GB, rate)`; the first tier whose bound exceeds the
/// VRAM size applies.
pub const FRAGMENTATION_TIERS: &[(f64, f64)] = &[(16.0, 0.05), (40.0, 0.04), (80.0, 0.03)];

/// Rate for VRAM at or above the last tier bound.
pub const FRAGMENTATION_DEFAULT_RATE: f64 = 0.025;

/// Share of peak bandwidth reached by decode kernels.
pub const BANDWIDTH_EFFICIENCY: f64 = 0.8;

/// Model FLOPs utilisation reached by prefill kernels.
pub const COMPUTE_EFFICIENCY: f64 = 0.5;

/// Dense fp16 speed-up of tensor cores over CUDA cores.
pub const TENSOR_CORE_MULTIPLIER: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FragmentationTier {
    pub below_vram_gb: f64,
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    pub activation_multiplier: f64,
    pub fragmentation_default_rate: f64,
    pub fragmentation_floor_gb: f64,
    pub bandwidth_efficiency: f64,
    pub compute_efficiency: f64,
    pub tensor_core_multiplier: f64,
    // kept last: serialized as an array of tables
    pub fragmentation_tiers: Vec<FragmentationTier>,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            activation_multiplier: ACTIVATION_MULTIPLIER,
            fragmentation_tiers: FRAGMENTATION_TIERS
                .iter()
                .map(|&(below_vram_gb, rate)| FragmentationTier {
                    below_vram_gb,
                    rate,
                })
                .collect(),
            fragmentation_default_rate: FRAGMENTATION_DEFAULT_RATE,
            fragmentation_floor_gb: FRAGMENTATION_FLOOR_GB,
            bandwidth_efficiency: BANDWIDTH_EFFICIENCY,
            compute_efficiency: COMPUTE_EFFICIENCY,
            tensor_core_multiplier: TENSOR_CORE_MULTIPLIER,
        }
    }
}

impl Calibration {
    /// Reads a calibration file. A missing file is created with the defaults.
    pub fn load_path(path: impl AsRef<Path>) -> VramResult<Self> {
        let path = path.as_ref();
        let calibration: Calibration = confy::load_path(path).map_err(|e| {
            VramError::validation("calibration", format!("{}: {e}", path.display()))
        })?;
        calibration.validate()?;
        tracing::debug!(path = %path.display(), "loaded calibration");
        Ok(calibration)
    }

    pub fn validate(&self) -> VramResult<()> {
        let positive = [
            ("activation_multiplier", self.activation_multiplier),
            ("fragmentation_default_rate", self.fragmentation_default_rate),
            ("fragmentation_floor_gb", self.fragmentation_floor_gb),
            ("bandwidth_efficiency", self.bandwidth_efficiency),
            ("compute_efficiency", self.compute_efficiency),
            ("tensor_core_multiplier", self.tensor_core_multiplier),
        ];
        for (field, value) in positive {
            crate::error::ensure_positive(field, value)?;
        }
        for (field, value) in [
            ("bandwidth_efficiency", self.bandwidth_efficiency),
            ("compute_efficiency", self.compute_efficiency),
        ] {
            if value > 1.0 {
                return Err(VramError::validation(field, "must not exceed 1.0"));
            }
        }
        let mut previous = 0.0;
        for tier in &self.fragmentation_tiers {
            crate::error::ensure_positive("fragmentation_tiers.rate", tier.rate)?;
            if tier.below_vram_gb <= previous {
                return Err(VramError::validation(
                    "fragmentation_tiers",
                    "tiers must be sorted by strictly increasing below_vram_gb",
                ));
            }
            previous = tier.below_vram_gb;
        }
        Ok(())
    }

    /// Base fragmentation rate for a GPU pool of `total_vram_gb`.
    pub fn fragmentation_rate(&self, total_vram_gb: f64) -> f64 {
        self.fragmentation_tiers
            .iter()
            .find(|tier| total_vram_gb < tier.below_vram_gb)
            .map(|tier| tier.rate)
            .unwrap_or(self.fragmentation_default_rate)
    }

    pub fn effective_tflops(&self, base_tflops: f64, tensor_cores: bool) -> f64 {
        if tensor_cores {
            base_tflops * self.tensor_core_multiplier
        } else {
            base_tflops
        }
    }
}
