use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{VramError, VramResult};

macro_rules! quantization_catalog {
    (
        $(
            $variant:ident, $key:expr, $bits:expr, $efficiency:expr, $loss:expr, $overhead:expr
        ),* $(,)?
    ) => {
        /// Numeric formats the engine knows how to size.
        ///
        /// `memory_efficiency` is the footprint relative to fp32, `quality_loss`
        /// is an approximate fraction of output quality given up, and
        /// `overhead` is the extra GB per billion parameters some packed
        /// formats carry for scales and zero points.
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(rename_all = "lowercase")]
        #[non_exhaustive]
        pub enum QuantizationFormat {
            $( $variant ),*
        }

        impl QuantizationFormat {
            /// Catalog key such as `"awq"`.
            #[inline]
            pub const fn key(self) -> &'static str {
                match self { $( Self::$variant => $key ),* }
            }

            #[inline]
            pub fn bits_per_param(self) -> f64 {
                match self { $( Self::$variant => $bits as f64 ),* }
            }

            #[inline]
            pub fn memory_efficiency(self) -> f64 {
                match self { $( Self::$variant => $efficiency ),* }
            }

            #[inline]
            pub fn quality_loss(self) -> f64 {
                match self { $( Self::$variant => $loss ),* }
            }

            #[inline]
            pub fn overhead(self) -> Option<f64> {
                match self { $( Self::$variant => $overhead ),* }
            }
        }

        /// Compile-time table: key → variant, in catalog order.
        pub const FORMATS: &[(&str, QuantizationFormat)] = &[
            $( ($key, QuantizationFormat::$variant) ),*
        ];
    };
}

quantization_catalog! {
    Fp32, "fp32", 32, 1.0  , 0.0  , None      ,
    Fp16, "fp16", 16, 0.5  , 0.0  , None      ,
    Bf16, "bf16", 16, 0.5  , 0.0  , None      ,
    Fp8 , "fp8" ,  8, 0.25 , 0.005, None      ,
    Int8, "int8",  8, 0.25 , 0.015, None      ,
    Awq , "awq" ,  4, 0.125, 0.025, Some(0.05),
    Gptq, "gptq",  4, 0.125, 0.035, Some(0.05),
    Int4, "int4",  4, 0.125, 0.05 , Some(0.02),
}

impl QuantizationFormat {
    #[inline]
    pub fn bytes_per_param(self) -> f64 {
        self.bits_per_param() / 8.0
    }

    /// Declared overhead fraction, `0.0` when the format has none.
    #[inline]
    pub fn overhead_fraction(self) -> f64 {
        self.overhead().unwrap_or(0.0)
    }

    /// Element type used for activations and the KV cache when serving
    /// weights stored in this format. Weight-only schemes compute in fp16.
    pub fn compute_precision(self) -> QuantizationFormat {
        match self {
            Self::Fp32 => Self::Fp32,
            Self::Bf16 => Self::Bf16,
            Self::Fp8 => Self::Fp8,
            Self::Fp16 | Self::Int8 | Self::Awq | Self::Gptq | Self::Int4 => Self::Fp16,
        }
    }

    /// Value for the server's `--quantization` flag; `None` for plain float
    /// types which are selected through the dtype instead.
    pub fn vllm_quantization_arg(self) -> Option<&'static str> {
        match self {
            Self::Awq => Some("awq"),
            Self::Gptq => Some("gptq"),
            Self::Fp8 => Some("fp8"),
            Self::Int8 | Self::Int4 => Some("bitsandbytes"),
            Self::Fp32 | Self::Fp16 | Self::Bf16 => None,
        }
    }

    pub fn is_quantized(self) -> bool {
        self.bits_per_param() < 16.0
    }

    /// Catalog entry with the derived memory factor.
    pub fn info(self, include_overhead: bool) -> FormatInfo {
        let overhead = self.overhead_fraction();
        FormatInfo {
            format: self,
            bits_per_param: self.bits_per_param(),
            bytes_per_param: self.bytes_per_param(),
            memory_efficiency: self.memory_efficiency(),
            quality_loss: self.quality_loss(),
            overhead: self.overhead(),
            memory_factor: self.memory_efficiency()
                + if include_overhead { overhead } else { 0.0 },
        }
    }
}

impl FromStr for QuantizationFormat {
    type Err = VramError;

    /// Accepts catalog keys case-insensitively plus a few common spellings
    /// (`float16`, `half`, `bfloat16`, `4bit`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace(['-', '_', ' '], "");
        let format = match norm.as_str() {
            "fp32" | "float32" | "float" | "f32" => Self::Fp32,
            "fp16" | "float16" | "half" | "f16" => Self::Fp16,
            "bf16" | "bfloat16" => Self::Bf16,
            "fp8" | "float8" | "f8" => Self::Fp8,
            "int8" | "8bit" | "q8" | "bitsandbytes8bit" => Self::Int8,
            "awq" => Self::Awq,
            "gptq" => Self::Gptq,
            "int4" | "4bit" | "q4" | "nf4" => Self::Int4,
            _ => return Err(VramError::UnsupportedFormat(s.to_string())),
        };
        Ok(format)
    }
}

impl<'de> Deserialize<'de> for QuantizationFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for QuantizationFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// One catalog row as handed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FormatInfo {
    pub format: QuantizationFormat,
    pub bits_per_param: f64,
    pub bytes_per_param: f64,
    pub memory_efficiency: f64,
    pub quality_loss: f64,
    pub overhead: Option<f64>,
    pub memory_factor: f64,
}

/// Looks up `format` and computes its memory factor.
pub fn factor_of(format: &str, include_overhead: bool) -> VramResult<FormatInfo> {
    let format: QuantizationFormat = format.parse()?;
    Ok(format.info(include_overhead))
}

/// Catalog info for each key, sorted ascending by memory factor (overhead
/// included). Equal factors keep their input order.
pub fn compare<S: AsRef<str>>(formats: &[S]) -> VramResult<Vec<FormatInfo>> {
    let mut infos = formats
        .iter()
        .map(|f| factor_of(f.as_ref(), true))
        .collect::<VramResult<Vec<_>>>()?;
    infos.sort_by(|a, b| a.memory_factor.total_cmp(&b.memory_factor));
    Ok(infos)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    Minimal,
    Low,
    Moderate,
    High,
}

impl QualityLevel {
    fn from_loss(adjusted_loss: f64) -> Self {
        if adjusted_loss < 0.01 {
            Self::Minimal
        } else if adjusted_loss < 0.03 {
            Self::Low
        } else if adjusted_loss < 0.06 {
            Self::Moderate
        } else {
            Self::High
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Minimal => "Negligible quality difference from full precision",
            Self::Low => "Slight quality reduction, rarely noticeable",
            Self::Moderate => "Noticeable quality reduction on demanding tasks",
            Self::High => "Significant quality reduction; validate outputs before deploying",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityImpact {
    pub format: QuantizationFormat,
    pub base_loss: f64,
    pub size_adjustment: f64,
    pub adjusted_loss: f64,
    pub level: QualityLevel,
}

/// Smaller models degrade more under quantization: the base loss is scaled by
/// up to 1.5x for models below 7B parameters.
pub fn quality_impact(format: &str, model_size_b: f64) -> VramResult<QualityImpact> {
    let format: QuantizationFormat = format.parse()?;
    let model_size_b = crate::error::ensure_positive("model_size_b", model_size_b)?;

    let base_loss = format.quality_loss();
    let size_adjustment = (model_size_b / 7.0).clamp(0.5, 1.0);
    let adjusted_loss = base_loss * (2.0 - size_adjustment);

    Ok(QualityImpact {
        format,
        base_loss,
        size_adjustment,
        adjusted_loss,
        level: QualityLevel::from_loss(adjusted_loss),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_unique() {
        for i in 0..FORMATS.len() {
            for j in i + 1..FORMATS.len() {
                assert_ne!(FORMATS[i].0, FORMATS[j].0, "duplicate key detected");
            }
        }
    }

    #[test]
    fn catalog_ranges_hold() {
        for &(key, format) in FORMATS {
            let info = format.info(true);
            assert!(
                info.memory_factor > 0.0 && info.memory_factor <= 1.0,
                "{key} memory factor {}",
                info.memory_factor
            );
            assert!((0.0..=1.0).contains(&info.quality_loss), "{key} quality loss");
            assert!(
                info.memory_efficiency > 0.0 && info.memory_efficiency <= 1.0,
                "{key} efficiency"
            );
            assert_eq!(key.parse::<QuantizationFormat>().unwrap(), format);
        }
    }

    #[test]
    fn factor_with_and_without_overhead() {
        let awq = factor_of("awq", false).unwrap();
        assert_eq!(awq.memory_factor, 0.125);
        let awq = factor_of("AWQ", true).unwrap();
        assert!((awq.memory_factor - 0.175).abs() < 1e-9);
        assert_eq!(factor_of("fp16", true).unwrap().memory_factor, 0.5);
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert_eq!(
            factor_of("q9_k", true).unwrap_err(),
            VramError::UnsupportedFormat("q9_k".into())
        );
        assert!(compare(&["fp16", "nope"]).is_err());
    }

    #[test]
    fn compare_sorts_ascending() {
        let sorted = compare(&["fp32", "int4", "fp16", "awq"]).unwrap();
        let order: Vec<_> = sorted.iter().map(|i| i.format).collect();
        assert_eq!(
            order,
            vec![
                QuantizationFormat::Int4,
                QuantizationFormat::Awq,
                QuantizationFormat::Fp16,
                QuantizationFormat::Fp32
            ]
        );
    }

    #[test]
    fn quality_impact_scales_for_small_models() {
        let big = quality_impact("int4", 70.0).unwrap();
        assert_eq!(big.size_adjustment, 1.0);
        assert_eq!(big.adjusted_loss, 0.05);
        assert_eq!(big.level, QualityLevel::Moderate);

        let small = quality_impact("int4", 1.0).unwrap();
        assert_eq!(small.size_adjustment, 0.5);
        assert!((small.adjusted_loss - 0.075).abs() < 1e-12);
        assert_eq!(small.level, QualityLevel::High);

        assert_eq!(quality_impact("fp16", 7.0).unwrap().level, QualityLevel::Minimal);
        assert_eq!(quality_impact("awq", 13.0).unwrap().level, QualityLevel::Low);
    }

    #[test]
    fn aliases_parse_and_serde_uses_keys() {
        assert_eq!("float16".parse::<QuantizationFormat>().unwrap(), QuantizationFormat::Fp16);
        assert_eq!("BFloat16".parse::<QuantizationFormat>().unwrap(), QuantizationFormat::Bf16);
        assert_eq!("4-bit".parse::<QuantizationFormat>().unwrap(), QuantizationFormat::Int4);
        let json = serde_json::to_string(&QuantizationFormat::Gptq).unwrap();
        assert_eq!(json, "\"gptq\"");
        let back: QuantizationFormat = serde_json::from_str("\"half\"").unwrap();
        assert_eq!(back, QuantizationFormat::Fp16);
    }

    #[test]
    fn compute_precision_keeps_kv_in_half_for_weight_only_formats() {
        assert_eq!(QuantizationFormat::Awq.compute_precision(), QuantizationFormat::Fp16);
        assert_eq!(QuantizationFormat::Fp32.compute_precision(), QuantizationFormat::Fp32);
        assert_eq!(QuantizationFormat::Awq.vllm_quantization_arg(), Some("awq"));
        assert_eq!(QuantizationFormat::Fp16.vllm_quantization_arg(), None);
    }
}
