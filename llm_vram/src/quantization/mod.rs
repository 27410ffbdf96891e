mod catalog;
mod recommend;

pub use catalog::{
    compare, factor_of, quality_impact, FormatInfo, QualityImpact, QualityLevel,
    QuantizationFormat, FORMATS,
};
pub use recommend::{
    recommend, FormatFit, QuantizationRecommendation, RecommendOptions, RECOMMENDATION_PRIORITY,
    USABLE_VRAM_SHARE,
};
