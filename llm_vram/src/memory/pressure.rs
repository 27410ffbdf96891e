use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum PressureLevel {
    #[serde(rename = "Very Low")]
    VeryLow,
    Low,
    Moderate,
    High,
    Critical,
}

impl PressureLevel {
    pub fn from_utilization(utilization_percent: f64) -> Self {
        if utilization_percent >= 95.0 {
            Self::Critical
        } else if utilization_percent >= 90.0 {
            Self::High
        } else if utilization_percent >= 80.0 {
            Self::Moderate
        } else if utilization_percent >= 60.0 {
            Self::Low
        } else {
            Self::VeryLow
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::VeryLow => "Very Low",
            Self::Low => "Low",
            Self::Moderate => "Moderate",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }

    pub fn is_stable(self) -> bool {
        self <= Self::Moderate
    }

    /// Moderate pressure is stable but leaves nothing to grow into.
    pub fn has_headroom(self) -> bool {
        self <= Self::Low
    }

    pub fn recommendations(self) -> &'static [&'static str] {
        match self {
            Self::Critical => CRITICAL,
            Self::High => HIGH,
            Self::Moderate => MODERATE,
            Self::Low => LOW,
            Self::VeryLow => VERY_LOW,
        }
    }
}

pub const CRITICAL: &[&str] = &[
    "Reduce batch size or maximum sequence length immediately",
    "Switch to a more aggressive quantization format (awq, gptq or int4)",
    "Add GPUs and enable tensor parallelism",
];

pub const HIGH: &[&str] = &[
    "Lower gpu-memory-utilization to leave allocator headroom",
    "Consider a quantized format to free KV cache space",
    "Monitor for out-of-memory errors under peak load",
];

pub const MODERATE: &[&str] = &[
    "Configuration is workable; watch peak concurrency",
    "Keep swap space enabled to absorb preemption bursts",
];

pub const LOW: &[&str] = &[
    "Memory is comfortably provisioned",
    "Batch size or context length can be raised for more throughput",
];

pub const VERY_LOW: &[&str] = &[
    "GPU memory is underutilized",
    "Increase batch size or serve a larger model",
    "A smaller GPU may be sufficient for this model",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryPressure {
    pub level: PressureLevel,
    pub stable: bool,
    pub has_headroom: bool,
    pub recommendations: &'static [&'static str],
}

impl MemoryPressure {
    pub fn classify(utilization_percent: f64) -> Self {
        let level = PressureLevel::from_utilization(utilization_percent);
        Self {
            level,
            stable: level.is_stable(),
            has_headroom: level.has_headroom(),
            recommendations: level.recommendations(),
        }
    }
}
