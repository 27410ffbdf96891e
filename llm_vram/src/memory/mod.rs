pub mod breakdown;
pub mod calibration;
pub mod pressure;
pub mod primitives;

pub use breakdown::{
    breakdown, BreakdownConfig, Compatibility, MemoryBreakdown, MemoryComponent, MemoryComponents,
    MemorySummary,
};
pub use calibration::{Calibration, FragmentationTier};
pub use pressure::{MemoryPressure, PressureLevel};
pub use primitives::{
    activation_memory, fragmentation, kv_cache_memory, optimal_swap_space, reserved_memory,
    system_overhead, weights_memory, BYTES_PER_GB,
};
