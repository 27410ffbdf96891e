//! ## Memory-sizing primitives for LLM serving
//!
//! Independent, allocation-free formulas, each answering one question about
//! the device memory a served model needs. All sizes are **GB (2³⁰ bytes)**.
//!
//! ### Formulas (summary)
//!
//! ```text
//! weights        = P · bytes_per_param(q) + P · overhead(q)
//! kv_cache       = 2 · B · S · L · H · bytes(p) / 2³⁰
//! activations    = B · S · H · L · bytes(p) · 12 / 2³⁰
//! system         = 0.5 + 0.05 · weights + 0.1 · (B − 1)
//! fragmentation  = max(0.1, V · rate(V) · clamp(B/32, .5, 2)
//!                          · clamp(S/2048, .8, 1.5) · (1 + overhead(q)))
//! reserved       = clip(V · r(priority), 0.5, min(8, 0.15 · V))
//! swap           = clip(V · s(priority, workload),
//!                       max(1, 0.1 · weights), min(16, 0.25 · V))
//!
//!   P – parameters (billions)   B – batch size (sequences)
//!   S – sequence length          L – layers      H – hidden size
//!   V – total VRAM (GB)          q – weight format, p – element precision
//! ```
//!
//! Every input must be strictly positive; anything else is a
//! [`crate::error::VramError::Validation`]. Nothing is clamped silently.
//!
//! The `12` in the activation formula and the fragmentation tiers are
//! calibration constants, see [`Calibration`].

use crate::{
    error::{ensure_nonzero, ensure_positive, VramResult},
    memory::calibration::Calibration,
    quantization::QuantizationFormat,
    types::{AllocationPriority, WorkloadType},
};

pub const BYTES_PER_GB: f64 = 1_073_741_824.0;

/// Weight footprint of `num_params_b` billion parameters stored as `format`.
pub fn weights_memory(num_params_b: f64, format: QuantizationFormat) -> VramResult<f64> {
    let num_params_b = ensure_positive("num_params", num_params_b)?;
    let base = num_params_b * format.bytes_per_param();
    let overhead_gb = format
        .overhead()
        .map(|fraction| num_params_b * fraction)
        .unwrap_or(0.0);
    Ok(base + overhead_gb)
}

/// Key/value cache for `batch_size` sequences of `max_seq_len` tokens.
///
/// `num_heads` is validated but does not change the total: for dense
/// multi-head attention `heads · head_dim == hidden_size`.
pub fn kv_cache_memory(
    batch_size: u64,
    max_seq_len: u64,
    layers: u64,
    hidden_size: u64,
    num_heads: u64,
    precision: QuantizationFormat,
) -> VramResult<f64> {
    let b = ensure_nonzero("batch_size", batch_size)? as f64;
    let s = ensure_nonzero("max_seq_len", max_seq_len)? as f64;
    let l = ensure_nonzero("layers", layers)? as f64;
    let h = ensure_nonzero("hidden_size", hidden_size)? as f64;
    ensure_nonzero("num_heads", num_heads)?;

    Ok(2.0 * b * s * l * h * precision.bytes_per_param() / BYTES_PER_GB)
}

/// Peak activation buffers, using the default calibration.
pub fn activation_memory(
    batch_size: u64,
    seq_len: u64,
    hidden_size: u64,
    layers: u64,
    precision: QuantizationFormat,
) -> VramResult<f64> {
    Calibration::default().activation_memory(batch_size, seq_len, hidden_size, layers, precision)
}

/// CUDA context, allocator pools and per-sequence scheduler state.
pub fn system_overhead(model_memory_gb: f64, batch_size: u64) -> VramResult<f64> {
    let model_memory_gb = ensure_positive("model_memory_gb", model_memory_gb)?;
    let b = ensure_nonzero("batch_size", batch_size)? as f64;
    Ok(0.5 + 0.05 * model_memory_gb + 0.1 * (b - 1.0))
}

/// Memory lost to allocator fragmentation, using the default calibration.
pub fn fragmentation(
    total_vram_gb: f64,
    batch_size: u64,
    max_seq_len: u64,
    quantization: Option<QuantizationFormat>,
) -> VramResult<f64> {
    Calibration::default().fragmentation(total_vram_gb, batch_size, max_seq_len, quantization)
}

/// Headroom kept free for driver allocations and spikes.
pub fn reserved_memory(total_vram_gb: f64, priority: AllocationPriority) -> VramResult<f64> {
    let total_vram_gb = ensure_positive("total_vram_gb", total_vram_gb)?;
    let rate = match priority {
        AllocationPriority::Throughput => 0.03,
        AllocationPriority::Balanced => 0.05,
        AllocationPriority::Latency => 0.08,
        AllocationPriority::Conservative => 0.10,
    };
    let upper = 8.0_f64.min(total_vram_gb * 0.15);
    Ok(clip(total_vram_gb * rate, 0.5, upper))
}

/// CPU swap space for preempted sequences.
pub fn optimal_swap_space(
    total_vram_gb: f64,
    model_size_gb: f64,
    priority: AllocationPriority,
    workload_type: WorkloadType,
) -> VramResult<f64> {
    let total_vram_gb = ensure_positive("total_vram_gb", total_vram_gb)?;
    let model_size_gb = ensure_positive("model_size_gb", model_size_gb)?;
    let ratio = match priority {
        AllocationPriority::Latency => 0.05,
        AllocationPriority::Balanced | AllocationPriority::Conservative => 0.10,
        AllocationPriority::Throughput if workload_type.is_batch() => 0.20,
        AllocationPriority::Throughput => 0.15,
    };
    let lower = 1.0_f64.max(model_size_gb * 0.10);
    let upper = 16.0_f64.min(total_vram_gb * 0.25);
    Ok(clip(total_vram_gb * ratio, lower, upper))
}

/// `value` clamped to `[lower, upper]`; when the bounds cross the upper bound
/// wins, so the result never exceeds what the device can spare.
fn clip(value: f64, lower: f64, upper: f64) -> f64 {
    value.max(lower).min(upper)
}

impl Calibration {
    pub fn activation_memory(
        &self,
        batch_size: u64,
        seq_len: u64,
        hidden_size: u64,
        layers: u64,
        precision: QuantizationFormat,
    ) -> VramResult<f64> {
        let b = ensure_nonzero("batch_size", batch_size)? as f64;
        let s = ensure_nonzero("seq_len", seq_len)? as f64;
        let h = ensure_nonzero("hidden_size", hidden_size)? as f64;
        let l = ensure_nonzero("layers", layers)? as f64;

        Ok(b * s * h * l * precision.bytes_per_param() * self.activation_multiplier / BYTES_PER_GB)
    }

    pub fn fragmentation(
        &self,
        total_vram_gb: f64,
        batch_size: u64,
        max_seq_len: u64,
        quantization: Option<QuantizationFormat>,
    ) -> VramResult<f64> {
        let total_vram_gb = ensure_positive("total_vram_gb", total_vram_gb)?;
        let b = ensure_nonzero("batch_size", batch_size)? as f64;
        let s = ensure_nonzero("max_seq_len", max_seq_len)? as f64;

        let batch_factor = (b / 32.0).clamp(0.5, 2.0);
        let seq_factor = (s / 2048.0).clamp(0.8, 1.5);
        let alignment_factor = 1.0 + quantization.map(|q| q.overhead_fraction()).unwrap_or(0.0);

        let estimate = total_vram_gb
            * self.fragmentation_rate(total_vram_gb)
            * batch_factor
            * seq_factor
            * alignment_factor;
        Ok(estimate.max(self.fragmentation_floor_gb))
    }
}
