mod calibration;
mod memory;
mod planning;

#[allow(unused_imports)]
use anyhow::{anyhow, bail, Error, Result};
use llm_vram::RawOptimizationParams;

pub(crate) fn request(value: serde_json::Value) -> Result<RawOptimizationParams> {
    Ok(RawOptimizationParams::from_value(value)?)
}

pub(crate) fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-3
}
