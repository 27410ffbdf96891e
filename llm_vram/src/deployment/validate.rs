use serde::Serialize;

use super::command::{ArgMap, ArgValue, VALID_BLOCK_SIZES};

/// Utilization above this leaves too little for CUDA graphs and the allocator.
pub const HIGH_UTILIZATION_WARNING: f64 = 0.95;
/// Sequence counts above this rarely help and stretch scheduler latency.
pub const HIGH_SEQS_WARNING: u64 = 512;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Checks presence, type and range of the server arguments. Problems are
/// reported in the result, never as an `Err`.
pub fn validate(args: &ArgMap) -> ValidationResult {
    let mut result = ValidationResult::default();

    match args.get("model") {
        Some(ArgValue::Text(model)) if !model.trim().is_empty() => {}
        Some(ArgValue::Text(_)) => result.error("model must not be empty"),
        Some(_) => result.error("model must be a string"),
        None => result.error("model is required"),
    }

    match args.get("gpuMemoryUtilization").map(ArgValue::as_f64) {
        None => result.error("gpuMemoryUtilization is required"),
        Some(None) => result.error("gpuMemoryUtilization must be a number"),
        Some(Some(util)) if !(util > 0.0 && util <= 1.0) => result.error(format!(
            "gpuMemoryUtilization must be in (0, 1], got {util}"
        )),
        Some(Some(util)) if util > HIGH_UTILIZATION_WARNING => result.warn(format!(
            "gpuMemoryUtilization {util} leaves little headroom; out-of-memory errors are likely under load"
        )),
        Some(Some(_)) => {}
    }

    match args.get("maxNumSeqs").map(ArgValue::as_u64) {
        None => result.error("maxNumSeqs is required"),
        Some(None) => result.error("maxNumSeqs must be a non-negative integer"),
        Some(Some(0)) => result.error("maxNumSeqs must be at least 1"),
        Some(Some(seqs)) if seqs > HIGH_SEQS_WARNING => result.warn(format!(
            "maxNumSeqs {seqs} is unusually high; scheduling overhead may dominate"
        )),
        Some(Some(_)) => {}
    }

    match args.get("blockSize").map(ArgValue::as_u64) {
        None => {}
        Some(Some(size)) if VALID_BLOCK_SIZES.contains(&size) => {}
        Some(_) => result.error(format!(
            "blockSize must be one of {VALID_BLOCK_SIZES:?}"
        )),
    }

    let chunked = args
        .get("enableChunkedPrefill")
        .and_then(ArgValue::as_flag)
        .unwrap_or(false);
    let tokens = args.get("maxNumBatchedTokens").map(ArgValue::as_u64);
    let model_len = args.get("maxModelLen").map(ArgValue::as_u64);
    match (tokens, model_len) {
        (Some(None), _) => result.error("maxNumBatchedTokens must be a non-negative integer"),
        (_, Some(None)) => result.error("maxModelLen must be a non-negative integer"),
        (Some(Some(0)), _) => result.error("maxNumBatchedTokens must be at least 1"),
        (Some(Some(tokens)), Some(Some(len))) if tokens < len && !chunked => result.error(format!(
            "maxNumBatchedTokens ({tokens}) must be at least maxModelLen ({len}) unless chunked prefill is enabled"
        )),
        _ => {}
    }

    if let Some(swap) = args.get("swapSpace") {
        match swap.as_f64() {
            Some(gb) if gb >= 0.0 => {}
            _ => result.error("swapSpace must be a non-negative number"),
        }
    }

    if let Some(tp) = args.get("tensorParallelSize") {
        match tp.as_u64() {
            Some(0) | None => result.error("tensorParallelSize must be a positive integer"),
            Some(n) if !n.is_power_of_two() => result.warn(format!(
                "tensorParallelSize {n} is not a power of two; most models shard evenly only on 1, 2, 4 or 8 GPUs"
            )),
            Some(_) => {}
        }
    }

    for flag in [
        "enableChunkedPrefill",
        "enablePrefixCaching",
        "disableLogStats",
        "enforceEager",
    ] {
        if let Some(value) = args.get(flag) {
            if value.as_flag().is_none() {
                result.error(format!("{flag} must be a boolean"));
            }
        }
    }

    result.is_valid = result.errors.is_empty();
    if !result.is_valid {
        tracing::debug!(errors = ?result.errors, "deployment configuration rejected");
    }
    result
}
