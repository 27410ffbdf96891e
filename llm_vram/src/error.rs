// top-level error for the public API

#[derive(serde::Serialize, Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum VramError {
    /* ────── malformed or out-of-range input ────── */
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /* ────── quantization key not in the catalog ────── */
    #[error("unsupported quantization format '{0}'")]
    UnsupportedFormat(String),

    /* ────── structurally impossible combination ────── */
    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type VramResult<T> = std::result::Result<T, VramError>;

impl VramError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }
}

/// Fails with [`VramError::Validation`] unless `value` is finite and `> 0`.
pub(crate) fn ensure_positive(field: &'static str, value: f64) -> VramResult<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(VramError::validation(
            field,
            format!("must be a positive number, got {value}"),
        ))
    }
}

/// Integer flavour of [`ensure_positive`].
pub(crate) fn ensure_nonzero(field: &'static str, value: u64) -> VramResult<u64> {
    if value > 0 {
        Ok(value)
    } else {
        Err(VramError::validation(field, "must be greater than zero"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_guard_rejects_zero_negative_and_nan() {
        assert!(ensure_positive("x", 1.5).is_ok());
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = ensure_positive("x", bad).unwrap_err();
            assert!(matches!(err, VramError::Validation { field: "x", .. }));
        }
        assert!(ensure_nonzero("n", 0).is_err());
    }

    #[test]
    fn errors_render_their_context() {
        let err = VramError::validation("batch_size", "must be greater than zero");
        assert_eq!(
            err.to_string(),
            "invalid batch_size: must be greater than zero"
        );
        assert_eq!(
            VramError::UnsupportedFormat("q9".into()).to_string(),
            "unsupported quantization format 'q9'"
        );
    }
}
