use llm_vram::{
    memory::{kv_cache_memory, weights_memory},
    quantization::FORMATS,
    *,
};

use crate::approx;

#[test]
fn breakdown_invariants_hold_across_formats_and_pools() -> crate::Result<()> {
    for (_, format) in FORMATS {
        for (vram, params, batch) in [(24.0, 7.0, 1), (80.0, 13.0, 32), (48.0, 34.0, 4), (16.0, 13.0, 8)] {
            let report = breakdown(
                &BreakdownConfig::builder()
                    .total_vram_gb(vram)
                    .num_params(params)
                    .quantization(*format)
                    .batch_size(batch)
                    .build(),
            )?;
            let c = &report.components;
            let s = &report.summary;
            let used = c.model_weights.size_gb
                + c.kv_cache.size_gb
                + c.activations.size_gb
                + c.system_overhead.size_gb
                + c.fragmentation.size_gb;
            assert!(approx(s.used_memory, used), "{format} {vram}/{params}");
            assert!(approx(
                s.total_allocated,
                used + c.swap.size_gb + c.reserved.size_gb
            ));
            assert_eq!(
                report.compatibility.supports_model,
                s.total_allocated <= vram,
                "{format} {vram}/{params}"
            );
            assert!(s.available_memory >= 0.0);
            assert!(approx(
                c.model_weights.percentage,
                c.model_weights.size_gb / vram * 100.0
            ));
        }
    }
    Ok(())
}

#[test]
fn thirteen_gb_model_serves_thirty_two_sequences_on_eighty_gb() -> crate::Result<()> {
    let report = breakdown(
        &BreakdownConfig::builder()
            .total_vram_gb(80.0)
            .model_size_gb(13.0)
            .quantization(QuantizationFormat::Fp16)
            .batch_size(32)
            .max_seq_len(2048)
            .build(),
    )?;
    assert!(report.compatibility.supports_model);
    assert!(report.compatibility.safety_margin_gb > 0.0);
    Ok(())
}

#[test]
fn weights_and_kv_scale_linearly() -> crate::Result<()> {
    assert!(approx(weights_memory(7.0, QuantizationFormat::Fp16)?, 14.0));
    assert!(approx(weights_memory(7.0, QuantizationFormat::Fp32)?, 28.0));
    for (_, format) in FORMATS {
        let one = weights_memory(10.0, *format)?;
        let two = weights_memory(20.0, *format)?;
        assert!(approx(two, 2.0 * one), "{format}");
    }

    let base = kv_cache_memory(4, 1024, 32, 4096, 32, QuantizationFormat::Fp16)?;
    let double_batch = kv_cache_memory(8, 1024, 32, 4096, 32, QuantizationFormat::Fp16)?;
    let double_seq = kv_cache_memory(4, 2048, 32, 4096, 32, QuantizationFormat::Fp16)?;
    let both = kv_cache_memory(8, 2048, 32, 4096, 32, QuantizationFormat::Fp16)?;
    assert!(approx(double_batch, 2.0 * base));
    assert!(approx(double_seq, 2.0 * base));
    assert!(approx(both, 4.0 * base));
    Ok(())
}

#[test]
fn recommendation_reports_models_that_never_fit() -> crate::Result<()> {
    let rec = recommend(8.0, 175.0, RecommendOptions::default())?;
    assert!(!rec.can_fit);
    assert!(rec.reason.to_lowercase().contains("too large"));
    assert_eq!(rec.evaluated.len(), 5);

    Ok(())
}

#[test]
fn recommendation_keeps_fp16_only_when_it_fits_the_usable_share() -> crate::Result<()> {
    let rec = recommend(32.0, 7.0, RecommendOptions::default())?;
    assert!(rec.can_fit);
    assert_eq!(rec.format, QuantizationFormat::Fp16);

    // fp16 7B needs ~22.2 GB but 24 GB leaves only 21.6 GB usable
    let rec = recommend(24.0, 7.0, RecommendOptions::default())?;
    assert!(rec.can_fit);
    assert_eq!(rec.format, QuantizationFormat::Awq);
    Ok(())
}

#[test]
fn quantizing_shrinks_the_breakdown() -> crate::Result<()> {
    let run = |format| {
        breakdown(
            &BreakdownConfig::builder()
                .total_vram_gb(32.0)
                .num_params(13.0)
                .quantization(format)
                .build(),
        )
    };
    let fp16 = run(QuantizationFormat::Fp16)?;
    let awq = run(QuantizationFormat::Awq)?;
    assert!(!fp16.compatibility.supports_model);
    assert!(awq.compatibility.supports_model);
    assert!(awq.summary.used_memory < fp16.summary.used_memory);
    assert!(awq.memory_pressure.level < fp16.memory_pressure.level);
    Ok(())
}

#[test]
fn invalid_inputs_are_rejected() {
    assert!(weights_memory(0.0, QuantizationFormat::Fp16).is_err());
    assert!(kv_cache_memory(0, 2048, 32, 4096, 32, QuantizationFormat::Fp16).is_err());
    assert!(matches!(
        "q5_k_m".parse::<QuantizationFormat>(),
        Err(VramError::UnsupportedFormat(_))
    ));
    assert!(breakdown(&BreakdownConfig::builder().total_vram_gb(24.0).build()).is_err());
}
