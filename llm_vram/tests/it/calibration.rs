use llm_vram::*;
use serde_json::json;

use crate::request;

fn activations_gb(calibration: Calibration) -> crate::Result<f64> {
    let report = breakdown(
        &BreakdownConfig::builder()
            .total_vram_gb(48.0)
            .num_params(13.0)
            .batch_size(4)
            .calibration(calibration)
            .build(),
    )?;
    Ok(report.components.activations.size_gb)
}

#[test]
fn calibration_file_overrides_defaults() -> crate::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("calibration.toml");
    std::fs::write(
        &path,
        "activation_multiplier = 24.0\nbandwidth_efficiency = 0.6\n",
    )?;

    let calibration = Calibration::load_path(&path)?;
    let defaults = Calibration::default();
    assert_eq!(calibration.activation_multiplier, 24.0);
    assert_eq!(calibration.bandwidth_efficiency, 0.6);
    // fields left out of the file keep their defaults
    assert_eq!(calibration.compute_efficiency, defaults.compute_efficiency);
    assert_eq!(calibration.fragmentation_tiers, defaults.fragmentation_tiers);

    let doubled = activations_gb(calibration.clone())?;
    let base = activations_gb(defaults.clone())?;
    assert!(crate::approx(doubled, 2.0 * base));

    // lower bandwidth efficiency slows bandwidth-bound decode
    let req = request(json!({ "totalVRAMGB": 80, "numParams": 7 }))?;
    let slow = optimized_config(StrategyKind::Throughput, &req, &calibration)?;
    let fast = optimized_config(StrategyKind::Throughput, &req, &defaults)?;
    assert!(slow.performance.tokens_per_second < fast.performance.tokens_per_second);
    Ok(())
}

#[test]
fn missing_calibration_file_is_created_with_defaults() -> crate::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("fresh.toml");
    let calibration = Calibration::load_path(&path)?;
    assert_eq!(calibration, Calibration::default());
    assert!(path.exists());
    Ok(())
}

#[test]
fn out_of_range_calibration_is_rejected() -> crate::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "compute_efficiency = 1.5\n")?;
    assert!(matches!(
        Calibration::load_path(&path),
        Err(VramError::Validation { field: "compute_efficiency", .. })
    ));

    std::fs::write(&path, "activation_multiplier = \"lots\"\n")?;
    assert!(Calibration::load_path(&path).is_err());
    Ok(())
}
