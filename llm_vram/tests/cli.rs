use predicates::prelude::*;

fn cli() -> anyhow::Result<assert_cmd::Command> {
    Ok(assert_cmd::Command::cargo_bin("llm-vram-cli")?)
}

/// Smoke-test that `--help` prints and exits 0.
#[test]
fn help_shows_usage() -> anyhow::Result<()> {
    cli()?
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: llm-vram-cli"));
    Ok(())
}

#[test]
fn breakdown_report() -> anyhow::Result<()> {
    cli()?
        .args(["breakdown", "--vram", "80", "--model-size", "13", "--batch-size", "32"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Model weights"))
        .stdout(predicate::str::contains("Supports model: true"));
    Ok(())
}

#[test]
fn recommend_quant_as_json() -> anyhow::Result<()> {
    let output = cli()?
        .args(["recommend-quant", "--vram", "8", "--params", "175", "--json"])
        .output()?;
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(value["can_fit"], false);
    assert!(value["reason"]
        .as_str()
        .is_some_and(|r| r.contains("too large")));
    Ok(())
}

#[test]
fn optimize_prints_a_server_command() -> anyhow::Result<()> {
    cli()?
        .args([
            "optimize",
            "--strategy",
            "throughput",
            "--vram",
            "160",
            "--params",
            "13",
            "--gpu-count",
            "2",
            "--model",
            "meta-llama/Llama-2-13b-hf",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "python -m vllm.entrypoints.openai.api_server --model meta-llama/Llama-2-13b-hf",
        ))
        .stdout(predicate::str::contains("--tensor-parallel-size 2"));
    Ok(())
}

#[test]
fn compare_reads_a_request_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("request.json");
    std::fs::write(
        &path,
        serde_json::json!({
            "gpu_specs": { "total_vram_gb": 80 },
            "model_specs": { "num_params": 7 },
            "workload_specs": { "workload_type": "batch" }
        })
        .to_string(),
    )?;
    cli()?
        .args(["compare", "--input"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Recommended: throughput"));
    Ok(())
}

#[test]
fn workload_falls_back_to_serving() -> anyhow::Result<()> {
    cli()?
        .args(["workload", "holographic", "--priority", "cost"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Unknown workload, using serving defaults"))
        .stdout(predicate::str::contains("awq weights"));
    Ok(())
}

#[test]
fn engine_errors_exit_non_zero() -> anyhow::Result<()> {
    cli()?
        .args(["optimize", "--vram", "8", "--params", "13"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must exceed"));

    cli()?
        .args(["breakdown", "--vram", "24", "--params", "7", "--quantization", "q3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported quantization format"));
    Ok(())
}

/// Conflicting flags trip clap before main().
#[test]
fn clap_argument_errors_reported() -> anyhow::Result<()> {
    cli()?
        .args(["optimize", "--strategy", "fastest", "--vram", "24", "--params", "7"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("unknown strategy"));
    Ok(())
}
