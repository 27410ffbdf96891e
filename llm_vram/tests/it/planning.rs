use llm_vram::*;
use serde_json::json;

use crate::request;

#[test]
fn strategies_are_ordered_for_default_selectors() -> crate::Result<()> {
    for (vram, params, quantization) in [
        (24.0, 7.0, "fp16"),
        (48.0, 13.0, "fp16"),
        (80.0, 7.0, "awq"),
        (160.0, 34.0, "fp16"),
        (80.0, 70.0, "gptq"),
    ] {
        let req = request(json!({
            "totalVRAMGB": vram, "numParams": params, "quantization": quantization
        }))?;
        let t = StrategyKind::Throughput.optimized_config(&req)?;
        let l = StrategyKind::Latency.optimized_config(&req)?;
        let b = StrategyKind::Balanced.optimized_config(&req)?;

        assert!(l.batch.max_num_seqs <= b.batch.max_num_seqs, "{vram}/{params}");
        assert!(b.batch.max_num_seqs <= t.batch.max_num_seqs, "{vram}/{params}");
        assert!(l.memory.gpu_memory_utilization <= b.memory.gpu_memory_utilization);
        assert!(b.memory.gpu_memory_utilization <= t.memory.gpu_memory_utilization);

        for config in [&t, &l, &b] {
            assert!(config.validation.is_valid, "{:?}", config.validation);
            assert!(config.batch.max_num_seqs >= 1);
            assert!(config.performance.tokens_per_second > 0.0);
        }
    }
    Ok(())
}

#[test]
fn command_reflects_the_argument_map() -> crate::Result<()> {
    let req = request(json!({
        "gpu_specs": { "total_vram_gb": 160, "gpu_count": 2, "memory_bandwidth_gbps": 2039 },
        "model_specs": { "num_params": 34, "model_path": "codellama/CodeLlama-34b-hf" },
        "workload_specs": { "workload_type": "batch", "max_seq_len": 4096 }
    }))?;
    let config = StrategyKind::Throughput.optimized_config(&req)?;

    assert_eq!(config.command, serialize_command(&config.parameters));
    assert!(config.command.contains("--model codellama/CodeLlama-34b-hf"));
    assert!(config.command.contains("--max-model-len 4096"));
    assert!(config.command.contains("--tensor-parallel-size 2"));
    assert!(config.command.contains("--preemption-mode swap"));
    assert!(config.command.contains("--gpu-memory-utilization 0.95"));
    let swap = ArgValue::Float(config.memory.swap_space_gb);
    assert!(config.command.contains(&format!(" --swap-space {swap}GB ")));
    // batch jobs do not share prefixes
    assert!(!config.command.contains("--enable-prefix-caching"));

    // every key in the map shows up in order, except switched-off flags
    let mut cursor = 0;
    for (key, value) in config.parameters.iter() {
        if value == &ArgValue::Flag(false) {
            continue;
        }
        let flag = format!("--{}", deployment::kebab_case(key));
        let at = config.command[cursor..]
            .find(&flag)
            .ok_or_else(|| anyhow::anyhow!("{flag} missing or out of order"))?;
        cursor += at + flag.len();
    }
    Ok(())
}

#[test]
fn comparison_prefers_the_workload_strategy() -> crate::Result<()> {
    let cases = [
        ("batch", StrategyKind::Throughput),
        ("chat", StrategyKind::Latency),
        ("realtime", StrategyKind::Latency),
        ("serving", StrategyKind::Balanced),
        ("web-api", StrategyKind::Balanced),
    ];
    for (workload, expected) in cases {
        let comparison = compare_strategies(
            &request(json!({ "totalVRAMGB": 80, "numParams": 13, "workloadType": workload }))?,
            &Calibration::default(),
        )?;
        assert_eq!(comparison.recommended, Some(expected), "{workload}");
        let config = comparison
            .recommended_config()
            .ok_or_else(|| anyhow::anyhow!("no config for {workload}"))?;
        assert_eq!(config.strategy, expected);
    }
    Ok(())
}

#[test]
fn comparison_recommends_nothing_when_no_strategy_fits() -> crate::Result<()> {
    let comparison = compare_strategies(
        &request(json!({ "totalVRAMGB": 40, "numParams": 34, "workloadType": "chat" }))?,
        &Calibration::default(),
    )?;
    assert_eq!(comparison.recommended, None);
    assert!(comparison.results.iter().all(|o| !o.viable));
    assert!(comparison
        .results
        .iter()
        .all(|o| o.error.as_deref().is_some_and(|e| e.contains("must exceed"))));
    Ok(())
}

#[test]
fn unknown_workload_names_plan_as_serving() -> crate::Result<()> {
    let req = request(json!({ "totalVRAMGB": 80, "numParams": 7, "workloadType": "summarization" }))?;
    assert_eq!(normalize(&req)?.workload.workload_type, WorkloadType::Serving);

    let config = optimized_config(StrategyKind::Balanced, &req, &Calibration::default())?;
    assert!(config.validation.is_valid);

    let comparison = compare_strategies(&req, &Calibration::default())?;
    assert_eq!(comparison.recommended, Some(StrategyKind::Balanced));
    assert!(comparison.reason.contains("serving"));
    Ok(())
}

#[test]
fn flat_and_structured_requests_agree() -> crate::Result<()> {
    let flat = request(json!({
        "totalVRAMGB": 48, "numParams": 13, "quantization": "awq", "workloadType": "chat"
    }))?;
    let structured = request(json!({
        "gpuSpecs": { "totalVRAMGB": 48 },
        "modelSpecs": { "numParams": 13, "quantization": "awq" },
        "workloadSpecs": { "workloadType": "chat" }
    }))?;
    assert_eq!(normalize(&flat)?, normalize(&structured)?);

    let a = StrategyKind::Balanced.optimized_config(&flat)?;
    let b = StrategyKind::Balanced.optimized_config(&structured)?;
    assert_eq!(a.command, b.command);
    assert!(a.command.contains("--quantization awq"));
    Ok(())
}

#[test]
fn validation_catches_hand_edited_maps() -> crate::Result<()> {
    let config = StrategyKind::Latency.optimized_config(&request(json!({
        "totalVRAMGB": 24, "numParams": 7
    }))?)?;
    assert!(config.validation.is_valid);

    let mut edited = config.parameters.clone();
    edited
        .set("gpuMemoryUtilization", 1.5)
        .set("blockSize", 64u64)
        .set("tensorParallelSize", 6u64);
    let result = validate(&edited);
    assert!(!result.is_valid);
    assert_eq!(result.errors.len(), 2);
    assert_eq!(result.warnings.len(), 1);
    Ok(())
}

#[test]
fn workload_profiles_drive_server_settings() -> crate::Result<()> {
    let chat = optimize_for(
        OptimizationKind::Workload,
        &WorkloadProfile {
            workload_type: "chat".into(),
            peak_concurrency: Some(12),
            ..Default::default()
        },
    )?;
    assert_eq!(chat.strategy, StrategyKind::Latency);
    assert_eq!(chat.max_num_seqs, 12);
    assert!(!chat.fell_back);

    let unknown = optimize_for(
        OptimizationKind::Workload,
        &WorkloadProfile {
            workload_type: "quantum-annealing".into(),
            priorities: vec!["quality".into()],
            ..Default::default()
        },
    )?;
    assert!(unknown.fell_back);
    assert_eq!(unknown.workload_type, WorkloadType::Serving);
    assert_eq!(unknown.quantization, QuantizationFormat::Fp16);

    let cheap: WorkloadProfile = serde_json::from_value(json!({
        "workloadType": "serving",
        "averageInputLength": 4096,
        "priorities": ["cost"]
    }))?;
    let cheap = optimize_for(OptimizationKind::Balance, &cheap)?;
    assert_eq!(cheap.quantization, QuantizationFormat::Awq);
    assert!(cheap.flags.chunked_prefill);
    Ok(())
}
