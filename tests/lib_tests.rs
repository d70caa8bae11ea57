use pairflow::utils::read_log;
use pairflow::{
    Arg, ItemStatus, Options, Pipeline, PipelineError, Step, StepConfig, StepError, StepOutcome,
};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_files(dir: &Path, names: &[String]) {
    fs::create_dir_all(dir).unwrap();
    for n in names {
        fs::write(dir.join(n), n.as_bytes()).unwrap();
    }
}

fn numbered(prefix: &str, ext: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{prefix}_{i:03}.{ext}")).collect()
}

/// Copies each input into the first output directory.
fn copy_first(args: &[Arg], out: &[PathBuf], _: &Options) -> anyhow::Result<Value> {
    let src = args[0].as_path().unwrap();
    let dst = out[0].join(src.file_name().unwrap());
    fs::copy(src, &dst)?;
    Ok(json!(dst))
}

/// Copies an (image, label) pair into two output directories.
fn copy_pair(args: &[Arg], out: &[PathBuf], _: &Options) -> anyhow::Result<Value> {
    if out.len() < 2 {
        anyhow::bail!("not enough output directories: {}", out.len());
    }
    let mut saved = Vec::new();
    for (arg, dir) in args.iter().zip(out) {
        let src = arg.as_path().unwrap();
        let dst = dir.join(src.file_name().unwrap());
        fs::copy(src, &dst)?;
        saved.push(dst);
    }
    Ok(json!(saved))
}

fn config(name: &str, inputs: &[&str], outputs: &[&str]) -> StepConfig {
    StepConfig {
        input_dirs: inputs.iter().map(PathBuf::from).collect(),
        output_dirs: outputs.iter().map(PathBuf::from).collect(),
        ..StepConfig::new(name)
    }
}

fn status_pairs(step: &Step) -> Vec<(Vec<Arg>, ItemStatus)> {
    let mut v: Vec<_> = step
        .log()
        .iter()
        .map(|e| (e.inputs.clone(), e.status))
        .collect();
    v.sort_by_key(|(inputs, _)| format!("{inputs:?}"));
    v
}

// --- end-to-end chaining ---

#[test]
fn test_two_step_chain_runs_end_to_end() {
    let tmp = TempDir::new().unwrap();
    write_files(&tmp.path().join("raw"), &numbered("img", "png", 4));

    let mut p = Pipeline::with_root(tmp.path());
    p.add(Step::new(config("stage", &["raw"], &["stage1"]), copy_first).unwrap())
        .unwrap();
    p.add(Step::new(config("final", &[], &["stage2"]), copy_first).unwrap())
        .unwrap();

    let outcomes = p.run(0, false).unwrap();
    assert_eq!(outcomes.len(), 2);
    for o in &outcomes {
        let s = o.summary().unwrap();
        assert_eq!(s.success, 4);
        assert_eq!(s.error_count(), 0);
    }
    assert_eq!(fs::read_dir(tmp.path().join("stage2")).unwrap().count(), 4);
}

#[test]
fn test_zip_pairs_images_with_labels() {
    let tmp = TempDir::new().unwrap();
    write_files(&tmp.path().join("images"), &numbered("a", "png", 5));
    write_files(&tmp.path().join("labels"), &numbered("a", "txt", 3));

    let cfg = StepConfig {
        pairing: "zip".into(),
        expected_outputs: Some(2),
        root_dir: Some(tmp.path().to_path_buf()),
        ..config("copy", &["images", "labels"], &["out/images", "out/labels"])
    };
    let mut step = Step::new(cfg, copy_pair).unwrap();
    let summary = step.run().unwrap();
    assert_eq!(summary.generated, 3);
    assert_eq!(summary.success, 3);

    let referenced: HashSet<String> = step
        .log()
        .iter()
        .flat_map(|e| e.inputs.iter())
        .filter_map(|a| a.as_path())
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert!(!referenced.contains("a_003.png"));
    assert!(!referenced.contains("a_004.png"));
    assert_eq!(step.log()[0].outputs.as_ref().unwrap().len(), 2);
}

// --- failure isolation ---

#[test]
fn test_one_failing_item_does_not_stop_the_batch() {
    let tmp = TempDir::new().unwrap();
    let names = numbered("img", "png", 10);
    write_files(&tmp.path().join("in"), &names);

    let fail_third = |args: &[Arg], out: &[PathBuf], opts: &Options| -> anyhow::Result<Value> {
        let name = args[0].as_path().unwrap().file_name().unwrap();
        if name == "img_002.png" {
            anyhow::bail!("cannot decode {}", name.to_string_lossy());
        }
        copy_first(args, out, opts)
    };
    let cfg = StepConfig {
        root_dir: Some(tmp.path().to_path_buf()),
        ..config("crop", &["in"], &["out"])
    };
    let mut step = Step::new(cfg, fail_third).unwrap();
    let summary = step.run().unwrap();

    assert_eq!(summary.generated, 10);
    assert_eq!(summary.success, 9);
    assert_eq!(summary.errors, 1);
    let failed = &step.log()[2];
    assert_eq!(failed.status, ItemStatus::Error);
    assert!(failed.error_message.as_deref().unwrap().contains("img_002.png"));
    for (i, e) in step.log().iter().enumerate() {
        if i != 2 {
            assert_eq!(e.status, ItemStatus::Success);
        }
    }
}

#[test]
fn test_worker_pool_matches_sequential() {
    let tmp = TempDir::new().unwrap();
    write_files(&tmp.path().join("in"), &numbered("img", "png", 100));

    let flaky = |args: &[Arg], out: &[PathBuf], opts: &Options| -> anyhow::Result<Value> {
        let stem = args[0].as_path().unwrap().file_stem().unwrap().to_string_lossy();
        let i: usize = stem.trim_start_matches("img_").parse()?;
        match i % 7 {
            0 => anyhow::bail!("unlucky"),
            3 => Ok(Value::Null),
            _ => copy_first(args, out, opts),
        }
    };
    let make = |name: &str, workers: usize| {
        let out = format!("out_{name}");
        let cfg = StepConfig {
            root_dir: Some(tmp.path().to_path_buf()),
            workers: Some(workers),
            ..config(name, &["in"], &[out.as_str()])
        };
        Step::new(cfg, flaky).unwrap()
    };
    let mut seq = make("seq", 1);
    let mut pool = make("pool", 4);
    seq.run().unwrap();
    pool.run().unwrap();

    assert_eq!(pool.log().len(), 100);
    assert_eq!(status_pairs(&seq), status_pairs(&pool));
}

// --- determinism ---

#[test]
fn test_seeded_modulo_reruns_identically() {
    let tmp = TempDir::new().unwrap();
    write_files(&tmp.path().join("backgrounds"), &numbered("bg", "png", 6));
    write_files(&tmp.path().join("overlays"), &numbered("ov", "png", 4));

    let pairs = |args: &[Arg], _: &[PathBuf], _: &Options| -> anyhow::Result<Value> {
        Ok(json!(args[1].as_path().unwrap()))
    };
    let cfg = StepConfig {
        pairing: "modulo".into(),
        seed: Some(1234),
        sample_k: Some(4),
        root_dir: Some(tmp.path().to_path_buf()),
        ..config("overlay", &["backgrounds", "overlays"], &["out"])
    };
    let mut step = Step::new(cfg, pairs).unwrap();
    step.run().unwrap();
    let first = step.log().to_vec();
    step.run().unwrap();
    assert_eq!(first, step.log());
    assert_eq!(first.len(), 4);
}

// --- preconditions and pipeline-level behavior ---

#[test]
fn test_missing_input_dir_is_reported_and_next_step_runs() {
    let tmp = TempDir::new().unwrap();
    write_files(&tmp.path().join("raw"), &numbered("img", "png", 2));

    let mut p = Pipeline::with_root(tmp.path());
    p.add(Step::new(config("broken", &["does_not_exist"], &["o1"]), copy_first).unwrap())
        .unwrap();
    p.add(Step::new(config("fine", &["raw"], &["o2"]), copy_first).unwrap())
        .unwrap();

    let outcomes = p.run(0, false).unwrap();
    match &outcomes[0] {
        StepOutcome::Failed { step, error } => {
            assert_eq!(step, "broken");
            assert!(matches!(error, StepError::DirectoryNotFound { .. }));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(p.steps()[0].log().is_empty());
    assert_eq!(outcomes[1].summary().unwrap().success, 2);
}

#[test]
fn test_run_range_selection() {
    let tmp = TempDir::new().unwrap();
    write_files(&tmp.path().join("raw"), &numbered("img", "png", 3));

    let mut p = Pipeline::with_root(tmp.path());
    p.add(Step::new(config("a", &["raw"], &["a"]), copy_first).unwrap())
        .unwrap();
    p.add(Step::new(config("b", &[], &["b"]), copy_first).unwrap())
        .unwrap();
    p.add(Step::new(config("c", &[], &["c"]), copy_first).unwrap())
        .unwrap();

    assert!(matches!(
        p.run(3, false),
        Err(PipelineError::StartIndexOutOfRange { index: 3, len: 3 })
    ));

    let only_a = p.run(0, true).unwrap();
    assert_eq!(only_a.len(), 1);
    assert!(!tmp.path().join("b").exists());

    let rest = p.run(1, false).unwrap();
    assert_eq!(rest.len(), 2);
    assert!(tmp.path().join("c").join("img_002.png").is_file());
}

#[test]
fn test_pre_cancelled_pipeline_runs_nothing() {
    let tmp = TempDir::new().unwrap();
    write_files(&tmp.path().join("raw"), &numbered("img", "png", 3));
    let mut p = Pipeline::with_root(tmp.path());
    p.add(Step::new(config("a", &["raw"], &["a"]), copy_first).unwrap())
        .unwrap();

    let cancel = pairflow::CancelToken::new();
    cancel.cancel();
    let outcomes = p.run_with_cancel(0, false, &cancel).unwrap();
    assert!(outcomes.is_empty());
}

// --- log persistence and settings ---

#[test]
fn test_logs_are_persisted_per_step() {
    let tmp = TempDir::new().unwrap();
    write_files(&tmp.path().join("raw"), &numbered("img", "png", 3));

    let mut p = Pipeline::with_root(tmp.path()).with_log_dir(tmp.path().join("logs"));
    p.add(Step::new(config("copy raw", &["raw"], &["out"]), copy_first).unwrap())
        .unwrap();
    p.run(0, false).unwrap();

    let path = tmp.path().join("logs").join("00_copy_raw.json");
    let log = read_log(&path).unwrap();
    assert_eq!(log, p.steps()[0].log());

    let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let first = &raw[0];
    assert!(first["inputs"][0].as_str().unwrap().ends_with("img_000.png"));
    assert!(first["outputs"][0].as_str().unwrap().ends_with("img_000.png"));
    assert_eq!(first["status"], "success");
    assert_eq!(first["error_message"], Value::Null);
}

#[test]
fn test_settings_file_applies_to_configured_steps() {
    let tmp = TempDir::new().unwrap();
    write_files(&tmp.path().join("raw"), &numbered("img", "png", 10));
    fs::write(
        tmp.path().join(".pairflow.toml"),
        r#"
            [settings]
            log_dir = "logs"

            [steps.subset]
            sample_k = 4
            seed = 9
            options = { quality = 80 }
        "#,
    )
    .unwrap();

    let check_option = |args: &[Arg], out: &[PathBuf], opts: &Options| -> anyhow::Result<Value> {
        if opts.get("quality") != Some(&json!(80)) {
            anyhow::bail!("quality option missing");
        }
        copy_first(args, out, opts)
    };
    let mut p = Pipeline::from_root_with_settings(tmp.path());
    p.add_configured(config("subset", &["raw"], &["out"]), check_option)
        .unwrap();
    let outcomes = p.run(0, false).unwrap();
    let s = outcomes[0].summary().unwrap();
    assert_eq!(s.generated, 4);
    assert_eq!(s.success, 4);
    assert!(tmp.path().join("logs").join("00_subset.json").is_file());
}

#[test]
fn test_add_configured_surfaces_step_errors() {
    let mut p = Pipeline::new();
    let err = p
        .add_configured(
            StepConfig {
                pairing: "custom".into(),
                ..config("c", &["/in"], &["/out"])
            },
            copy_first,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Step(StepError::MissingPairingFunction)
    ));
}

#[test]
fn test_run_interruptible_completes_without_signal() {
    pairflow::utils::setup_logging(false);
    // second call is a no-op
    pairflow::utils::setup_logging(true);

    let tmp = TempDir::new().unwrap();
    write_files(&tmp.path().join("raw"), &numbered("img", "png", 3));
    let mut p = Pipeline::with_root(tmp.path());
    p.add(Step::new(config("copy", &["raw"], &["out"]), copy_first).unwrap())
        .unwrap();

    let outcomes = pairflow::run_interruptible(&mut p, 0, false).unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].summary().unwrap().success, 3);
}

#[test]
fn test_sample_strategy_flags_subsets_through_pipeline() {
    let tmp = TempDir::new().unwrap();
    write_files(&tmp.path().join("renders"), &numbered("r", "png", 10));

    // passes the two effect flags back as the "output"
    let flags = |args: &[Arg], _: &[PathBuf], _: &Options| -> anyhow::Result<Value> {
        let blur = args[1].as_flag().unwrap();
        let noise = args[2].as_flag().unwrap();
        Ok(json!(format!("{}/{}", blur, noise)))
    };
    let cfg = StepConfig {
        pairing: "sample".into(),
        sample_ratios: Some((0.3, 0.5)),
        seed: Some(42),
        ..config("effects", &["renders"], &["out"])
    };
    let mut p = Pipeline::with_root(tmp.path());
    p.add(Step::new(cfg, flags).unwrap()).unwrap();
    let outcomes = p.run(0, false).unwrap();
    assert_eq!(outcomes[0].summary().unwrap().success, 10);

    let log = p.steps()[0].log();
    assert!(log.iter().all(|e| e.inputs.len() == 3));
    let blurred = log.iter().filter(|e| e.inputs[1] == Arg::Flag(true)).count();
    let noisy = log.iter().filter(|e| e.inputs[2] == Arg::Flag(true)).count();
    assert_eq!(blurred, 3);
    assert_eq!(noisy, 5);
}

#[test]
fn test_seeded_pool_step_reruns_with_same_pairs() {
    let tmp = TempDir::new().unwrap();
    write_files(&tmp.path().join("backgrounds"), &numbered("bg", "png", 12));
    write_files(&tmp.path().join("overlays"), &numbered("ov", "png", 5));

    let pairs = |args: &[Arg], _: &[PathBuf], _: &Options| -> anyhow::Result<Value> {
        Ok(json!(args[1].as_path().unwrap()))
    };
    let cfg = StepConfig {
        pairing: "modulo".into(),
        seed: Some(77),
        sample_k: Some(4),
        workers: Some(4),
        root_dir: Some(tmp.path().to_path_buf()),
        ..config("paste", &["backgrounds", "overlays"], &["out"])
    };
    let mut step = Step::new(cfg, pairs).unwrap();

    let snapshot = |step: &Step| {
        let mut v: Vec<String> = step
            .log()
            .iter()
            .map(|e| format!("{:?} -> {:?}", e.inputs, e.outputs))
            .collect();
        v.sort();
        v
    };
    step.run().unwrap();
    let first = snapshot(&step);
    step.run().unwrap();
    let second = snapshot(&step);

    assert_eq!(first.len(), 4);
    assert_eq!(first, second);
}

#[test]
fn test_verbose_setting_is_read_from_settings_file() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join(".pairflow.toml"),
        "[settings]\nverbose = true\n",
    )
    .unwrap();
    let p = Pipeline::from_root_with_settings(tmp.path());
    assert!(pairflow::utils::verbose_from(p.settings()));
    assert!(!pairflow::utils::verbose_from(Pipeline::new().settings()));
}

#[test]
fn test_repeated_step_names_chain_normally() {
    let tmp = TempDir::new().unwrap();
    write_files(&tmp.path().join("raw"), &numbered("img", "png", 2));
    let mut p = Pipeline::with_root(tmp.path());
    p.add(Step::new(config("crop", &["raw"], &["crop1"]), copy_first).unwrap())
        .unwrap();
    p.add(Step::new(config("crop", &[], &["crop2"]), copy_first).unwrap())
        .unwrap();

    let outcomes = p.run(0, false).unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(tmp.path().join("crop2").join("img_001.png").is_file());
}
