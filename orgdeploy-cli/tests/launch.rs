use predicates::prelude::*;

mod common;

#[test]
fn test_launch_writes_into_output_dir() {
    let mut ctx = common::orgdeploy();
    ctx.env.create_serving_root();

    ctx.cmd.arg("launch").assert().success();
    assert!(ctx.env.serving_root().join("index.html").is_file());
}

#[test]
fn test_launch_passes_extra_args() {
    let mut ctx = common::orgdeploy();
    ctx.env.create_serving_root();
    ctx.env
        .write_entrypoint("#!/bin/sh\necho \"$@\" > \"$2/argv\"\n");

    ctx.cmd
        .args(["launch", "--", "--port", "8080"])
        .assert()
        .success();

    let argv = std::fs::read_to_string(ctx.env.serving_root().join("argv")).unwrap();
    assert!(argv.trim().ends_with("--port 8080"));
    assert!(argv.starts_with("--outputDirectoryLocal "));
}

#[test]
fn test_service_exit_code_passes_through() {
    let mut ctx = common::orgdeploy();
    ctx.env.create_serving_root();
    ctx.env.write_entrypoint("#!/bin/sh\nexit 3\n");

    ctx.cmd
        .arg("launch")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Error:").not());
}

#[test]
fn test_missing_output_dir_fails_startup() {
    let mut ctx = common::orgdeploy();
    ctx.cmd
        .arg("launch")
        .assert()
        .code(126)
        .stderr(predicate::str::contains("output directory"));
    assert!(!ctx.env.serving_root().exists());
}

#[test]
fn test_missing_entrypoint() {
    let mut ctx = common::orgdeploy();
    ctx.env.create_serving_root();
    std::fs::remove_file(ctx.env.layout().entrypoint()).unwrap();

    ctx.cmd.arg("launch").assert().code(127);
}

#[test]
fn test_unconfigured_output_dir() {
    let mut ctx = common::orgdeploy();
    let mut options = ctx.env.options();
    options.launch.output_dir = None;
    ctx.write_config(&options);

    ctx.cmd
        .arg("launch")
        .assert()
        .code(78)
        .stderr(predicate::str::contains("--outputDirectoryLocal"));
}

#[test]
fn test_supervised_entrypoint_runs_without_config() {
    let ctx = common::orgdeploy();
    ctx.env.create_serving_root();
    ctx.env
        .write_entrypoint("#!/bin/sh\necho \"$@\" > \"$2/argv\"\n");

    let mut options = ctx.env.options();
    options.launch.extra_args = vec!["--port".into(), "8080".into()];
    ctx.write_config(&options);

    let output = ctx
        .new_cmd()
        .args(["dockerfile", "--supervised"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let rendered = String::from_utf8(output.stdout).unwrap();
    let entrypoint = rendered
        .lines()
        .find_map(|l| l.strip_prefix("ENTRYPOINT "))
        .unwrap();
    let argv: Vec<String> = serde_json::from_str(entrypoint).unwrap();

    // What the container runs: no --config, only the rendered arguments
    let mut cmd = assert_cmd::Command::new(env!("CARGO_BIN_EXE_orgdeploy"));
    cmd.env_remove("ORGDEPLOY_CONFIG")
        .env_remove("ORGDEPLOY_UID")
        .env_remove("ORGDEPLOY_OUTPUT_DIR")
        .env("PATH", ctx.env.search_path())
        .args(&argv[1..])
        .assert()
        .success();

    let recorded = std::fs::read_to_string(ctx.env.serving_root().join("argv")).unwrap();
    assert!(recorded.trim().ends_with("--port 8080"));
}
