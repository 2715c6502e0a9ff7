use predicates::prelude::*;

mod common;

#[test]
fn test_build_plan() {
    let mut ctx = common::orgdeploy();
    ctx.cmd
        .args(["build", "--plan"])
        .assert()
        .success()
        .stdout("provision\nassets\nserving_root\n");
}

#[test]
fn test_build_then_check() {
    let mut ctx = common::orgdeploy();
    ctx.cmd
        .arg("build")
        .assert()
        .success()
        .stdout(predicate::str::contains("artifacts:"))
        .stdout(predicate::str::contains("serving root:"));

    let webui = ctx.env.layout().webui_dir();
    assert!(webui.join("dist/index.js").is_file());
    assert!(ctx.env.layout().manifest().is_file());

    ctx.new_cmd()
        .args(["check", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"ok\": true"))
        .stdout(predicate::str::contains("\"ok\": false").not());
}

#[test]
fn test_build_twice() {
    let mut ctx = common::orgdeploy();
    ctx.cmd.arg("build").assert().success();

    let dist = ctx.env.layout().webui_dir().join("dist");
    ctx.new_cmd()
        .arg("build")
        .assert()
        .success()
        .stdout(predicate::str::contains(dist.display().to_string()));
}

#[test]
fn test_check_missing_entrypoint_exit_code() {
    let mut ctx = common::orgdeploy();
    ctx.cmd.arg("build").assert().success();
    std::fs::remove_file(ctx.env.layout().entrypoint()).unwrap();

    ctx.new_cmd()
        .arg("check")
        .assert()
        .code(127)
        .stdout(predicate::str::contains("entrypoint"));
}

#[test]
fn test_check_non_executable_entrypoint_exit_code() {
    use std::os::unix::fs::PermissionsExt;

    let mut ctx = common::orgdeploy();
    ctx.cmd.arg("build").assert().success();
    std::fs::set_permissions(
        ctx.env.layout().entrypoint(),
        std::fs::Permissions::from_mode(0o644),
    )
    .unwrap();

    ctx.new_cmd()
        .args(["check", "--format", "json"])
        .assert()
        .code(126)
        .stdout(predicate::str::contains("\"exit_code\": 126"));
}

#[test]
fn test_check_unbuilt_image_fails() {
    let mut ctx = common::orgdeploy();
    ctx.cmd
        .arg("check")
        .assert()
        .code(70)
        .stdout(predicate::str::contains("CHECK"))
        .stdout(predicate::str::contains("FAILED"));
}

#[test]
fn test_failed_build_exit_code() {
    let mut ctx = common::orgdeploy();
    ctx.env.write_stub("make", "#!/bin/sh\nmkdir -p dist\nexit 2\n");

    ctx.cmd
        .arg("build")
        .assert()
        .code(70)
        .stderr(predicate::str::contains("asset build failed"));
    assert!(!ctx.env.layout().webui_dir().join("dist").exists());
}

#[test]
fn test_run_serves() {
    let mut ctx = common::orgdeploy();
    ctx.cmd.arg("run").assert().success();
    assert!(ctx.env.serving_root().join("index.html").is_file());
}
