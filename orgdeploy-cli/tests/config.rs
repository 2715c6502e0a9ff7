use predicates::prelude::*;
use rstest::rstest;

mod common;

#[rstest]
#[case("yaml", "output_dir:")]
#[case("json", "\"output_dir\":")]
fn test_config_formats(#[case] format: &str, #[case] expected: &str) {
    let mut ctx = common::orgdeploy();
    ctx.cmd
        .args(["config", "--format", format])
        .assert()
        .success()
        .stdout(predicate::str::contains(expected))
        .stdout(predicate::str::contains(
            ctx.env.serving_root().display().to_string(),
        ));
}

#[test]
fn test_env_then_flag_override() {
    let ctx = common::orgdeploy();

    ctx.new_cmd()
        .env("ORGDEPLOY_OUTPUT_DIR", "/srv/from-env")
        .args(["config", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/srv/from-env"));

    ctx.new_cmd()
        .env("ORGDEPLOY_OUTPUT_DIR", "/srv/from-env")
        .args(["--output-directory-local", "/srv/from-flag", "config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/srv/from-flag"))
        .stdout(predicate::str::contains("/srv/from-env").not());
}

#[test]
fn test_missing_config_file() {
    let ctx = common::orgdeploy();
    ctx.new_cmd()
        .args(["--config", "/nonexistent/deploy.yaml", "config"])
        .assert()
        .code(78)
        .stderr(predicate::str::contains("/nonexistent/deploy.yaml"));
}

#[test]
fn test_invalid_config_file() {
    let ctx = common::orgdeploy();
    std::fs::write(&ctx.config, "provision: [not, a, map]\n").unwrap();
    ctx.new_cmd().arg("config").assert().code(78);
}
