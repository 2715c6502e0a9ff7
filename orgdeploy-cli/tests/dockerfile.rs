use predicates::prelude::*;

mod common;

#[test]
fn test_dockerfile_default() {
    let mut ctx = common::orgdeploy();
    ctx.cmd
        .arg("dockerfile")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("FROM "))
        .stdout(predicate::str::contains("npm make graphviz"))
        .stdout(predicate::str::contains(format!("USER {}", ctx.env.runtime_identity().uid)))
        .stdout(predicate::str::contains("\"--outputDirectoryLocal\""));
}

#[test]
fn test_dockerfile_supervised_to_file() {
    let ctx = common::orgdeploy();
    let out = ctx.env.root().join("Dockerfile");

    ctx.new_cmd()
        .args(["dockerfile", "--supervised", "--launcher", "/usr/bin/orgdeploy", "-o"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let rendered = std::fs::read_to_string(&out).unwrap();
    assert!(rendered.contains("ENTRYPOINT [\"/usr/bin/orgdeploy\",\"launch\""));
}

#[test]
fn test_launcher_requires_supervised() {
    let mut ctx = common::orgdeploy();
    ctx.cmd
        .args(["dockerfile", "--launcher", "/usr/bin/orgdeploy"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_privileged_runtime_user_rejected() {
    let mut ctx = common::orgdeploy();
    ctx.cmd
        .args(["--user", "0", "dockerfile"])
        .assert()
        .code(78)
        .stderr(predicate::str::contains("privileged"));
}
