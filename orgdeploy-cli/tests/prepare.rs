use predicates::prelude::*;
use std::os::unix::fs::MetadataExt;

mod common;

#[test]
fn test_prepare_creates_serving_root() {
    let mut ctx = common::orgdeploy();
    ctx.cmd
        .arg("prepare")
        .assert()
        .success()
        .stdout(predicate::str::contains("created"));

    let meta = std::fs::metadata(ctx.env.serving_root()).unwrap();
    assert!(meta.is_dir());
    assert_eq!(meta.uid(), ctx.env.runtime_identity().uid);

    // Second run leaves it alone
    ctx.new_cmd()
        .arg("prepare")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists"));
}

#[test]
fn test_prepare_blocked_by_file() {
    let mut ctx = common::orgdeploy();
    let root = ctx.env.serving_root().to_path_buf();
    std::fs::create_dir_all(root.parent().unwrap()).unwrap();
    std::fs::write(&root, "").unwrap();

    ctx.cmd
        .arg("prepare")
        .assert()
        .code(70)
        .stderr(predicate::str::contains("not a directory"));
}
