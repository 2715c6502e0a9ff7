#![allow(dead_code)]

use assert_cmd::Command;
use orgdeploy_test_utils::FakeEnvironment;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variables that would leak host configuration into a test.
const SCRUBBED_ENVS: &[&str] = &[
    "ORGDEPLOY_CONFIG",
    "ORGDEPLOY_LOG",
    "ORGDEPLOY_OUTPUT_DIR",
    "ORGDEPLOY_UID",
    "RUST_LOG",
];

pub struct TestContext {
    pub cmd: Command,
    pub env: FakeEnvironment,
    pub config: PathBuf,
}

impl TestContext {
    /// A fresh command against the same fake image.
    pub fn new_cmd(&self) -> Command {
        let bin_path = env!("CARGO_BIN_EXE_orgdeploy");
        let mut cmd = Command::new(bin_path);
        cmd.timeout(Duration::from_secs(60));
        for key in SCRUBBED_ENVS {
            cmd.env_remove(key);
        }
        cmd.env("PATH", self.env.search_path());
        cmd.arg("--config").arg(&self.config);
        cmd
    }

    /// Rewrite the config file after changing options.
    pub fn write_config(&self, options: &orgdeploy::DeployOptions) {
        std::fs::write(&self.config, options.to_yaml().unwrap()).unwrap();
    }
}

/// Fake image with its options written to `{root}/deploy.yaml`.
pub fn orgdeploy() -> TestContext {
    let env = FakeEnvironment::new();
    let config = env.root().join("deploy.yaml");
    std::fs::write(&config, env.options().to_yaml().unwrap()).unwrap();

    let mut ctx = TestContext {
        cmd: Command::new(env!("CARGO_BIN_EXE_orgdeploy")),
        env,
        config,
    };
    ctx.cmd = ctx.new_cmd();
    ctx
}
