//! Test doubles shared by the orgdeploy crates.
//!
//! - [`RecordingRunner`]: a [`CommandRunner`](orgdeploy::CommandRunner)
//!   that records commands instead of executing them.
//! - [`FakeEnvironment`]: an image tree under a temp directory with stub
//!   tools on PATH and a stub `web.py`.

mod env;
mod runner;

pub use env::FakeEnvironment;
pub use runner::RecordingRunner;
