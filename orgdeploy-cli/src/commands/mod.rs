pub mod build;
pub mod check;
pub mod completion;
pub mod config;
pub mod dockerfile;
pub mod launch;
pub mod prepare;
pub mod run;

use orgdeploy::ServiceState;
use std::fmt;

/// The service ended on its own with a non-zero status.
///
/// Not a deployment failure; the process exits with the service's code and
/// nothing is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceExit {
    pub state: ServiceState,
    pub code: i32,
}

impl fmt::Display for ServiceExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "service {}", self.state)
    }
}

impl std::error::Error for ServiceExit {}

/// `Ok` for a clean exit, otherwise a [`ServiceExit`] carrying the code.
pub(crate) fn service_result(state: ServiceState) -> anyhow::Result<()> {
    match state.exit_code() {
        Some(0) => Ok(()),
        Some(code) => Err(ServiceExit { state, code }.into()),
        None => anyhow::bail!("service ended in non-terminal state {}", state),
    }
}
