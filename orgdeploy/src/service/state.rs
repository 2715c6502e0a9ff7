//! Service lifecycle state machine.
//!
//! ```text
//! NotStarted ──spawn──→ Running{pid} ──exit──→ Exited{code}
//!                                   ├──stop──→ Stopped{signal}
//!                                   └──kill──→ Crashed{signal}
//! ```
//!
//! There is no restart: every end state is terminal. `Stopped` is a
//! graceful shutdown and reports exit code 0.

use chrono::{DateTime, Utc};
use orgdeploy_shared::constants::exit_codes;
use orgdeploy_shared::errors::{DeployError, DeployResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ServiceState {
    /// No process spawned yet.
    NotStarted,

    /// Process spawned and not yet reaped.
    Running { pid: u32 },

    /// Process exited on its own with `code`.
    Exited { code: i32 },

    /// Process died of a termination signal the launcher forwarded to it.
    Stopped { signal: i32 },

    /// Process was terminated by `signal`.
    Crashed { signal: i32 },
}

impl ServiceState {
    pub fn is_running(&self) -> bool {
        matches!(self, ServiceState::Running { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ServiceState::Exited { .. } | ServiceState::Stopped { .. } | ServiceState::Crashed { .. }
        )
    }

    pub fn pid(&self) -> Option<u32> {
        match self {
            ServiceState::Running { pid } => Some(*pid),
            _ => None,
        }
    }

    /// Check if transition to target state is valid.
    pub fn can_transition_to(&self, target: &ServiceState) -> bool {
        use ServiceState::*;
        matches!(
            (self, target),
            (NotStarted, Running { .. })
                | (Running { .. }, Exited { .. })
                | (Running { .. }, Stopped { .. })
                | (Running { .. }, Crashed { .. })
        )
    }

    /// Exit code the launcher reports for a terminal state.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ServiceState::Exited { code } => Some(*code),
            ServiceState::Stopped { .. } => Some(0),
            ServiceState::Crashed { signal } => Some(exit_codes::SIGNAL_BASE + signal),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::NotStarted => "not_started",
            ServiceState::Running { .. } => "running",
            ServiceState::Exited { .. } => "exited",
            ServiceState::Stopped { .. } => "stopped",
            ServiceState::Crashed { .. } => "crashed",
        }
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceState::NotStarted => write!(f, "not started"),
            ServiceState::Running { pid } => write!(f, "running (pid {pid})"),
            ServiceState::Exited { code } => write!(f, "exited with code {code}"),
            ServiceState::Stopped { signal } => write!(f, "stopped by forwarded signal {signal}"),
            ServiceState::Crashed { signal } => write!(f, "killed by signal {signal}"),
        }
    }
}

/// Current state plus when it was entered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceLifecycle {
    pub state: ServiceState,
    pub last_updated: DateTime<Utc>,
}

impl ServiceLifecycle {
    pub fn new() -> Self {
        Self {
            state: ServiceState::NotStarted,
            last_updated: Utc::now(),
        }
    }

    /// Attempt state transition with validation.
    pub fn transition_to(&mut self, new_state: ServiceState) -> DeployResult<()> {
        if !self.state.can_transition_to(&new_state) {
            return Err(DeployError::InvalidState(format!(
                "Cannot transition from {} to {}",
                self.state, new_state
            )));
        }
        tracing::debug!(from = self.state.as_str(), to = new_state.as_str(), "Service state change");
        self.state = new_state;
        self.last_updated = Utc::now();
        Ok(())
    }
}

impl Default for ServiceLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
