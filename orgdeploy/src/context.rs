//! Execution context threaded through pipeline stages.
//!
//! Privilege state is an explicit value rather than ambient process state:
//! every stage receives an [`ExecutionContext`] and the orchestrator checks
//! its identity against the stage's declared requirement before running it.
//!
//! ```text
//! ExecutionContext { identity: root, cwd: /, env }        provision
//!        │ with_cwd(webui)
//!        ▼
//! ExecutionContext { identity: root, cwd: webui, env }    assets
//!        │ with_cwd(/)
//!        ▼
//! ExecutionContext { identity: root, cwd: /, env }        serving_root
//!        │ drop_privileges(1001)
//!        ▼
//! ExecutionContext { identity: 1001, cwd: /, env }        launch
//! ```

use orgdeploy_shared::constants::identity;
use orgdeploy_shared::errors::{DeployError, DeployResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Numeric process identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub uid: u32,
    pub gid: u32,
}

impl Identity {
    /// Privileged build identity.
    pub const ROOT: Identity = Identity {
        uid: identity::ROOT_UID,
        gid: identity::ROOT_UID,
    };

    /// Fixed runtime identity of the service.
    pub const RUNTIME: Identity = Identity {
        uid: identity::RUNTIME_UID,
        gid: identity::RUNTIME_GID,
    };

    pub fn new(uid: u32, gid: u32) -> Self {
        Self { uid, gid }
    }

    /// Effective identity of the current process.
    pub fn current() -> Self {
        Self {
            uid: nix::unistd::geteuid().as_raw(),
            gid: nix::unistd::getegid().as_raw(),
        }
    }

    pub fn is_privileged(&self) -> bool {
        self.uid == identity::ROOT_UID
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::RUNTIME
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.uid, self.gid)
    }
}

impl std::str::FromStr for Identity {
    type Err = DeployError;

    /// Parses `uid` or `uid:gid`. A bare uid uses the same number as gid,
    /// matching `USER 1001` semantics.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|e| DeployError::Config(format!("invalid identity '{s}': {e}")))
        };
        match s.split_once(':') {
            Some((uid, gid)) => Ok(Self::new(parse(uid)?, parse(gid)?)),
            None => {
                let uid = parse(s)?;
                Ok(Self::new(uid, uid))
            }
        }
    }
}

/// `{identity, cwd, env}` for one pipeline step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    identity: Identity,
    cwd: PathBuf,
    env: BTreeMap<String, String>,
    /// Set once privileges were dropped; never cleared.
    dropped: bool,
}

impl ExecutionContext {
    pub fn new(identity: Identity, cwd: impl Into<PathBuf>) -> Self {
        Self {
            identity,
            cwd: cwd.into(),
            env: BTreeMap::new(),
            dropped: false,
        }
    }

    /// Privileged build context rooted at `/`.
    pub fn privileged() -> Self {
        Self::new(Identity::ROOT, "/")
    }

    /// Context matching the running process, inheriting PATH.
    pub fn current() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        let mut ctx = Self::new(Identity::current(), cwd);
        if let Ok(path) = std::env::var("PATH") {
            ctx.env.insert("PATH".to_string(), path);
        }
        ctx
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Whether a privilege drop already happened on this context's lineage.
    pub fn has_dropped_privileges(&self) -> bool {
        self.dropped
    }

    /// Same identity and env, different working directory.
    pub fn with_cwd(&self, cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            ..self.clone()
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// PATH as seen by commands run in this context.
    pub fn search_path(&self) -> Option<&str> {
        self.env.get("PATH").map(String::as_str)
    }

    /// Switch to a restricted identity. One-way: a dropped context cannot
    /// regain privilege.
    pub fn drop_privileges(&self, target: Identity) -> DeployResult<Self> {
        if target.is_privileged() {
            return Err(DeployError::Pipeline(format!(
                "cannot drop privileges to privileged identity {target}"
            )));
        }
        if self.dropped && target != self.identity {
            return Err(DeployError::Pipeline(format!(
                "privileges already dropped to {}, cannot switch to {target}",
                self.identity
            )));
        }

        tracing::debug!(from = %self.identity, to = %target, "Dropping privileges");

        Ok(Self {
            identity: target,
            dropped: true,
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_parse() {
        assert_eq!("1001".parse::<Identity>().unwrap(), Identity::RUNTIME);
        assert_eq!("1001:50".parse::<Identity>().unwrap(), Identity::new(1001, 50));
        assert!("web".parse::<Identity>().is_err());
        assert!("1001:".parse::<Identity>().is_err());
    }

    #[test]
    fn test_identity_display() {
        assert_eq!(Identity::RUNTIME.to_string(), "1001:1001");
        assert!(Identity::ROOT.is_privileged());
        assert!(!Identity::RUNTIME.is_privileged());
    }

    #[test]
    fn test_drop_privileges_is_one_way() {
        let ctx = ExecutionContext::privileged();
        assert!(!ctx.has_dropped_privileges());

        let dropped = ctx.drop_privileges(Identity::RUNTIME).unwrap();
        assert_eq!(dropped.identity(), Identity::RUNTIME);
        assert!(dropped.has_dropped_privileges());

        // Re-dropping to the same identity is fine, switching is not.
        assert!(dropped.drop_privileges(Identity::RUNTIME).is_ok());
        assert!(dropped.drop_privileges(Identity::new(2000, 2000)).is_err());
    }

    #[test]
    fn test_drop_to_root_rejected() {
        let ctx = ExecutionContext::privileged();
        assert!(ctx.drop_privileges(Identity::ROOT).is_err());
    }

    #[test]
    fn test_with_cwd_keeps_identity() {
        let ctx = ExecutionContext::privileged().with_env("PATH", "/usr/bin");
        let webui = ctx.with_cwd("/opt/orgviz/webui");
        assert_eq!(webui.identity(), Identity::ROOT);
        assert_eq!(webui.cwd(), Path::new("/opt/orgviz/webui"));
        assert_eq!(webui.search_path(), Some("/usr/bin"));
    }
}
