//! Stage 3: Serving root preparation.
//!
//! Creates the single directory the service writes into and hands it to the
//! runtime identity. An existing directory is accepted only when the runtime
//! identity can already write it; nothing is chmod'ed or chown'ed behind the
//! operator's back.

use crate::context::Identity;
use crate::options::{Mode, ServingRootSpec};
use orgdeploy_shared::errors::{DeployError, DeployResult};
use std::fs::{self, Metadata};
use std::os::unix::fs::{DirBuilderExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

pub struct ServingRootInput<'a> {
    pub spec: &'a ServingRootSpec,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServingRootOutput {
    pub path: PathBuf,
    /// False when the directory already existed.
    pub created: bool,
    pub owner: Identity,
    pub mode: Mode,
}

pub fn run(input: ServingRootInput<'_>) -> DeployResult<ServingRootOutput> {
    let spec = input.spec;
    let path = spec.path.as_path();

    let created = match fs::metadata(path) {
        Ok(meta) => {
            if !meta.is_dir() {
                return Err(DeployError::Directory(format!(
                    "{} exists and is not a directory",
                    path.display()
                )));
            }
            tracing::debug!(path = %path.display(), "Serving root already exists");
            false
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            create(path, spec)?;
            true
        }
        Err(e) => {
            return Err(DeployError::Directory(format!(
                "failed to stat {}: {}",
                path.display(),
                e
            )));
        }
    };

    let meta = fs::metadata(path)
        .map_err(|e| DeployError::Directory(format!("failed to stat {}: {}", path.display(), e)))?;
    check_writable(path, &meta, spec.owner)?;

    let output = ServingRootOutput {
        path: path.to_path_buf(),
        created,
        owner: Identity::new(meta.uid(), meta.gid()),
        mode: Mode(meta.permissions().mode() & 0o7777),
    };

    tracing::info!(
        path = %output.path.display(),
        created = output.created,
        owner = %output.owner,
        mode = %output.mode,
        "Serving root ready"
    );

    Ok(output)
}

/// Create `path` (and missing parents), then apply mode and owner.
///
/// If mode or ownership cannot be applied, the directory and every parent
/// created along with it are removed again.
fn create(path: &Path, spec: &ServingRootSpec) -> DeployResult<()> {
    let missing_parents: Vec<&Path> = path
        .ancestors()
        .skip(1)
        .take_while(|p| !p.as_os_str().is_empty() && !p.exists())
        .collect();

    fs::DirBuilder::new()
        .recursive(true)
        .mode(spec.mode.0)
        .create(path)
        .map_err(|e| {
            DeployError::Directory(format!("failed to create {}: {}", path.display(), e))
        })?;

    if let Err(e) = apply_mode_and_owner(path, spec) {
        // Deepest first; remove_dir only takes empty directories
        for created in std::iter::once(path).chain(missing_parents) {
            if let Err(rm) = fs::remove_dir(created) {
                tracing::warn!(path = %created.display(), "Failed to remove directory after error: {}", rm);
                break;
            }
        }
        return Err(e);
    }

    tracing::debug!(path = %path.display(), mode = %spec.mode, owner = %spec.owner, "Created serving root");
    Ok(())
}

fn apply_mode_and_owner(path: &Path, spec: &ServingRootSpec) -> DeployResult<()> {
    // DirBuilder's mode is filtered by the umask
    fs::set_permissions(path, fs::Permissions::from_mode(spec.mode.0)).map_err(|e| {
        DeployError::Directory(format!("failed to chmod {}: {}", path.display(), e))
    })?;

    let meta = fs::metadata(path)
        .map_err(|e| DeployError::Directory(format!("failed to stat {}: {}", path.display(), e)))?;
    if meta.uid() == spec.owner.uid && meta.gid() == spec.owner.gid {
        return Ok(());
    }

    nix::unistd::chown(
        path,
        Some(nix::unistd::Uid::from_raw(spec.owner.uid)),
        Some(nix::unistd::Gid::from_raw(spec.owner.gid)),
    )
    .map_err(|e| {
        DeployError::Directory(format!(
            "failed to chown {} to {} (running as {}): {}",
            path.display(),
            spec.owner,
            Identity::current(),
            e
        ))
    })
}

/// Whether `identity` may create entries in a directory with `meta`.
///
/// Evaluated from the owner/group/other permission bits; root always can.
/// Supplementary groups are not considered.
pub fn writable_by(meta: &Metadata, identity: Identity) -> bool {
    if identity.is_privileged() {
        return true;
    }
    let mode = meta.permissions().mode();
    let (write, search) = if meta.uid() == identity.uid {
        (0o200, 0o100)
    } else if meta.gid() == identity.gid {
        (0o020, 0o010)
    } else {
        (0o002, 0o001)
    };
    mode & write != 0 && mode & search != 0
}

/// Mode-bit check, plus a real write when we are `identity`.
pub fn check_writable(path: &Path, meta: &Metadata, identity: Identity) -> DeployResult<()> {
    if !writable_by(meta, identity) {
        return Err(DeployError::Directory(format!(
            "{} (owner {}:{}, mode {:04o}) is not writable by {}",
            path.display(),
            meta.uid(),
            meta.gid(),
            meta.permissions().mode() & 0o7777,
            identity
        )));
    }

    if Identity::current() == identity {
        tempfile::tempfile_in(path).map_err(|e| {
            DeployError::Directory(format!(
                "test write in {} failed for {}: {}",
                path.display(),
                identity,
                e
            ))
        })?;
    }

    Ok(())
}
