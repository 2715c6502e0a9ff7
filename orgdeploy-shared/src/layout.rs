//! Filesystem layout of the runtime image.
//!
//! ```text
//! {app_dir}/                 # /opt/orgviz
//! ├── web.py                 # service entrypoint
//! └── webui/                 # frontend source tree
//!     ├── package.json
//!     └── <artifacts>        # wherever the build tool puts them
//! {serving_root}/            # /var/www/
//! {manifest}                 # /var/lib/orgdeploy/manifest.json
//! ```

use crate::constants::paths;
use std::path::{Path, PathBuf};

/// Resolved image paths.
///
/// All paths are absolute once built through [`ImageLayout::new`] with an
/// absolute application directory. Tests point it at a temp directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageLayout {
    app_dir: PathBuf,
    serving_root: PathBuf,
    manifest: PathBuf,
}

impl ImageLayout {
    pub fn new(
        app_dir: impl Into<PathBuf>,
        serving_root: impl Into<PathBuf>,
        manifest: impl Into<PathBuf>,
    ) -> Self {
        Self {
            app_dir: app_dir.into(),
            serving_root: serving_root.into(),
            manifest: manifest.into(),
        }
    }

    /// Layout rooted under `root`, mirroring the image paths.
    ///
    /// `/opt/orgviz` becomes `{root}/opt/orgviz` and so on.
    pub fn rooted_at(root: &Path) -> Self {
        Self::new(
            reroot(root, paths::APP_DIR),
            reroot(root, paths::SERVING_ROOT),
            reroot(root, paths::MANIFEST),
        )
    }

    pub fn app_dir(&self) -> &Path {
        &self.app_dir
    }

    /// Frontend source tree: {app_dir}/webui
    pub fn webui_dir(&self) -> PathBuf {
        self.app_dir.join(paths::WEBUI_DIR)
    }

    /// Service entrypoint: {app_dir}/web.py
    pub fn entrypoint(&self) -> PathBuf {
        self.app_dir.join(paths::ENTRYPOINT)
    }

    pub fn serving_root(&self) -> &Path {
        &self.serving_root
    }

    pub fn manifest(&self) -> &Path {
        &self.manifest
    }
}

impl Default for ImageLayout {
    fn default() -> Self {
        Self::new(paths::APP_DIR, paths::SERVING_ROOT, paths::MANIFEST)
    }
}

fn reroot(root: &Path, absolute: &str) -> PathBuf {
    root.join(absolute.trim_start_matches('/'))
}
