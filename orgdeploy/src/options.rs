//! Configuration for the deployment pipeline.
//!
//! One YAML document describes the whole image: what to install, how to
//! build the frontend, where the serving root lives and how the service is
//! launched. Layering order is defaults, then the file, then environment,
//! then CLI flags (applied by the caller).

use crate::context::Identity;
use crate::jailer::JailerOptions;
use orgdeploy_shared::constants::{envs, paths};
use orgdeploy_shared::errors::{DeployError, DeployResult};
use orgdeploy_shared::layout::ImageLayout;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};

// ============================================================================
// Top-level options
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployOptions {
    /// Base image for the rendered build descriptor.
    pub base_image: String,

    /// Application directory holding `web.py` and the frontend tree.
    pub app_dir: PathBuf,

    /// Build manifest written after the build stages.
    pub manifest_path: PathBuf,

    pub provision: ProvisionSpec,
    pub frontend: FrontendSpec,
    pub serving_root: ServingRootSpec,
    pub launch: LaunchSpec,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self::for_layout(&ImageLayout::default())
    }
}

impl DeployOptions {
    /// Defaults with every path taken from `layout`.
    pub fn for_layout(layout: &ImageLayout) -> Self {
        Self {
            base_image: default_base_image(),
            app_dir: layout.app_dir().to_path_buf(),
            manifest_path: layout.manifest().to_path_buf(),
            provision: ProvisionSpec::default(),
            frontend: FrontendSpec::new(layout.webui_dir()),
            serving_root: ServingRootSpec::new(layout.serving_root()),
            launch: LaunchSpec::new(layout.entrypoint(), layout.serving_root()),
        }
    }

    /// Load options from a YAML file.
    pub fn from_file(path: &Path) -> DeployResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DeployError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
            .map_err(|e| DeployError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_yaml(content: &str) -> DeployResult<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| DeployError::Config(format!("invalid configuration: {e}")))
    }

    pub fn to_yaml(&self) -> DeployResult<String> {
        serde_yaml::to_string(self)
            .map_err(|e| DeployError::Internal(format!("failed to serialize configuration: {e}")))
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// Takes a lookup function so callers (and tests) decide where values
    /// come from.
    pub fn apply_env<F>(&mut self, lookup: F) -> DeployResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(envs::OUTPUT_DIR).filter(|v| !v.is_empty()) {
            tracing::debug!(output_dir = %dir, "Output directory from environment");
            self.set_output_dir(PathBuf::from(dir));
        }

        if let Some(uid) = lookup(envs::UID).filter(|v| !v.is_empty()) {
            let identity: Identity = uid.parse()?;
            tracing::debug!(identity = %identity, "Runtime identity from environment");
            self.set_runtime_identity(identity);
        }

        Ok(())
    }

    /// Point both the serving root and the launcher at `dir`.
    pub fn set_output_dir(&mut self, dir: PathBuf) {
        self.serving_root.path = dir.clone();
        self.launch.output_dir = Some(dir);
    }

    /// Runtime identity owns the serving root and runs the service.
    pub fn set_runtime_identity(&mut self, identity: Identity) {
        self.serving_root.owner = identity;
        self.launch.identity = identity;
    }

    /// Check invariants that do not depend on the filesystem.
    pub fn validate(&self) -> DeployResult<()> {
        if self.provision.packages.is_empty() {
            return Err(DeployError::Config("package list is empty".into()));
        }
        if let Some(pkg) = self.provision.packages.iter().find(|p| p.name.trim().is_empty()) {
            return Err(DeployError::Config(format!(
                "package with empty name (check: {})",
                pkg.check
            )));
        }
        if self.frontend.package_manager.trim().is_empty() {
            return Err(DeployError::Config("frontend package manager not set".into()));
        }
        if self.frontend.build_tool.trim().is_empty() {
            return Err(DeployError::Config("frontend build tool not set".into()));
        }
        if let Some(dir) = &self.frontend.artifact_dir
            && dir.is_absolute()
        {
            return Err(DeployError::Config(format!(
                "artifact_dir must be relative to the frontend tree: {}",
                dir.display()
            )));
        }
        if !self.serving_root.path.is_absolute() {
            return Err(DeployError::Config(format!(
                "serving root must be absolute: {}",
                self.serving_root.path.display()
            )));
        }
        if self.serving_root.mode.0 > 0o7777 {
            return Err(DeployError::Config(format!(
                "invalid serving root mode {}",
                self.serving_root.mode
            )));
        }
        if self.launch.identity.is_privileged() {
            return Err(DeployError::Config(
                "service must not run as a privileged identity".into(),
            ));
        }
        Ok(())
    }
}

fn default_base_image() -> String {
    "registry.fedoraproject.org/fedora-minimal:latest".to_string()
}

// ============================================================================
// Provisioning
// ============================================================================

/// System package manager used by the provisioner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Dnf,
    Microdnf,
    Apt,
    Apk,
}

impl PackageManager {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageManager::Dnf => "dnf",
            PackageManager::Microdnf => "microdnf",
            PackageManager::Apt => "apt",
            PackageManager::Apk => "apk",
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How to verify a package is usable after installation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageCheck {
    /// Binary must resolve on PATH.
    Binary(String),
    /// Python module must be importable by `python3`.
    PythonModule(String),
    /// Installed but not checked.
    None,
}

impl fmt::Display for PackageCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageCheck::Binary(name) => write!(f, "binary {name}"),
            PackageCheck::PythonModule(name) => write!(f, "python module {name}"),
            PackageCheck::None => f.write_str("none"),
        }
    }
}

/// One installable package.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    pub name: String,
    #[serde(default = "default_check")]
    pub check: PackageCheck,
}

fn default_check() -> PackageCheck {
    PackageCheck::None
}

impl PackageSpec {
    pub fn binary(name: impl Into<String>, binary: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            check: PackageCheck::Binary(binary.into()),
        }
    }

    pub fn python_module(name: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            check: PackageCheck::PythonModule(module.into()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionSpec {
    pub package_manager: PackageManager,
    pub packages: Vec<PackageSpec>,
    /// Cache directories that must be empty after cleanup.
    /// None uses the package manager's defaults.
    pub cache_dirs: Option<Vec<PathBuf>>,
    /// Interpreter used to check Python module packages.
    pub python: String,
}

impl Default for ProvisionSpec {
    fn default() -> Self {
        Self {
            package_manager: PackageManager::Dnf,
            packages: vec![
                PackageSpec::python_module("python3-cherrypy", "cherrypy"),
                PackageSpec::python_module("python3-configargparse", "configargparse"),
                PackageSpec::binary("npm", "npm"),
                PackageSpec::binary("make", "make"),
                PackageSpec::binary("graphviz", "dot"),
            ],
            cache_dirs: None,
            python: "python3".to_string(),
        }
    }
}

// ============================================================================
// Frontend
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontendSpec {
    /// Frontend source tree (holds `package.json` and the build target file).
    pub source_dir: PathBuf,
    pub package_manager: String,
    pub install_args: Vec<String>,
    pub build_tool: String,
    /// Empty means the build tool's default target.
    pub build_args: Vec<String>,
    /// Declared artifact location relative to `source_dir`.
    /// None means detect the directories the build created.
    pub artifact_dir: Option<PathBuf>,
}

impl FrontendSpec {
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            package_manager: "npm".to_string(),
            install_args: vec!["install".to_string(), "-g".to_string()],
            build_tool: "make".to_string(),
            build_args: Vec::new(),
            artifact_dir: None,
        }
    }
}

impl Default for FrontendSpec {
    fn default() -> Self {
        Self::new(ImageLayout::default().webui_dir())
    }
}

// ============================================================================
// Serving root
// ============================================================================

/// Unix permission bits, written as an octal string in YAML (`"0755"`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mode(pub u32);

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04o}", self.0)
    }
}

impl Serialize for Mode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Mode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(u32),
            Str(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Int(v) => Ok(Mode(v)),
            Raw::Str(s) => {
                let digits = s.trim().trim_start_matches("0o");
                u32::from_str_radix(digits, 8)
                    .map(Mode)
                    .map_err(|e| serde::de::Error::custom(format!("invalid mode '{s}': {e}")))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServingRootSpec {
    pub path: PathBuf,
    pub mode: Mode,
    /// Identity that must be able to write the directory.
    pub owner: Identity,
}

impl ServingRootSpec {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mode: Mode(0o755),
            owner: Identity::RUNTIME,
        }
    }
}

impl Default for ServingRootSpec {
    fn default() -> Self {
        Self::new(paths::SERVING_ROOT)
    }
}

// ============================================================================
// Launch
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchSpec {
    /// Service entrypoint (`web.py`).
    pub program: PathBuf,
    /// Optional interpreter prefix (`python3`). None executes `program` directly.
    pub interpreter: Option<String>,
    /// Value bound to `--outputDirectoryLocal`. None means not configured.
    pub output_dir: Option<PathBuf>,
    pub identity: Identity,
    pub extra_args: Vec<String>,
    /// Descriptor cleanup, rlimits and PID file for the service process.
    pub jailer: JailerOptions,
}

impl LaunchSpec {
    pub fn new(program: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            interpreter: None,
            output_dir: Some(output_dir.into()),
            identity: Identity::RUNTIME,
            extra_args: Vec::new(),
            jailer: JailerOptions::default(),
        }
    }
}

impl Default for LaunchSpec {
    fn default() -> Self {
        let layout = ImageLayout::default();
        Self::new(layout.entrypoint(), layout.serving_root())
    }
}
