//! Shared constants between the pipeline library and the CLI
//!
//! These values describe the image contract: where things live, who runs
//! them, and how failures surface as exit codes.

/// Identity constants
pub mod identity {
    /// Privileged identity used while building the image
    pub const ROOT_UID: u32 = 0;

    /// Fixed non-root identity the service runs as (`USER 1001`)
    pub const RUNTIME_UID: u32 = 1001;

    /// Group of the runtime identity
    pub const RUNTIME_GID: u32 = 1001;
}

/// Filesystem paths inside the image
pub mod paths {
    /// Serving root written by the service and served by an external web server
    pub const SERVING_ROOT: &str = "/var/www/";

    /// Application directory holding `web.py` and the frontend tree
    pub const APP_DIR: &str = "/opt/orgviz";

    /// Frontend source tree, relative to the application directory
    pub const WEBUI_DIR: &str = "webui";

    /// Service entrypoint, relative to the application directory
    pub const ENTRYPOINT: &str = "web.py";

    /// Build manifest written after the build stages
    pub const MANIFEST: &str = "/var/lib/orgdeploy/manifest.json";

    /// Default configuration file
    pub const CONFIG_FILE: &str = "/etc/orgdeploy/deploy.yaml";

    /// Package manifest expected inside the frontend tree
    pub const PACKAGE_MANIFEST: &str = "package.json";

    /// Frontend dependency directory, never counted as a build artifact
    pub const NODE_MODULES: &str = "node_modules";
}

/// Service entrypoint argument names
pub mod args {
    /// The single configuration value bound at launch
    pub const OUTPUT_DIRECTORY_LOCAL: &str = "--outputDirectoryLocal";
}

/// Environment variables read by the CLI
pub mod envs {
    /// Configuration file override
    pub const CONFIG: &str = "ORGDEPLOY_CONFIG";

    /// Log filter override (falls back to RUST_LOG)
    pub const LOG: &str = "ORGDEPLOY_LOG";

    /// Output directory override
    pub const OUTPUT_DIR: &str = "ORGDEPLOY_OUTPUT_DIR";

    /// Runtime uid override
    pub const UID: &str = "ORGDEPLOY_UID";
}

/// Process exit codes (sysexits-style where one exists)
pub mod exit_codes {
    /// Graceful shutdown
    pub const SUCCESS: i32 = 0;

    /// Build, provisioning or directory failure (EX_SOFTWARE)
    pub const SOFTWARE: i32 = 70;

    /// Configuration failure (EX_CONFIG)
    pub const CONFIG: i32 = 78;

    /// Entrypoint could not be started
    pub const LAUNCH: i32 = 126;

    /// Entrypoint not found
    pub const NOT_FOUND: i32 = 127;

    /// Base added to a signal number when the child was killed by it
    pub const SIGNAL_BASE: i32 = 128;
}
