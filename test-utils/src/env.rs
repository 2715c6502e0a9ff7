use crate::RecordingRunner;
use orgdeploy::options::DeployOptions;
use orgdeploy::{ExecutionContext, Identity, ImageLayout};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Service stub: writes `index.html` into the output directory and exits 0.
const WEB_PY_STUB: &str = r#"#!/bin/sh
out=""
while [ $# -gt 0 ]; do
    case "$1" in
        --outputDirectoryLocal) out="$2"; shift 2 ;;
        *) shift ;;
    esac
done
[ -n "$out" ] || exit 2
echo "<html>orgviz</html>" > "$out/index.html" || exit 3
exit 0
"#;

const MAKE_STUB: &str = "#!/bin/sh\nmkdir -p dist && echo built > dist/index.js\n";
const NPM_STUB: &str = "#!/bin/sh\nmkdir -p node_modules\n";
const NOOP_STUB: &str = "#!/bin/sh\nexit 0\n";

/// Tools every fake image has on PATH.
const TOOLS: &[(&str, &str)] = &[
    ("dnf", NOOP_STUB),
    ("python3", NOOP_STUB),
    ("npm", NPM_STUB),
    ("make", MAKE_STUB),
    ("dot", NOOP_STUB),
];

/// An image tree under a temp directory.
///
/// ```text
/// {root}/opt/orgviz/web.py
/// {root}/opt/orgviz/webui/package.json
/// {root}/bin/{dnf,python3,npm,make,dot}
/// {root}/var/www/                 (not created; the pipeline does that)
/// ```
///
/// When the tests run as root the runtime identity is uid 1001 and the
/// tree is world-readable; otherwise both identities are the current user.
pub struct FakeEnvironment {
    dir: TempDir,
    layout: ImageLayout,
    bin_dir: PathBuf,
    build_identity: Identity,
    runtime_identity: Identity,
}

impl FakeEnvironment {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let root = dir.path();

        let build_identity = Identity::current();
        let runtime_identity = if build_identity.is_privileged() {
            std::fs::set_permissions(root, std::fs::Permissions::from_mode(0o755))
                .expect("chmod temp dir");
            Identity::RUNTIME
        } else {
            build_identity
        };

        let layout = ImageLayout::rooted_at(root);
        let bin_dir = root.join("bin");
        std::fs::create_dir_all(&bin_dir).expect("create bin dir");
        std::fs::create_dir_all(layout.webui_dir()).expect("create webui dir");
        std::fs::write(layout.webui_dir().join("package.json"), "{\"name\":\"webui\"}")
            .expect("write package.json");

        let env = Self {
            dir,
            layout,
            bin_dir,
            build_identity,
            runtime_identity,
        };
        for (name, body) in TOOLS {
            env.write_stub(name, body);
        }
        env.write_entrypoint(WEB_PY_STUB);
        env
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn layout(&self) -> &ImageLayout {
        &self.layout
    }

    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    pub fn build_identity(&self) -> Identity {
        self.build_identity
    }

    pub fn runtime_identity(&self) -> Identity {
        self.runtime_identity
    }

    pub fn serving_root(&self) -> &Path {
        self.layout.serving_root()
    }

    /// Defaults rooted in the temp tree, cache cleanup included.
    pub fn options(&self) -> DeployOptions {
        let mut options = DeployOptions::for_layout(&self.layout);
        options.provision.cache_dirs = Some(vec![self.root().join("var/cache/dnf")]);
        options.set_runtime_identity(self.runtime_identity);
        options
    }

    /// Build context with the stub tools first on PATH.
    pub fn exec_context(&self) -> ExecutionContext {
        ExecutionContext::new(self.build_identity, self.root())
            .with_env("PATH", self.search_path())
    }

    pub fn search_path(&self) -> String {
        format!("{}:/usr/bin:/bin", self.bin_dir.display())
    }

    /// Recording runner whose `npm` and `make` touch the tree like the stubs.
    pub fn runner(&self) -> RecordingRunner {
        RecordingRunner::new()
            .on("npm", |_, ctx| {
                std::fs::create_dir_all(ctx.cwd().join("node_modules")).expect("create node_modules");
            })
            .on("make", |_, ctx| {
                let dist = ctx.cwd().join("dist");
                std::fs::create_dir_all(&dist).expect("create dist");
                std::fs::write(dist.join("index.js"), "built").expect("write artifact");
            })
    }

    /// Install an executable `name` in the stub bin directory.
    pub fn write_stub(&self, name: &str, body: &str) -> PathBuf {
        let path = self.bin_dir.join(name);
        write_executable(&path, body);
        path
    }

    /// Replace `web.py`.
    pub fn write_entrypoint(&self, body: &str) -> PathBuf {
        let path = self.layout.entrypoint();
        write_executable(&path, body);
        path
    }

    /// Create the serving root owned by the runtime identity.
    pub fn create_serving_root(&self) -> PathBuf {
        let path = self.serving_root().to_path_buf();
        std::fs::create_dir_all(&path).expect("create serving root");
        if self.build_identity != self.runtime_identity {
            std::os::unix::fs::chown(
                &path,
                Some(self.runtime_identity.uid),
                Some(self.runtime_identity.gid),
            )
            .expect("chown serving root");
        }
        path
    }
}

impl Default for FakeEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

fn write_executable(path: &Path, body: &str) {
    std::fs::write(path, body).unwrap_or_else(|e| panic!("write {}: {}", path.display(), e));
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .unwrap_or_else(|e| panic!("chmod {}: {}", path.display(), e));
}
