//! Container build descriptor (Dockerfile) rendering.
//!
//! Steps are emitted in pipeline order, one block per stage, so the image
//! build and `orgdeploy run` go through the same sequence. `USER` is always
//! the last instruction before `ENTRYPOINT`.

use crate::options::DeployOptions;
use crate::pipeline::Pipeline;
use crate::pipeline::tasks::names;
use orgdeploy_shared::constants::args;
use orgdeploy_shared::errors::{DeployError, DeployResult};
use std::fmt::Write;
use std::path::Path;

/// What the container starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntrypointStyle {
    /// The service itself.
    #[default]
    Direct,
    /// `orgdeploy launch`, adding validation, signal forwarding and
    /// the PID file.
    Supervised,
}

pub struct DescriptorRenderer<'a> {
    options: &'a DeployOptions,
    style: EntrypointStyle,
    /// Build context copied into the application directory.
    context: String,
    launcher: String,
}

impl<'a> DescriptorRenderer<'a> {
    pub fn new(options: &'a DeployOptions) -> Self {
        Self {
            options,
            style: EntrypointStyle::Direct,
            context: ".".to_string(),
            launcher: "/usr/local/bin/orgdeploy".to_string(),
        }
    }

    pub fn with_style(mut self, style: EntrypointStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_launcher(mut self, launcher: impl Into<String>) -> Self {
        self.launcher = launcher.into();
        self
    }

    pub fn render(&self) -> DeployResult<String> {
        self.options.validate()?;

        let mut out = String::new();
        let o = self.options;
        line(&mut out, format!("FROM {}", o.base_image));

        for stage in Pipeline::full().plan()? {
            out.push('\n');
            match stage.as_str() {
                names::PROVISION => self.render_provision(&mut out),
                names::ASSETS => self.render_assets(&mut out)?,
                names::SERVING_ROOT => self.render_serving_root(&mut out),
                names::LAUNCH => self.render_launch(&mut out)?,
                other => {
                    return Err(DeployError::Internal(format!(
                        "no descriptor step for stage '{other}'"
                    )));
                }
            }
        }

        Ok(out)
    }

    fn render_provision(&self, out: &mut String) {
        let spec = &self.options.provision;
        let manager = spec.package_manager;

        let mut commands: Vec<String> = manager
            .prepare_commands()
            .iter()
            .map(ToString::to_string)
            .collect();
        commands.push(
            manager
                .install_command(spec.packages.iter().map(|p| p.name.as_str()))
                .to_string(),
        );
        if let Some(clean) = manager.clean_command() {
            commands.push(clean.to_string());
        }
        let cache_dirs = spec.effective_cache_dirs();
        if !cache_dirs.is_empty() {
            let globs: Vec<String> = cache_dirs
                .iter()
                .map(|d| format!("{}/*", quote(&d.display().to_string())))
                .collect();
            commands.push(format!("rm -rf {}", globs.join(" ")));
        }

        line(out, format!("RUN {}", commands.join(" \\\n    && ")));
    }

    fn render_assets(&self, out: &mut String) -> DeployResult<()> {
        let app_dir = path_str(&self.options.app_dir)?;
        let frontend = &self.options.frontend;

        line(out, format!("COPY {} {}", self.context, quote(app_dir)));
        line(out, format!("WORKDIR {}", path_str(&frontend.source_dir)?));

        let install = join_command(&frontend.package_manager, &frontend.install_args);
        let build = join_command(&frontend.build_tool, &frontend.build_args);
        line(out, format!("RUN {install} && {build}"));
        line(out, format!("WORKDIR {app_dir}"));
        Ok(())
    }

    fn render_serving_root(&self, out: &mut String) {
        let spec = &self.options.serving_root;
        let path = quote(&spec.path.display().to_string());
        line(
            out,
            format!(
                "RUN mkdir -p {path} && chown {}:{} {path} && chmod {} {path}",
                spec.owner.uid, spec.owner.gid, spec.mode
            ),
        );
    }

    fn render_launch(&self, out: &mut String) -> DeployResult<()> {
        let launch = &self.options.launch;
        let output_dir = launch.output_dir.as_ref().ok_or_else(|| {
            DeployError::Config(format!("{} is not configured", args::OUTPUT_DIRECTORY_LOCAL))
        })?;
        let output_dir = path_str(output_dir)?.to_string();

        let identity = launch.identity;
        if identity.uid == identity.gid {
            line(out, format!("USER {}", identity.uid));
        } else {
            line(out, format!("USER {}:{}", identity.uid, identity.gid));
        }

        let mut argv: Vec<String> = Vec::new();
        match self.style {
            EntrypointStyle::Direct => {
                if let Some(interpreter) = &launch.interpreter {
                    argv.push(interpreter.clone());
                }
                argv.push(path_str(&launch.program)?.to_string());
                argv.push(args::OUTPUT_DIRECTORY_LOCAL.to_string());
                argv.push(output_dir);
                argv.extend(launch.extra_args.iter().cloned());
            }
            // The image carries no config file, so the launcher gets every
            // setting it needs on its command line.
            EntrypointStyle::Supervised => {
                argv.push(self.launcher.clone());
                argv.push("launch".to_string());
                argv.push("--user".to_string());
                argv.push(identity.to_string());
                argv.push("--output-directory-local".to_string());
                argv.push(output_dir);
                argv.push("--program".to_string());
                argv.push(path_str(&launch.program)?.to_string());
                if let Some(interpreter) = &launch.interpreter {
                    argv.push("--interpreter".to_string());
                    argv.push(interpreter.clone());
                }
                if let Some(pid_file) = &launch.jailer.pid_file {
                    argv.push("--pid-file".to_string());
                    argv.push(path_str(pid_file)?.to_string());
                }
                if !launch.extra_args.is_empty() {
                    argv.push("--".to_string());
                    argv.extend(launch.extra_args.iter().cloned());
                }
            }
        }

        let json = serde_json::to_string(&argv)?;
        line(out, format!("ENTRYPOINT {json}"));
        Ok(())
    }
}

fn line(out: &mut String, text: String) {
    let _ = writeln!(out, "{text}");
}

fn path_str(path: &Path) -> DeployResult<&str> {
    path.to_str()
        .ok_or_else(|| DeployError::Config(format!("path is not valid UTF-8: {}", path.display())))
}

fn join_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .map(quote)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Single-quote `s` for /bin/sh unless it is made of safe characters only.
fn quote(s: &str) -> String {
    let safe = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=@+,%".contains(c));
    if safe {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Identity;
    use crate::options::PackageManager;

    fn position(haystack: &str, needle: &str) -> usize {
        haystack
            .find(needle)
            .unwrap_or_else(|| panic!("missing '{needle}' in:\n{haystack}"))
    }

    #[test]
    fn test_default_descriptor_order() {
        let rendered = DescriptorRenderer::new(&DeployOptions::default())
            .render()
            .unwrap();

        let from = position(&rendered, "FROM ");
        let install = position(&rendered, "dnf install -y");
        let build = position(&rendered, "RUN npm install -g && make");
        let mkdir = position(&rendered, "RUN mkdir -p /var/www/");
        let user = position(&rendered, "USER 1001");
        let entry = position(&rendered, "ENTRYPOINT ");
        assert!(from < install && install < build && build < mkdir && mkdir < user && user < entry);

        assert!(rendered.contains("python3-cherrypy python3-configargparse npm make graphviz"));
        assert!(rendered.contains("dnf clean all"));
        assert!(rendered.contains("chown 1001:1001 /var/www/ && chmod 0755 /var/www/"));
        assert!(rendered.ends_with(
            "ENTRYPOINT [\"/opt/orgviz/web.py\",\"--outputDirectoryLocal\",\"/var/www/\"]\n"
        ));
    }

    #[test]
    fn test_user_is_last_before_entrypoint() {
        let rendered = DescriptorRenderer::new(&DeployOptions::default())
            .render()
            .unwrap();
        let lines: Vec<&str> = rendered.lines().filter(|l| !l.is_empty()).collect();
        assert!(lines[lines.len() - 2].starts_with("USER "));
        assert!(lines[lines.len() - 1].starts_with("ENTRYPOINT "));
    }

    #[test]
    fn test_supervised_entrypoint() {
        let rendered = DescriptorRenderer::new(&DeployOptions::default())
            .with_style(EntrypointStyle::Supervised)
            .render()
            .unwrap();
        assert!(rendered.ends_with(
            "ENTRYPOINT [\"/usr/local/bin/orgdeploy\",\"launch\",\"--user\",\"1001:1001\",\
             \"--output-directory-local\",\"/var/www/\",\"--program\",\"/opt/orgviz/web.py\"]\n"
        ));
    }

    #[test]
    fn test_supervised_entrypoint_carries_launch_settings() {
        let mut options = DeployOptions::default();
        options.set_runtime_identity(Identity::new(2000, 2000));
        options.launch.interpreter = Some("python3".into());
        options.launch.extra_args = vec!["--logging".into(), "10".into()];
        options.launch.jailer.pid_file = Some("/run/orgviz.pid".into());

        let rendered = DescriptorRenderer::new(&options)
            .with_style(EntrypointStyle::Supervised)
            .render()
            .unwrap();
        assert!(rendered.contains("USER 2000\n"));
        assert!(rendered.ends_with(
            "ENTRYPOINT [\"/usr/local/bin/orgdeploy\",\"launch\",\"--user\",\"2000:2000\",\
             \"--output-directory-local\",\"/var/www/\",\"--program\",\"/opt/orgviz/web.py\",\
             \"--interpreter\",\"python3\",\"--pid-file\",\"/run/orgviz.pid\",\
             \"--\",\"--logging\",\"10\"]\n"
        ));
    }

    #[test]
    fn test_interpreter_and_split_identity() {
        let mut options = DeployOptions::default();
        options.launch.interpreter = Some("python3".into());
        options.set_runtime_identity(Identity::new(1001, 50));

        let rendered = DescriptorRenderer::new(&options).render().unwrap();
        assert!(rendered.contains("USER 1001:50"));
        assert!(rendered.contains("chown 1001:50"));
        assert!(rendered.contains("ENTRYPOINT [\"python3\",\"/opt/orgviz/web.py\""));
    }

    #[test]
    fn test_apt_descriptor() {
        let mut options = DeployOptions::default();
        options.provision.package_manager = PackageManager::Apt;
        let rendered = DescriptorRenderer::new(&options).render().unwrap();
        assert!(rendered.contains("RUN apt-get update \\\n    && apt-get install -y --no-install-recommends"));
        assert!(rendered.contains("rm -rf /var/lib/apt/lists/* /var/cache/apt/archives/*"));
    }

    #[test]
    fn test_missing_output_dir_is_config_error() {
        let mut options = DeployOptions::default();
        options.launch.output_dir = None;
        let err = DescriptorRenderer::new(&options).render().unwrap_err();
        assert!(matches!(err, DeployError::Config(_)));
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("/var/www/"), "/var/www/");
        assert_eq!(quote("my dir"), "'my dir'");
        assert_eq!(quote("it's"), r"'it'\''s'");
    }
}
