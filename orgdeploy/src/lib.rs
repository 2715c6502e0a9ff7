//! orgdeploy - build-then-serve deployment pipeline for orgviz
//!
//! Turns a base image into a running orgviz web service in four stages:
//! install system packages, build the frontend, prepare the serving root
//! and launch `web.py` under an unprivileged identity. The same stage
//! sequence drives `orgdeploy run` inside a container and the rendered
//! build descriptor.

pub mod context;
pub mod descriptor;
pub mod jailer;
pub mod manifest;
pub mod options;
pub mod pipeline;
pub mod runner;
pub mod service;
pub mod stages;
pub mod util;
pub mod verify;

pub use context::{ExecutionContext, Identity};
pub use descriptor::{DescriptorRenderer, EntrypointStyle};
pub use manifest::{BuildManifest, LayerRecord};
pub use options::DeployOptions;
pub use pipeline::{DeployCtx, DeployPipelineContext, Pipeline, PipelineTask};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, HostRunner};
pub use service::{ServiceLauncher, ServiceState};
pub use verify::{Verifier, VerifyReport};

pub use orgdeploy_shared::errors::{DeployError, DeployResult};
pub use orgdeploy_shared::layout::ImageLayout;
