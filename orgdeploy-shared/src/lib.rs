//! orgdeploy shared - types used by both the pipeline library and the CLI
//!
//! This crate contains the error taxonomy, well-known constants (paths,
//! identities, exit codes) and the image filesystem layout.

pub mod constants;
pub mod errors;
pub mod layout;

pub use errors::{DeployError, DeployResult};
pub use layout::ImageLayout;
