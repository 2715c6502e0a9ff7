//! Deployment stages.
//!
//! Each stage is a function with typed input/output. Stages do ONE thing
//! and report their postcondition through their output.
//!
//! ## Stage Dependency Graph
//!
//! ```text
//! Provision ──→ Assets ──→ ServingRoot ──→ Launch
//!  (root)        (root)      (root)        (runtime identity)
//! ```

pub mod assets;
pub mod launch;
pub mod provision;
pub mod serving_root;
