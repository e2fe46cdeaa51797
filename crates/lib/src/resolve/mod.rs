//! Dependency resolution.
//!
//! - [`graph`]: the execution DAG over package references and its waves
//! - [`registry`]: the shared, append-only table of resolved packages
//!
//! Pins are exact. A requirement resolves only to a package with the same
//! name, canonical version and channel; there is no fallback to a nearby
//! version.

pub mod graph;
pub mod registry;

use std::path::PathBuf;

use thiserror::Error;

use crate::recipe::PackageRef;

pub use graph::ExecutionDag;
pub use registry::PackageRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyResolutionError {
  #[error("{recipe} requires {requirement}, which has not been resolved or published")]
  Missing { recipe: PackageRef, requirement: PackageRef },

  #[error("{recipe} was not attempted because its dependency {dependency} failed (root cause in {root}: {cause})")]
  UpstreamFailed {
    recipe: PackageRef,
    dependency: PackageRef,
    /// The package whose own pipeline actually failed.
    root: PackageRef,
    cause: String,
  },

  #[error("dependency cycle involving {0}")]
  Cycle(PackageRef),

  #[error("published record '{}' could not be used: {message}", .path.display())]
  Record { path: PathBuf, message: String },
}
