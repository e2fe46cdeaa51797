//! Types for recipe execution.
//!
//! Stages, the failure taxonomy, execution reports and engine configuration.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use crate::build::BuildToolError;
use crate::collect::{ArtifactError, CollisionPolicy};
use crate::consts::DEFAULT_CHANNEL;
use crate::export::{ExportError, PackageInfo};
use crate::options::{OptionValidationError, Overrides, host_settings};
use crate::recipe::{PackageRef, RecipeError};
use crate::resolve::DependencyResolutionError;
use crate::source::SourceFetchError;
use crate::store::paths::StorePaths;
use crate::util::hash::DirHashError;
use crate::util::process::CapturedOutput;

/// The pipeline stage a recipe was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
  Load,
  Options,
  Dependencies,
  Source,
  Build,
  Collect,
  Export,
  Store,
}

impl Stage {
  pub fn as_str(&self) -> &'static str {
    match self {
      Stage::Load => "load",
      Stage::Options => "options",
      Stage::Dependencies => "dependencies",
      Stage::Source => "source",
      Stage::Build => "build",
      Stage::Collect => "collect",
      Stage::Export => "export",
      Stage::Store => "store",
    }
  }
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Any error a single pipeline stage can produce.
#[derive(Debug, Error)]
pub enum StageError {
  #[error(transparent)]
  Recipe(#[from] RecipeError),

  #[error(transparent)]
  Options(#[from] OptionValidationError),

  #[error(transparent)]
  Dependency(#[from] DependencyResolutionError),

  #[error(transparent)]
  Source(#[from] SourceFetchError),

  #[error(transparent)]
  Build(#[from] BuildToolError),

  #[error(transparent)]
  Artifact(#[from] ArtifactError),

  #[error(transparent)]
  Export(#[from] ExportError),

  #[error("failed to hash: {0}")]
  Hash(#[from] DirHashError),

  #[error("failed to serialize: {0}")]
  Serialize(#[from] serde_json::Error),

  #[error("store error at '{}': {source}", .path.display())]
  Store {
    path: std::path::PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("pipeline task did not complete: {0}")]
  Task(String),
}

/// A recipe that did not produce a package, with the stage it stopped at.
#[derive(Debug, Error)]
#[error("{reference} failed during {stage}: {source}")]
pub struct RecipeFailure {
  pub reference: PackageRef,
  pub stage: Stage,
  #[source]
  pub source: StageError,
}

impl RecipeFailure {
  pub fn new(reference: &PackageRef, stage: Stage, source: impl Into<StageError>) -> Self {
    Self {
      reference: reference.clone(),
      stage,
      source: source.into(),
    }
  }

  /// The package whose own pipeline failed, and why.
  ///
  /// For a recipe skipped because of an upstream failure this is the
  /// upstream root, not the recipe itself.
  pub fn root_cause(&self) -> (PackageRef, String) {
    match &self.source {
      StageError::Dependency(DependencyResolutionError::UpstreamFailed { root, cause, .. }) => {
        (root.clone(), cause.clone())
      }
      other => (self.reference.clone(), format!("{} stage: {}", self.stage, other)),
    }
  }

  /// Captured tool output, when a build tool invocation failed.
  pub fn diagnostics(&self) -> Option<&CapturedOutput> {
    match &self.source {
      StageError::Build(err) => err.diagnostics(),
      _ => None,
    }
  }
}

/// Errors that stop an execution before any recipe runs.
#[derive(Debug, Error)]
pub enum ExecuteError {
  #[error(transparent)]
  Recipe(#[from] RecipeError),

  #[error(transparent)]
  Dependency(#[from] DependencyResolutionError),

  #[error(transparent)]
  Failed(#[from] Box<RecipeFailure>),
}

impl From<RecipeFailure> for ExecuteError {
  fn from(failure: RecipeFailure) -> Self {
    ExecuteError::Failed(Box::new(failure))
  }
}

/// Outcome of [`Engine::execute`](super::Engine::execute).
#[derive(Debug, Default)]
pub struct ExecutionReport {
  /// Every package produced or reused, keyed by reference.
  pub resolved: BTreeMap<PackageRef, Arc<PackageInfo>>,
  /// The subset of `resolved` served from the cache.
  pub cached: BTreeSet<PackageRef>,
  pub failed: BTreeMap<PackageRef, RecipeFailure>,
  /// Recipes never scheduled because execution was cancelled.
  pub cancelled: Vec<PackageRef>,
}

impl ExecutionReport {
  pub fn is_success(&self) -> bool {
    self.failed.is_empty() && self.cancelled.is_empty()
  }

  pub fn total(&self) -> usize {
    self.resolved.len() + self.failed.len() + self.cancelled.len()
  }
}

/// Engine-wide configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
  pub store: StorePaths,
  /// Maximum number of recipe pipelines running at once.
  pub parallelism: usize,
  /// Applied to rules that do not set their own policy.
  pub collision_policy: CollisionPolicy,
  /// Default setting values; recipes only see the axes they declare.
  pub settings: BTreeMap<String, String>,
  /// Parallel jobs passed to the build tool.
  pub jobs: Option<usize>,
}

impl EngineConfig {
  pub fn new(store: StorePaths) -> Self {
    Self {
      store,
      parallelism: default_parallelism(),
      collision_policy: CollisionPolicy::default(),
      settings: host_settings(),
      jobs: None,
    }
  }

  /// Store from `PINFORGE_STORE`, settings from the host and `PINFORGE_COMPILER`.
  pub fn from_env() -> Self {
    Self::new(StorePaths::current())
  }
}

fn default_parallelism() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

/// Stops scheduling further recipes. Running pipelines finish normally.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

/// A caller's request for one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub name: String,
  /// Canonical version; may be omitted when the recipe book holds exactly one.
  pub version: Option<String>,
  pub channel: String,
  pub overrides: Overrides,
}

impl Request {
  pub fn new(name: &str) -> Self {
    Self {
      name: name.to_string(),
      version: None,
      channel: DEFAULT_CHANNEL.to_string(),
      overrides: Overrides::new(),
    }
  }

  /// Parse `name[/version][@channel]`.
  pub fn parse(raw: &str) -> Result<Self, RecipeError> {
    let (rest, channel) = match raw.rsplit_once('@') {
      Some((rest, channel)) => (rest, channel),
      None => (raw, DEFAULT_CHANNEL),
    };
    let (name, version) = match rest.split_once('/') {
      Some((name, version)) => (name, Some(version)),
      None => (rest, None),
    };

    // Reuses the reference grammar for validation.
    PackageRef::new(name, version.unwrap_or("0"), channel)?;

    Ok(Self {
      name: name.to_string(),
      version: version.map(str::to_string),
      channel: channel.to_string(),
      overrides: Overrides::new(),
    })
  }

  pub fn with_overrides(mut self, overrides: Overrides) -> Self {
    self.overrides = overrides;
    self
  }
}

impl fmt::Display for Request {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.name)?;
    if let Some(version) = &self.version {
      write!(f, "/{}", version)?;
    }
    write!(f, "@{}", self.channel)
  }
}
