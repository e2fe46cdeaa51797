//! Artifact collection.
//!
//! Copies files matching [`ArtifactRule`]s out of the source and build trees
//! into the package layout. Search roots are visited in order (source tree,
//! then build tree) and each tree is walked sorted by file name, so when two
//! flattened files land on the same destination the "later" one is always the
//! same file.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::recipe::types::is_contained;

/// Which tree a rule searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootSelector {
  #[default]
  Any,
  Source,
  Build,
}

impl RootSelector {
  fn admits(&self, kind: TreeKind) -> bool {
    matches!(
      (self, kind),
      (RootSelector::Any, _) | (RootSelector::Source, TreeKind::Source) | (RootSelector::Build, TreeKind::Build)
    )
  }
}

impl FromStr for RootSelector {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "any" => Ok(RootSelector::Any),
      "source" => Ok(RootSelector::Source),
      "build" => Ok(RootSelector::Build),
      other => Err(format!("unknown search root '{}' (expected any, source or build)", other)),
    }
  }
}

/// What happens when two flattened files map to the same destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollisionPolicy {
  /// The later file silently replaces the earlier one.
  #[default]
  LastWriteWins,
  /// Fail with [`ArtifactError::Collision`].
  Error,
  /// Place flattened files under `dst/<tree>/` so trees cannot collide.
  Namespace,
}

impl FromStr for CollisionPolicy {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "last-write-wins" => Ok(CollisionPolicy::LastWriteWins),
      "error" => Ok(CollisionPolicy::Error),
      "namespace" => Ok(CollisionPolicy::Namespace),
      other => Err(format!(
        "unknown collision policy '{}' (expected last-write-wins, error or namespace)",
        other
      )),
    }
  }
}

impl fmt::Display for CollisionPolicy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      CollisionPolicy::LastWriteWins => "last-write-wins",
      CollisionPolicy::Error => "error",
      CollisionPolicy::Namespace => "namespace",
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRule {
  /// Glob matched against the path relative to `src`; `*` crosses directories.
  pub pattern: String,
  pub src: String,
  pub dst: String,
  pub keep_path: bool,
  /// Case-sensitive substrings; a path with any component containing one is skipped.
  pub excludes: Vec<String>,
  pub required: bool,
  pub root: RootSelector,
  /// Overrides the engine-wide policy for this rule.
  pub collision: Option<CollisionPolicy>,
}

impl ArtifactRule {
  pub fn new(pattern: &str, src: &str, dst: &str) -> Self {
    Self {
      pattern: pattern.to_string(),
      src: src.to_string(),
      dst: dst.to_string(),
      keep_path: true,
      excludes: Vec::new(),
      required: false,
      root: RootSelector::Any,
      collision: None,
    }
  }

  pub fn flatten(mut self) -> Self {
    self.keep_path = false;
    self
  }

  pub fn required(mut self) -> Self {
    self.required = true;
    self
  }

  pub fn excluding(mut self, excludes: &[&str]) -> Self {
    self.excludes = excludes.iter().map(|s| s.to_string()).collect();
    self
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeKind {
  Source,
  Build,
}

impl TreeKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      TreeKind::Source => "source",
      TreeKind::Build => "build",
    }
  }
}

#[derive(Debug, Clone)]
pub struct SearchRoot {
  pub kind: TreeKind,
  pub path: PathBuf,
}

#[derive(Debug, Error)]
pub enum ArtifactError {
  #[error("no files match required pattern '{pattern}' under {}", format_roots(.roots))]
  NotFound { pattern: String, roots: Vec<PathBuf> },

  #[error("'{}' and '{}' both flatten to '{}'", .first.display(), .second.display(), .dest.display())]
  Collision { dest: PathBuf, first: PathBuf, second: PathBuf },

  #[error("invalid pattern '{pattern}': {message}")]
  Pattern { pattern: String, message: String },

  #[error("destination '{0}' must be a relative path inside the package")]
  InvalidDestination(String),

  #[error("failed to copy '{}': {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to walk directory: {0}")]
  Walk(#[from] walkdir::Error),
}

fn format_roots(roots: &[PathBuf]) -> String {
  roots.iter().map(|r| r.display().to_string()).collect::<Vec<_>>().join(", ")
}

/// Files placed by [`collect`], relative to the package directory.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CollectReport {
  pub files: Vec<PathBuf>,
  pub overwritten: usize,
}

/// Apply every rule in order, copying matches into `package_dir`.
pub fn collect(
  rules: &[ArtifactRule],
  roots: &[SearchRoot],
  package_dir: &Path,
  default_policy: CollisionPolicy,
) -> Result<CollectReport, ArtifactError> {
  let mut report = CollectReport::default();
  let mut flattened: HashMap<PathBuf, PathBuf> = HashMap::new();

  for rule in rules {
    collect_rule(rule, roots, package_dir, default_policy, &mut flattened, &mut report)?;
  }

  Ok(report)
}

fn collect_rule(
  rule: &ArtifactRule,
  roots: &[SearchRoot],
  package_dir: &Path,
  default_policy: CollisionPolicy,
  flattened: &mut HashMap<PathBuf, PathBuf>,
  report: &mut CollectReport,
) -> Result<(), ArtifactError> {
  let pattern = Pattern::new(&rule.pattern).map_err(|e| ArtifactError::Pattern {
    pattern: rule.pattern.clone(),
    message: e.to_string(),
  })?;
  if !is_contained(Path::new(&rule.dst)) {
    return Err(ArtifactError::InvalidDestination(rule.dst.clone()));
  }
  let policy = rule.collision.unwrap_or(default_policy);
  let options = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
  };

  let mut searched = Vec::new();
  let mut matched = 0usize;

  for root in roots.iter().filter(|r| rule.root.admits(r.kind)) {
    let base = root.path.join(&rule.src);
    searched.push(base.clone());
    if !base.is_dir() {
      continue;
    }

    for entry in WalkDir::new(&base).sort_by_file_name() {
      let entry = entry?;
      if entry.file_type().is_dir() {
        continue;
      }
      let rel = entry.path().strip_prefix(&base).unwrap_or(entry.path());
      if is_excluded(rel, &rule.excludes) || !pattern.matches_path_with(rel, options) {
        continue;
      }
      matched += 1;

      let dest_rel = if rule.keep_path {
        Path::new(&rule.dst).join(rel)
      } else {
        let file_name = entry.file_name();
        match policy {
          CollisionPolicy::Namespace => Path::new(&rule.dst).join(root.kind.as_str()).join(file_name),
          _ => Path::new(&rule.dst).join(file_name),
        }
      };
      let dest_rel = normalize(&dest_rel);

      if !rule.keep_path
        && let Some(previous) = flattened.get(&dest_rel)
        && previous != entry.path()
      {
        if policy == CollisionPolicy::Error {
          return Err(ArtifactError::Collision {
            dest: dest_rel,
            first: previous.clone(),
            second: entry.path().to_path_buf(),
          });
        }
        debug!(
          dest = %dest_rel.display(),
          previous = %previous.display(),
          replacement = %entry.path().display(),
          "flattened artifact overwrites earlier copy"
        );
        report.overwritten += 1;
      }

      copy_file(entry.path(), &package_dir.join(&dest_rel))?;
      if !rule.keep_path {
        flattened.insert(dest_rel.clone(), entry.path().to_path_buf());
      }
      if !report.files.contains(&dest_rel) {
        report.files.push(dest_rel);
      }
    }
  }

  if matched == 0 {
    if rule.required {
      return Err(ArtifactError::NotFound {
        pattern: rule.pattern.clone(),
        roots: searched,
      });
    }
    warn!(pattern = %rule.pattern, src = %rule.src, "optional package rule matched nothing");
  }

  Ok(())
}

/// True when any component of `rel` contains one of the exclusion substrings.
pub fn is_excluded(rel: &Path, excludes: &[String]) -> bool {
  rel.components().any(|component| {
    let component = component.as_os_str().to_string_lossy();
    excludes.iter().any(|exclude| component.contains(exclude.as_str()))
  })
}

fn normalize(path: &Path) -> PathBuf {
  path.components().filter(|c| !matches!(c, Component::CurDir)).collect()
}

fn copy_file(from: &Path, to: &Path) -> Result<(), ArtifactError> {
  let io_err = |source| ArtifactError::Io {
    path: from.to_path_buf(),
    source,
  };
  if let Some(parent) = to.parent() {
    fs::create_dir_all(parent).map_err(io_err)?;
  }
  fs::copy(from, to).map_err(io_err)?;
  Ok(())
}
