//! Source acquisition.
//!
//! Populates a working directory with exactly the pinned revision of every
//! source a recipe declares. Acquisition is idempotent: a git destination
//! already at its pin, or an archive destination whose stamp matches, is left
//! untouched. Patched git destinations also need a stamp, written once every
//! patch applied.
//!
//! The actual transport sits behind [`SourceFetcher`] so the pipeline can be
//! driven without network access.

pub mod archive;
pub mod git;
pub mod patch;
pub mod stamp;

use std::future::Future;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::consts::SOURCE_STAMP;
use crate::recipe::Recipe;
use crate::recipe::types::{Revision, SourceOrigin, SourceSpec};
use archive::url_to_filename;
use stamp::SourceStamp;

#[derive(Debug, Error)]
pub enum SourceFetchError {
  #[error("failed to fetch '{url}': {message}")]
  Unreachable { url: String, message: String },

  #[error("revision '{rev}' not found in '{url}': {message}")]
  RevisionNotFound { url: String, rev: String, message: String },

  #[error("hash mismatch for '{url}': expected {expected}, got {actual}")]
  HashMismatch {
    url: String,
    expected: String,
    actual: String,
  },

  #[error("failed to extract '{}': {message}", .path.display())]
  Extract { path: PathBuf, message: String },

  #[error("unsupported archive format: '{0}'")]
  UnsupportedArchive(String),

  #[error("failed to apply patch '{}': {message}", .patch.display())]
  Patch { patch: PathBuf, message: String },

  #[error("failed to export '{}' into the working directory: {source}", .path.display())]
  Export {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}

/// The VCS and archive transport used to acquire sources.
pub trait SourceFetcher: Send + Sync + 'static {
  /// Materialize exactly `rev` of `url` at `dest`, including submodules when `recursive`.
  fn fetch(
    &self,
    url: &str,
    rev: &Revision,
    recursive: bool,
    dest: &Path,
  ) -> impl Future<Output = Result<(), SourceFetchError>> + Send;

  /// Download `url` to the file `dest`, verifying `sha256` when given.
  fn download(
    &self,
    url: &str,
    sha256: Option<&str>,
    dest: &Path,
  ) -> impl Future<Output = Result<(), SourceFetchError>> + Send;

  /// Apply the unified diff `patch` inside `dir`.
  fn apply_patch(
    &self,
    patch: &Path,
    strip: u32,
    dir: &Path,
  ) -> impl Future<Output = Result<(), SourceFetchError>> + Send;

  /// Whether the checkout at `dest` is already at `rev`.
  fn is_pinned(&self, dest: &Path, rev: &Revision) -> bool {
    git::is_pinned(dest, rev)
  }
}

/// Fetches with the host's `git` and `patch` executables and `reqwest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemFetcher {
  pub git: String,
  pub patch: String,
}

impl Default for SystemFetcher {
  fn default() -> Self {
    Self {
      git: "git".to_string(),
      patch: "patch".to_string(),
    }
  }
}

impl SystemFetcher {
  /// Tool paths from `PINFORGE_GIT` and `PINFORGE_PATCH`, when set.
  pub fn from_env() -> Self {
    let defaults = Self::default();
    Self {
      git: std::env::var("PINFORGE_GIT").unwrap_or(defaults.git),
      patch: std::env::var("PINFORGE_PATCH").unwrap_or(defaults.patch),
    }
  }
}

impl SourceFetcher for SystemFetcher {
  async fn fetch(&self, url: &str, rev: &Revision, recursive: bool, dest: &Path) -> Result<(), SourceFetchError> {
    git::fetch_pinned(&self.git, url, rev, recursive, dest).await
  }

  async fn download(&self, url: &str, sha256: Option<&str>, dest: &Path) -> Result<(), SourceFetchError> {
    archive::download(url, sha256, dest).await
  }

  async fn apply_patch(&self, patch: &Path, strip: u32, dir: &Path) -> Result<(), SourceFetchError> {
    patch::apply_patch(&self.patch, patch, strip, dir).await
  }
}

/// What [`acquire`] did for each source.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AcquireReport {
  pub fetched: Vec<String>,
  pub reused: Vec<String>,
}

/// Acquire every source of `recipe` under `src_root`, in declaration order.
pub async fn acquire<F: SourceFetcher>(
  fetcher: &F,
  recipe: &Recipe,
  src_root: &Path,
  downloads: &Path,
) -> Result<AcquireReport, SourceFetchError> {
  tokio::fs::create_dir_all(src_root).await?;
  let mut report = AcquireReport::default();

  for spec in &recipe.sources {
    let dest = src_root.join(&spec.dest);
    let stamp_path = src_root.join(format!("{}-{}", SOURCE_STAMP, spec.name));
    let patches: Vec<PathBuf> = spec.patches.iter().map(|p| p.file.clone()).collect();

    let stamp = match &spec.origin {
      SourceOrigin::Git { url, rev, .. } => SourceStamp::Git {
        url: url.clone(),
        rev: rev.to_string(),
        patches,
      },
      SourceOrigin::Archive {
        url,
        sha256,
        strip_components,
      } => SourceStamp::Archive {
        url: url.clone(),
        sha256: sha256.clone(),
        strip_components: *strip_components,
        patches,
      },
    };

    let current = match &spec.origin {
      SourceOrigin::Git { rev, .. } => {
        // An unpatched pin must not carry the stamp of an earlier, patched definition.
        fetcher.is_pinned(&dest, rev)
          && (stamp.matches(&stamp_path) || (spec.patches.is_empty() && !stamp_path.exists()))
      }
      SourceOrigin::Archive { .. } => dest.exists() && stamp.matches(&stamp_path),
    };
    if current {
      debug!(source = %spec.name, dest = %dest.display(), "source already at its pin");
      report.reused.push(spec.name.clone());
      continue;
    }

    SourceStamp::clear(&stamp_path).await?;
    match &spec.origin {
      SourceOrigin::Git { url, rev, recursive } => {
        // A forced checkout also discards a partially applied patch.
        fetcher.fetch(url, rev, *recursive, &dest).await?;
      }
      SourceOrigin::Archive {
        url,
        sha256,
        strip_components,
      } => {
        if sha256.is_none() {
          warn!(source = %spec.name, url = %url, "archive has no sha256; the URL is the only pin");
        }
        let archive_path = downloads.join(url_to_filename(url));
        fetcher.download(url, sha256.as_deref(), &archive_path).await?;

        let extract_dest = dest.clone();
        let strip = *strip_components;
        tokio::task::spawn_blocking(move || archive::extract(&archive_path, &extract_dest, strip))
          .await
          .map_err(std::io::Error::other)??;
      }
    }

    apply_patches(fetcher, recipe, spec, &dest).await?;
    // Stamped only once patched, so an interrupted run starts over.
    let stamped = match &stamp {
      SourceStamp::Git { patches, .. } => !patches.is_empty(),
      SourceStamp::Archive { .. } => true,
    };
    if stamped {
      stamp.write(&stamp_path)?;
    }
    report.fetched.push(spec.name.clone());
  }

  info!(
    recipe = %recipe.name,
    fetched = report.fetched.len(),
    reused = report.reused.len(),
    "sources acquired"
  );
  Ok(report)
}

async fn apply_patches<F: SourceFetcher>(
  fetcher: &F,
  recipe: &Recipe,
  spec: &SourceSpec,
  dest: &Path,
) -> Result<(), SourceFetchError> {
  for patch in &spec.patches {
    let file = recipe.recipe_dir.join(&patch.file);
    let dir = match &patch.base {
      Some(base) => dest.join(base),
      None => dest.to_path_buf(),
    };
    fetcher.apply_patch(&file, patch.strip, &dir).await?;
  }
  Ok(())
}

/// Copy the recipe's exported files into the working directory.
///
/// Runs after acquisition so exported files replace fetched ones.
pub fn copy_exports(recipe: &Recipe, src_root: &Path) -> Result<Vec<PathBuf>, SourceFetchError> {
  let mut copied = Vec::new();
  for export in &recipe.exports {
    let from = recipe.recipe_dir.join(export);
    let to = src_root.join(export);
    let export_err = |source| SourceFetchError::Export {
      path: from.clone(),
      source,
    };
    if let Some(parent) = to.parent() {
      std::fs::create_dir_all(parent).map_err(export_err)?;
    }
    std::fs::copy(&from, &to).map_err(export_err)?;
    debug!(file = %export, "exported into working directory");
    copied.push(to);
  }
  Ok(copied)
}
