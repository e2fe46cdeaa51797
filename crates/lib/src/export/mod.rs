//! Metadata export: turns a finished package layout into a [`PackageInfo`].

pub mod discover;
pub mod generators;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::PACKAGE_INFO_FILE;
use crate::options::{BuildConfiguration, OptionValidationError, substitute};
use crate::recipe::{DependencyKind, PackageRef, Recipe};

pub use discover::{discover_libraries, library_name};
pub use generators::{Generator, write_generators};

/// How a recipe describes its package to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSpec {
  /// Search order matters; kept exactly as declared.
  pub include_dirs: Vec<String>,
  pub lib_dirs: Vec<String>,
  /// Explicit library names; `None` means discover them in `lib_dirs`.
  pub libs: Option<Vec<String>>,
}

impl Default for ExportSpec {
  fn default() -> Self {
    Self {
      include_dirs: vec!["include".to_string()],
      lib_dirs: vec!["lib".to_string()],
      libs: None,
    }
  }
}

/// The consumable description of one built package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
  pub reference: PackageRef,
  pub root: PathBuf,
  pub include_dirs: Vec<PathBuf>,
  pub lib_dirs: Vec<PathBuf>,
  pub libs: Vec<String>,
  /// Link-time requirements consumers must also link against.
  pub requires: Vec<PackageRef>,
}

#[derive(Debug, Error)]
pub enum ExportError {
  #[error(transparent)]
  Placeholder(#[from] OptionValidationError),

  #[error("failed to write package metadata in '{}': {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to serialize package metadata: {0}")]
  Serialize(#[from] serde_json::Error),
}

/// Describe the package in `package_dir`. Nothing is written.
pub fn describe(
  recipe: &Recipe,
  reference: &PackageRef,
  config: &BuildConfiguration,
  package_dir: &Path,
) -> Result<PackageInfo, ExportError> {
  let resolve_dirs = |dirs: &[String]| -> Result<Vec<PathBuf>, OptionValidationError> {
    dirs
      .iter()
      .map(|dir| Ok(package_dir.join(substitute(dir, config)?)))
      .collect()
  };

  let include_dirs = resolve_dirs(&recipe.info.include_dirs)?;
  let lib_dirs = resolve_dirs(&recipe.info.lib_dirs)?;

  let libs = match &recipe.info.libs {
    Some(libs) => libs
      .iter()
      .map(|lib| substitute(lib, config))
      .collect::<Result<Vec<_>, _>>()?,
    None => discover_libraries(&lib_dirs).map_err(|source| ExportError::Io {
      path: package_dir.to_path_buf(),
      source,
    })?,
  };

  let requires = recipe
    .requires
    .iter()
    .filter(|r| r.kind == DependencyKind::Link)
    .map(|r| r.reference.clone())
    .collect();

  debug!(reference = %reference, libs = ?libs, "described package");

  Ok(PackageInfo {
    reference: reference.clone(),
    root: package_dir.to_path_buf(),
    include_dirs,
    lib_dirs,
    libs,
    requires,
  })
}

/// Describe the package and write `package.json` plus generator outputs.
pub fn export(
  recipe: &Recipe,
  reference: &PackageRef,
  config: &BuildConfiguration,
  package_dir: &Path,
) -> Result<PackageInfo, ExportError> {
  let info = describe(recipe, reference, config, package_dir)?;
  let io_err = |source| ExportError::Io {
    path: package_dir.to_path_buf(),
    source,
  };

  std::fs::create_dir_all(package_dir).map_err(io_err)?;
  let json = serde_json::to_string_pretty(&info)?;
  std::fs::write(package_dir.join(PACKAGE_INFO_FILE), json).map_err(io_err)?;
  write_generators(&recipe.generators, &info, package_dir).map_err(io_err)?;

  Ok(info)
}
