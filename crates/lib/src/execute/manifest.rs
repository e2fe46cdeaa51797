//! The cache manifest written last into a finished package directory.
//!
//! A package directory is valid only when its manifest exists, belongs to the
//! same cache key, and the recorded layout hash matches what is on disk.
//! Anything else means the directory is discarded and rebuilt.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::consts::MANIFEST_MARKER;
use crate::execute::types::StageError;
use crate::export::PackageInfo;
use crate::options::BuildConfiguration;
use crate::recipe::PackageRef;
use crate::util::hash::{ObjectHash, hash_directory};

/// Current manifest format.
const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
  pub version: u32,
  pub reference: PackageRef,
  pub key: ObjectHash,
  pub configuration: BuildConfiguration,
  pub package: PackageInfo,
  /// SHA-256 of the package layout, excluding this manifest.
  pub output_hash: String,
}

impl PackageManifest {
  /// Hash the finished layout in `package_dir` and describe it.
  pub fn seal(
    package_dir: &Path,
    reference: &PackageRef,
    key: &ObjectHash,
    configuration: &BuildConfiguration,
    package: &PackageInfo,
  ) -> Result<Self, StageError> {
    let output_hash = hash_directory(package_dir, &[MANIFEST_MARKER])?;
    Ok(Self {
      version: MANIFEST_VERSION,
      reference: reference.clone(),
      key: key.clone(),
      configuration: configuration.clone(),
      package: package.clone(),
      output_hash: output_hash.0,
    })
  }

  pub fn write(&self, package_dir: &Path) -> Result<(), StageError> {
    let path = package_dir.join(MANIFEST_MARKER);
    let content = serde_json::to_string_pretty(self)?;
    std::fs::write(&path, format!("{}\n", content)).map_err(|source| StageError::Store { path, source })
  }

  /// Read the manifest, if there is one.
  pub fn read(package_dir: &Path) -> Result<Option<Self>, StageError> {
    let path = package_dir.join(MANIFEST_MARKER);
    if !path.exists() {
      return Ok(None);
    }
    let content = std::fs::read_to_string(&path).map_err(|source| StageError::Store { path, source })?;
    Ok(Some(serde_json::from_str(&content)?))
  }

  /// Load the manifest only if the package directory can be reused as is.
  pub fn load_valid(package_dir: &Path, reference: &PackageRef, key: &ObjectHash) -> Option<Self> {
    let manifest = match Self::read(package_dir) {
      Ok(Some(manifest)) => manifest,
      Ok(None) => return None,
      Err(e) => {
        warn!(path = ?package_dir, error = %e, "unreadable manifest, will rebuild");
        return None;
      }
    };

    if manifest.version != MANIFEST_VERSION || manifest.reference != *reference || manifest.key != *key {
      debug!(path = ?package_dir, "manifest belongs to another build, will rebuild");
      return None;
    }

    match hash_directory(package_dir, &[MANIFEST_MARKER]) {
      Ok(actual) if actual.0 == manifest.output_hash => Some(manifest),
      Ok(actual) => {
        warn!(
          path = ?package_dir,
          expected = %manifest.output_hash,
          actual = %actual.0,
          "package layout changed since it was built, will rebuild"
        );
        None
      }
      Err(e) => {
        warn!(path = ?package_dir, error = %e, "failed to hash package, will rebuild");
        None
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::options::{Overrides, resolve_options};
  use crate::util::testutil::{recipe_fixture, settings_fixture};
  use std::fs;
  use tempfile::TempDir;

  fn sealed(dir: &Path) -> PackageManifest {
    let recipe = recipe_fixture("libnoise", "1.0.0");
    let reference: PackageRef = "libnoise/1.0.0@stable".parse().unwrap();
    let config = resolve_options(&recipe, &Overrides::new(), &settings_fixture()).unwrap();
    let info = crate::export::describe(&recipe, &reference, &config, dir).unwrap();
    let manifest = PackageManifest::seal(dir, &reference, &ObjectHash("k".repeat(20)), &config, &info).unwrap();
    manifest.write(dir).unwrap();
    manifest
  }

  #[test]
  fn valid_manifest_round_trips() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("lib")).unwrap();
    fs::write(temp.path().join("lib/libnoise.a"), "archive").unwrap();

    let written = sealed(temp.path());
    let loaded = PackageManifest::load_valid(temp.path(), &written.reference, &written.key).unwrap();
    assert_eq!(loaded, written);
    assert_eq!(loaded.package.libs, vec!["noise"]);
  }

  #[test]
  fn tampered_layout_invalidates() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("lib")).unwrap();
    fs::write(temp.path().join("lib/libnoise.a"), "archive").unwrap();
    let written = sealed(temp.path());

    fs::write(temp.path().join("lib/libnoise.a"), "changed").unwrap();
    assert!(PackageManifest::load_valid(temp.path(), &written.reference, &written.key).is_none());
  }

  #[test]
  fn other_key_invalidates() {
    let temp = TempDir::new().unwrap();
    let written = sealed(temp.path());
    let other = ObjectHash("x".repeat(20));
    assert!(PackageManifest::load_valid(temp.path(), &written.reference, &other).is_none());
  }

  #[test]
  fn missing_or_corrupt_manifest_is_not_a_hit() {
    let temp = TempDir::new().unwrap();
    let reference: PackageRef = "libnoise/1.0.0@stable".parse().unwrap();
    let key = ObjectHash("k".repeat(20));
    assert!(PackageManifest::load_valid(temp.path(), &reference, &key).is_none());

    fs::write(temp.path().join(MANIFEST_MARKER), "{").unwrap();
    assert!(PackageManifest::load_valid(temp.path(), &reference, &key).is_none());
    assert!(PackageManifest::read(temp.path()).is_err());
  }
}
