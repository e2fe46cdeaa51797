use std::path::PathBuf;

use crate::platform::paths::data_dir;
use crate::recipe::reference::PackageRef;
use crate::util::hash::ObjectHash;

/// Scratch directories used while a single configuration is being built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDirs {
  pub root: PathBuf,
  pub src: PathBuf,
  pub build: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
  pub root: PathBuf,
}

impl StorePaths {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  /// The store selected by `PINFORGE_STORE`, or the per-user default.
  pub fn current() -> Self {
    Self::new(Self::store_path())
  }

  pub fn store_path() -> PathBuf {
    if let Ok(path) = std::env::var("PINFORGE_STORE") {
      return PathBuf::from(path);
    }

    Self::default_store_path()
  }

  pub fn default_store_path() -> PathBuf {
    data_dir().join("store")
  }

  pub fn work_dirs(&self, key: &ObjectHash) -> WorkDirs {
    let root = self.root.join("work").join(&key.0);
    WorkDirs {
      src: root.join("src"),
      build: root.join("build"),
      root,
    }
  }

  pub fn package_dir(&self, name: &str, key: &ObjectHash) -> PathBuf {
    self.root.join("pkg").join(format!("{}-{}", name, key.0))
  }

  pub fn downloads_dir(&self) -> PathBuf {
    self.root.join("downloads")
  }

  pub fn refs_dir(&self) -> PathBuf {
    self.root.join("refs")
  }

  /// Where the published record for `reference` lives.
  pub fn published_record(&self, reference: &PackageRef) -> PathBuf {
    self
      .refs_dir()
      .join(&reference.name)
      .join(&reference.version)
      .join(format!("{}.json", reference.channel))
  }
}
