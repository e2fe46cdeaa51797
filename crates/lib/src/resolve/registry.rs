//! The package registry: resolved [`PackageInfo`] by exact reference.
//!
//! Concurrent pipelines share one registry. A published PackageInfo is never
//! mutated; publishing the same reference again (a different configuration)
//! swaps in the newer entry, so readers always observe one complete
//! PackageInfo. Published records on disk let a later invocation satisfy
//! requirements without rebuilding.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use crate::export::PackageInfo;
use crate::recipe::{PackageRef, Requirement};
use crate::resolve::DependencyResolutionError;
use crate::store::paths::StorePaths;

#[derive(Debug, Default)]
pub struct PackageRegistry {
  store: Option<StorePaths>,
  entries: RwLock<HashMap<PackageRef, Arc<PackageInfo>>>,
}

impl PackageRegistry {
  /// A registry that forgets everything when dropped.
  pub fn in_memory() -> Self {
    Self::default()
  }

  /// A registry backed by the published records of `store`.
  pub fn with_store(store: StorePaths) -> Self {
    Self {
      store: Some(store),
      entries: RwLock::default(),
    }
  }

  /// Record `info` under its reference, replacing any earlier publication.
  ///
  /// The returned entry is always the one just published; the on-disk record
  /// is rewritten to match.
  pub fn publish(&self, info: PackageInfo) -> Result<Arc<PackageInfo>, DependencyResolutionError> {
    let reference = info.reference.clone();
    let entry = Arc::new(info);
    let replaced = self
      .entries
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(reference.clone(), entry.clone());

    if let Some(previous) = replaced
      && previous.root != entry.root
    {
      debug!(reference = %reference, previous = %previous.root.display(), root = %entry.root.display(), "replaced published package");
    }

    if let Some(store) = &self.store {
      let path = store.published_record(&reference);
      write_record(&path, &entry)?;
      info!(reference = %reference, record = %path.display(), "published");
    }

    Ok(entry)
  }

  /// Find a resolved package, falling back to its published record.
  pub fn lookup(&self, reference: &PackageRef) -> Result<Option<Arc<PackageInfo>>, DependencyResolutionError> {
    if let Some(found) = self
      .entries
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(reference)
    {
      return Ok(Some(found.clone()));
    }

    let Some(store) = &self.store else {
      return Ok(None);
    };
    let path = store.published_record(reference);
    let Some(info) = read_record(&path)? else {
      return Ok(None);
    };
    if info.reference != *reference {
      return Err(DependencyResolutionError::Record {
        path,
        message: format!("record describes {} instead", info.reference),
      });
    }
    if !info.root.is_dir() {
      debug!(reference = %reference, root = %info.root.display(), "published package no longer exists");
      return Ok(None);
    }

    let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
    let entry = entries.entry(reference.clone()).or_insert_with(|| Arc::new(info)).clone();
    Ok(Some(entry))
  }

  /// Resolve every requirement of `recipe`, in declaration order.
  pub fn resolve_requirements(
    &self,
    recipe: &PackageRef,
    requirements: &[Requirement],
  ) -> Result<Vec<Arc<PackageInfo>>, DependencyResolutionError> {
    requirements
      .iter()
      .map(|requirement| {
        self
          .lookup(&requirement.reference)?
          .ok_or_else(|| DependencyResolutionError::Missing {
            recipe: recipe.clone(),
            requirement: requirement.reference.clone(),
          })
      })
      .collect()
  }

  pub fn len(&self) -> usize {
    self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

fn write_record(path: &Path, info: &PackageInfo) -> Result<(), DependencyResolutionError> {
  let record_err = |message: String| DependencyResolutionError::Record {
    path: path.to_path_buf(),
    message,
  };
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).map_err(|e| record_err(e.to_string()))?;
  }
  let json = serde_json::to_string_pretty(info).map_err(|e| record_err(e.to_string()))?;
  std::fs::write(path, json).map_err(|e| record_err(e.to_string()))
}

fn read_record(path: &Path) -> Result<Option<PackageInfo>, DependencyResolutionError> {
  if !path.exists() {
    return Ok(None);
  }
  let record_err = |message: String| DependencyResolutionError::Record {
    path: path.to_path_buf(),
    message,
  };
  let content = std::fs::read_to_string(path).map_err(|e| record_err(e.to_string()))?;
  serde_json::from_str(&content).map(Some).map_err(|e| record_err(e.to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::recipe::DependencyKind;
  use std::path::PathBuf;
  use tempfile::TempDir;

  fn info(reference: &str, root: PathBuf, libs: &[&str]) -> PackageInfo {
    PackageInfo {
      reference: reference.parse().unwrap(),
      root: root.clone(),
      include_dirs: vec![root.join("include")],
      lib_dirs: vec![root.join("lib")],
      libs: libs.iter().map(|s| s.to_string()).collect(),
      requires: Vec::new(),
    }
  }

  #[test]
  fn latest_publication_replaces_entry_and_record() {
    let temp = TempDir::new().unwrap();
    let store = StorePaths::new(temp.path());
    let static_root = temp.path().join("pkg/imgui-static");
    let shared_root = temp.path().join("pkg/imgui-shared");
    std::fs::create_dir_all(&static_root).unwrap();
    std::fs::create_dir_all(&shared_root).unwrap();

    let registry = PackageRegistry::with_store(store.clone());
    let first = registry
      .publish(info("imgui/1.77.docking.3d4af15@wip", static_root.clone(), &["imgui"]))
      .unwrap();
    let second = registry
      .publish(info("imgui/1.77.docking.3d4af15@wip", shared_root.clone(), &["imgui"]))
      .unwrap();

    assert_eq!(first.root, static_root);
    assert_eq!(second.root, shared_root);
    assert_eq!(registry.len(), 1);
    let reference: PackageRef = "imgui/1.77.docking.3d4af15@wip".parse().unwrap();
    assert_eq!(registry.lookup(&reference).unwrap().unwrap().root, shared_root);

    let fresh = PackageRegistry::with_store(store);
    assert_eq!(fresh.lookup(&reference).unwrap().unwrap().root, shared_root);
  }

  #[test]
  fn requirements_resolve_exactly() {
    let registry = PackageRegistry::in_memory();
    registry
      .publish(info("imgui/1.78.docking.05bc204@wip", PathBuf::from("/a"), &["imgui"]))
      .unwrap();

    let recipe: PackageRef = "imgui_node_editor/0.1.cf3a1c3@wip".parse().unwrap();
    let requirement = Requirement {
      reference: "imgui/1.77.docking.3d4af15@wip".parse().unwrap(),
      kind: DependencyKind::Link,
    };
    let err = registry.resolve_requirements(&recipe, &[requirement]).unwrap_err();
    assert!(matches!(err, DependencyResolutionError::Missing { .. }));
  }

  #[test]
  fn published_records_survive_a_new_registry() {
    let temp = TempDir::new().unwrap();
    let store = StorePaths::new(temp.path());
    let root = temp.path().join("pkg/imgui-abc");
    std::fs::create_dir_all(&root).unwrap();

    PackageRegistry::with_store(store.clone())
      .publish(info("imgui/1.77.docking.3d4af15@wip", root.clone(), &["imgui"]))
      .unwrap();

    let fresh = PackageRegistry::with_store(store);
    let reference: PackageRef = "imgui/1.77.docking.3d4af15@wip".parse().unwrap();
    let found = fresh.lookup(&reference).unwrap().unwrap();
    assert_eq!(found.root, root);
    assert_eq!(fresh.len(), 1);
  }

  #[test]
  fn records_pointing_at_removed_packages_are_ignored() {
    let temp = TempDir::new().unwrap();
    let store = StorePaths::new(temp.path());
    PackageRegistry::with_store(store.clone())
      .publish(info("libnoise/1.0.0@stable", temp.path().join("gone"), &["noise"]))
      .unwrap();

    let fresh = PackageRegistry::with_store(store);
    assert!(fresh.lookup(&"libnoise/1.0.0@stable".parse().unwrap()).unwrap().is_none());
  }

  #[test]
  fn corrupt_record_is_an_error() {
    let temp = TempDir::new().unwrap();
    let store = StorePaths::new(temp.path());
    let reference: PackageRef = "libucl/0.8.1@stable".parse().unwrap();
    let path = store.published_record(&reference);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "not json").unwrap();

    let registry = PackageRegistry::with_store(store);
    assert!(matches!(
      registry.lookup(&reference),
      Err(DependencyResolutionError::Record { .. })
    ));
  }

  #[test]
  fn concurrent_readers_and_writers_agree() {
    let registry = Arc::new(PackageRegistry::in_memory());
    let handles: Vec<_> = (0..8)
      .map(|i| {
        let registry = registry.clone();
        std::thread::spawn(move || {
          let reference = format!("lib{}/1.0@stable", i % 4);
          registry.publish(info(&reference, PathBuf::from(format!("/{}", i)), &[])).unwrap();
          registry.lookup(&reference.parse().unwrap()).unwrap().unwrap()
        })
      })
      .collect();

    for handle in handles {
      handle.join().unwrap();
    }
    assert_eq!(registry.len(), 4);
  }
}
