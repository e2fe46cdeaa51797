//! Hashing for content-addressed package directories and download verification.
//!
//! - [`ObjectHash`]: truncated digest naming store directories
//! - [`ContentHash`]: full digest used to verify package layouts and archives
//! - [`hash_directory`]: deterministic digest of a directory tree

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use walkdir::WalkDir;

use crate::consts::OBJ_HASH_PREFIX_LEN;

/// A truncated 20-character SHA-256 of a JSON-serialized value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectHash(pub String);

impl std::fmt::Display for ObjectHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Anything serializable can be content-addressed.
///
/// Serialization goes through `serde_json`, so implementors should only use
/// ordered maps to keep the digest stable.
pub trait Hashable: Serialize {
  fn compute_hash(&self) -> Result<ObjectHash, serde_json::Error> {
    let serialized = serde_json::to_string(self)?;
    let full = hash_bytes(serialized.as_bytes());
    Ok(ObjectHash(full.0[..OBJ_HASH_PREFIX_LEN].to_string()))
  }
}

/// A full 64-character lowercase hex SHA-256.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, Error)]
pub enum DirHashError {
  #[error("failed to walk directory: {0}")]
  WalkDir(#[from] walkdir::Error),

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Compute a deterministic hash of a directory's contents.
///
/// File contents, relative paths, directory structure and symlink targets
/// contribute; timestamps and permissions do not. Top-level entries whose
/// name appears in `exclude` are skipped along with their subtrees.
pub fn hash_directory(path: &Path, exclude: &[&str]) -> Result<ContentHash, DirHashError> {
  let walker = WalkDir::new(path)
    .sort_by_file_name()
    .into_iter()
    .filter_entry(|e| e.depth() != 1 || e.file_name().to_str().is_none_or(|name| !exclude.contains(&name)));

  let mut hasher = Sha256::new();

  for entry in walker {
    let entry = entry?;
    if entry.depth() == 0 {
      continue;
    }

    let rel_path = entry
      .path()
      .strip_prefix(path)
      .unwrap_or(entry.path())
      .to_string_lossy()
      .replace('\\', "/");

    let file_type = entry.file_type();
    let line = if file_type.is_symlink() {
      let target = fs::read_link(entry.path()).map_err(|source| DirHashError::Read {
        path: entry.path().to_path_buf(),
        source,
      })?;
      format!("L:{}:{}", rel_path, target.to_string_lossy())
    } else if file_type.is_dir() {
      format!("D:{}", rel_path)
    } else if file_type.is_file() {
      format!("F:{}:{}", rel_path, hash_file(entry.path())?.0)
    } else {
      continue;
    };

    hasher.update(line.as_bytes());
    hasher.update(b"\n");
  }

  Ok(ContentHash(hex::encode(hasher.finalize())))
}

/// Hash a file's contents, streaming it in fixed-size chunks.
pub fn hash_file(path: &Path) -> Result<ContentHash, DirHashError> {
  let read_err = |source| DirHashError::Read {
    path: path.to_path_buf(),
    source,
  };

  let mut file = fs::File::open(path).map_err(read_err)?;
  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let n = file.read(&mut buffer).map_err(read_err)?;
    if n == 0 {
      break;
    }
    hasher.update(&buffer[..n]);
  }

  Ok(ContentHash(hex::encode(hasher.finalize())))
}

pub fn hash_bytes(data: &[u8]) -> ContentHash {
  ContentHash(hex::encode(Sha256::digest(data)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  #[derive(Serialize)]
  struct Key<'a> {
    name: &'a str,
  }

  impl Hashable for Key<'_> {}

  #[test]
  fn object_hash_is_truncated_and_stable() {
    let a = Key { name: "imgui" }.compute_hash().unwrap();
    let b = Key { name: "imgui" }.compute_hash().unwrap();
    let c = Key { name: "rttr" }.compute_hash().unwrap();
    assert_eq!(a.0.len(), OBJ_HASH_PREFIX_LEN);
    assert_eq!(a, b);
    assert_ne!(a, c);
  }

  #[test]
  fn directory_hash_is_deterministic() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("a.txt"), "content a").unwrap();
    fs::create_dir(temp.path().join("lib")).unwrap();
    fs::write(temp.path().join("lib/libfoo.a"), "archive").unwrap();

    let first = hash_directory(temp.path(), &[]).unwrap();
    let second = hash_directory(temp.path(), &[]).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.0.len(), 64);
  }

  #[test]
  fn directory_hash_tracks_content_and_structure() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("file.txt"), "original").unwrap();
    let original = hash_directory(temp.path(), &[]).unwrap();

    fs::write(temp.path().join("file.txt"), "modified").unwrap();
    let modified = hash_directory(temp.path(), &[]).unwrap();
    assert_ne!(original, modified);

    let other = tempdir().unwrap();
    fs::create_dir(other.path().join("nested")).unwrap();
    fs::write(other.path().join("nested/file.txt"), "modified").unwrap();
    assert_ne!(modified, hash_directory(other.path(), &[]).unwrap());
  }

  #[test]
  fn directory_hash_skips_excluded_top_level_entries() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("file.txt"), "content").unwrap();
    let before = hash_directory(temp.path(), &[".pinforge-manifest.json"]).unwrap();

    fs::write(temp.path().join(".pinforge-manifest.json"), "{}").unwrap();
    let after = hash_directory(temp.path(), &[".pinforge-manifest.json"]).unwrap();
    assert_eq!(before, after);
  }

  #[test]
  fn file_hash_matches_byte_hash() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("blob");
    fs::write(&path, b"hello world").unwrap();
    assert_eq!(hash_file(&path).unwrap(), hash_bytes(b"hello world"));
  }
}
