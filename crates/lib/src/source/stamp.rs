//! Stamps recording what populated a source destination.
//!
//! A stamp is written only after the destination is complete, patches
//! included, and removed before it is repopulated.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::source::SourceFetchError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum SourceStamp {
  Archive {
    url: String,
    sha256: Option<String>,
    strip_components: usize,
    #[serde(default)]
    patches: Vec<PathBuf>,
  },
  /// Git checkouts are pinned by `HEAD`; the stamp only vouches for patches.
  Git {
    url: String,
    rev: String,
    patches: Vec<PathBuf>,
  },
}

impl SourceStamp {
  pub fn read(path: &Path) -> Option<Self> {
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
  }

  pub fn write(&self, path: &Path) -> Result<(), SourceFetchError> {
    let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
    std::fs::write(path, json)?;
    Ok(())
  }

  pub fn matches(&self, path: &Path) -> bool {
    Self::read(path).as_ref() == Some(self)
  }

  /// Forget what populated a destination that is about to change.
  pub async fn clear(path: &Path) -> Result<(), SourceFetchError> {
    match tokio::fs::remove_file(path).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(e.into()),
    }
  }
}
