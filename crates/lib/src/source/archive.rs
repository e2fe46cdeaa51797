//! Archive sources: verified downloads and extraction.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::source::SourceFetchError;
use crate::util::hash::hash_file;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
  TarGz,
  Tar,
  Zip,
}

impl ArchiveKind {
  pub fn detect(file_name: &str) -> Option<Self> {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
      Some(ArchiveKind::TarGz)
    } else if lower.ends_with(".tar") {
      Some(ArchiveKind::Tar)
    } else if lower.ends_with(".zip") {
      Some(ArchiveKind::Zip)
    } else {
      None
    }
  }
}

/// Download `url` to `dest`, verifying its SHA-256 when one is given.
///
/// An existing file whose hash already matches is reused.
pub async fn download(url: &str, expected_sha256: Option<&str>, dest: &Path) -> Result<(), SourceFetchError> {
  if let Some(parent) = dest.parent() {
    tokio::fs::create_dir_all(parent).await?;
  }

  if let Some(expected) = expected_sha256
    && dest.exists()
  {
    if let Ok(actual) = hash_file(dest)
      && actual.0 == expected
    {
      info!(path = %dest.display(), "using cached download");
      return Ok(());
    }
    debug!(path = %dest.display(), "cached download hash mismatch, re-downloading");
  }

  info!(url = %url, "downloading");
  let unreachable = |message: String| SourceFetchError::Unreachable {
    url: url.to_string(),
    message,
  };

  let response = reqwest::get(url).await.map_err(|e| unreachable(e.to_string()))?;
  if !response.status().is_success() {
    return Err(unreachable(format!("HTTP {}", response.status())));
  }
  let bytes = response.bytes().await.map_err(|e| unreachable(e.to_string()))?;

  let actual = hex::encode(Sha256::digest(&bytes));
  if let Some(expected) = expected_sha256
    && actual != expected
  {
    return Err(SourceFetchError::HashMismatch {
      url: url.to_string(),
      expected: expected.to_string(),
      actual,
    });
  }

  let mut file = tokio::fs::File::create(dest).await?;
  file.write_all(&bytes).await?;
  file.flush().await?;

  info!(path = %dest.display(), size = bytes.len(), sha256 = %actual, "download complete");
  Ok(())
}

/// Convert a URL to a safe file name, keeping archive extensions intact.
pub fn url_to_filename(url: &str) -> String {
  let last = url.rsplit('/').next().unwrap_or(url);
  let last = last.split(['?', '#']).next().unwrap_or(last);
  let sanitized: String = last
    .chars()
    .map(|c| {
      if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
        c
      } else {
        '_'
      }
    })
    .collect();

  if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
    format!("download-{}", &hex::encode(Sha256::digest(url.as_bytes()))[..16])
  } else {
    sanitized
  }
}

/// Unpack `archive` into `dest`, dropping `strip` leading path components.
pub fn extract(archive: &Path, dest: &Path, strip: usize) -> Result<(), SourceFetchError> {
  let name = archive
    .file_name()
    .map(|n| n.to_string_lossy().to_string())
    .unwrap_or_default();
  let kind = ArchiveKind::detect(&name).ok_or_else(|| SourceFetchError::UnsupportedArchive(name.clone()))?;
  let extract_err = |message: String| SourceFetchError::Extract {
    path: archive.to_path_buf(),
    message,
  };

  fs::create_dir_all(dest)?;
  let file = BufReader::new(File::open(archive)?);

  let result = match kind {
    ArchiveKind::TarGz => extract_tar(tar::Archive::new(GzDecoder::new(file)), dest, strip),
    ArchiveKind::Tar => extract_tar(tar::Archive::new(file), dest, strip),
    ArchiveKind::Zip => extract_zip(file, dest, strip),
  };
  result.map_err(|e| extract_err(e.to_string()))?;

  debug!(archive = %archive.display(), dest = %dest.display(), "extracted");
  Ok(())
}

/// `None` for entries that vanish after stripping or would escape `dest`.
fn stripped(path: &Path, strip: usize) -> Option<PathBuf> {
  let mut out = PathBuf::new();
  for component in path.components().skip(strip) {
    match component {
      Component::Normal(part) => out.push(part),
      Component::CurDir => {}
      _ => return None,
    }
  }
  if out.as_os_str().is_empty() { None } else { Some(out) }
}

fn extract_tar<R: io::Read>(mut archive: tar::Archive<R>, dest: &Path, strip: usize) -> io::Result<()> {
  for entry in archive.entries()? {
    let mut entry = entry?;
    let path = entry.path()?.into_owned();
    // Leading "./" would otherwise count as a stripped component.
    let path: PathBuf = path.components().filter(|c| !matches!(c, Component::CurDir)).collect();
    let Some(rel) = stripped(&path, strip) else {
      continue;
    };
    let target = dest.join(rel);
    if let Some(parent) = target.parent() {
      fs::create_dir_all(parent)?;
    }
    entry.unpack(&target)?;
  }
  Ok(())
}

fn extract_zip<R: io::Read + io::Seek>(reader: R, dest: &Path, strip: usize) -> io::Result<()> {
  let mut archive = zip::ZipArchive::new(reader).map_err(io::Error::other)?;
  for i in 0..archive.len() {
    let mut file = archive.by_index(i).map_err(io::Error::other)?;
    let Some(path) = file.enclosed_name() else {
      continue;
    };
    let Some(rel) = stripped(&path, strip) else {
      continue;
    };
    let target = dest.join(rel);

    if file.is_dir() {
      fs::create_dir_all(&target)?;
      continue;
    }
    if let Some(parent) = target.parent() {
      fs::create_dir_all(parent)?;
    }
    let mut out = File::create(&target)?;
    io::copy(&mut file, &mut out)?;

    #[cfg(unix)]
    if let Some(mode) = file.unix_mode() {
      use std::os::unix::fs::PermissionsExt;
      fs::set_permissions(&target, fs::Permissions::from_mode(mode))?;
    }
  }
  Ok(())
}
