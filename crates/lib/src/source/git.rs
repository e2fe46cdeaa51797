//! Git sources: pin checks in-process with `gix`, fetching with the git CLI.

use std::path::Path;

use tracing::{debug, info};

use crate::recipe::types::Revision;
use crate::source::SourceFetchError;
use crate::util::process::run_tool;

/// The commit `HEAD` points at, if `dest` is a git work tree.
pub fn head_commit(dest: &Path) -> Option<String> {
  if !dest.join(".git").exists() {
    return None;
  }
  let repo = gix::open(dest).ok()?;
  let head = repo.head_id().ok()?;
  Some(head.to_string())
}

/// Whether `dest` is already checked out at exactly `rev`.
pub fn is_pinned(dest: &Path, rev: &Revision) -> bool {
  let Some(head) = head_commit(dest) else {
    return false;
  };
  match rev {
    Revision::Commit(id) => head.starts_with(id.as_str()),
    Revision::Tag(tag) => {
      let Ok(repo) = gix::open(dest) else {
        return false;
      };
      let spec = format!("refs/tags/{}^{{commit}}", tag);
      repo
        .rev_parse_single(spec.as_str())
        .map(|id| id.to_string() == head)
        .unwrap_or(false)
    }
  }
}

/// Bring `dest` to exactly `rev` of `url`, initializing a repository there if needed.
///
/// Works in non-empty directories so several sources may share a parent.
pub async fn fetch_pinned(
  git: &str,
  url: &str,
  rev: &Revision,
  recursive: bool,
  dest: &Path,
) -> Result<(), SourceFetchError> {
  let unreachable = |message: String| SourceFetchError::Unreachable {
    url: url.to_string(),
    message,
  };

  if !dest.join(".git").exists() {
    tokio::fs::create_dir_all(dest).await?;
    info!(url = %url, dest = %dest.display(), "initializing repository");
    git_step(git, &["init", "--quiet"], dest).await.map_err(unreachable)?;
    git_step(git, &["remote", "add", "origin", url], dest)
      .await
      .map_err(unreachable)?;
  } else {
    git_step(git, &["remote", "set-url", "origin", url], dest)
      .await
      .map_err(unreachable)?;
  }

  info!(url = %url, rev = %rev, "fetching");
  git_step(git, &["fetch", "--tags", "--force", "origin"], dest)
    .await
    .map_err(unreachable)?;

  let target = rev.checkout_target();
  git_step(git, &["checkout", "--force", "--detach", target.as_str()], dest)
    .await
    .map_err(|message| SourceFetchError::RevisionNotFound {
      url: url.to_string(),
      rev: rev.to_string(),
      message,
    })?;

  if recursive {
    debug!(dest = %dest.display(), "updating submodules");
    git_step(git, &["submodule", "update", "--init", "--recursive", "--force"], dest)
      .await
      .map_err(unreachable)?;
  }

  Ok(())
}

/// Run one git command; the error is the captured diagnostic text.
async fn git_step(git: &str, args: &[&str], cwd: &Path) -> Result<(), String> {
  let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
  let out = run_tool(git, &args, cwd)
    .await
    .map_err(|e| format!("failed to run {}: {}", git, e))?;
  if out.success {
    Ok(())
  } else {
    Err(format!(
      "`{}` exited with {}: {}",
      out.command_line(),
      out.status.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()),
      out.stderr.trim()
    ))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn plain_directory_is_not_pinned() {
    let temp = TempDir::new().unwrap();
    assert_eq!(head_commit(temp.path()), None);
    assert!(!is_pinned(temp.path(), &Revision::Commit("cf3a1c3".to_string())));
  }

  #[tokio::test]
  async fn missing_git_binary_reports_unreachable() {
    let temp = TempDir::new().unwrap();
    let err = fetch_pinned(
      "pinforge-no-such-git",
      "https://example.invalid/repo.git",
      &Revision::Commit("cf3a1c3".to_string()),
      true,
      &temp.path().join("repo"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SourceFetchError::Unreachable { .. }));
  }
}
