use std::path::Path;

use tracing::info;

use crate::source::SourceFetchError;
use crate::util::process::run_tool;

/// Apply the unified diff `patch` inside `dir`, stripping `strip` leading path components.
pub async fn apply_patch(program: &str, patch: &Path, strip: u32, dir: &Path) -> Result<(), SourceFetchError> {
  info!(patch = %patch.display(), dir = %dir.display(), "applying patch");

  let args = vec![
    format!("-p{}", strip),
    "-N".to_string(),
    "-i".to_string(),
    patch.to_string_lossy().to_string(),
  ];
  let out = run_tool(program, &args, dir).await.map_err(|e| SourceFetchError::Patch {
    patch: patch.to_path_buf(),
    message: format!("failed to run {}: {}", program, e),
  })?;

  if !out.success {
    return Err(SourceFetchError::Patch {
      patch: patch.to_path_buf(),
      message: format!("{}{}", out.stdout.trim(), out.stderr.trim()),
    });
  }
  Ok(())
}
