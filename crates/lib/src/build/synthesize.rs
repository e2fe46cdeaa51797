//! Umbrella build descriptions for multi-source recipes.

use std::path::{Component, Path, PathBuf};

use tracing::info;

use crate::build::tool::{BuildTool, BuildToolError};
use crate::recipe::Recipe;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Synthesis {
  /// The configure root already has a description (fetched or exported).
  Existing,
  Synthesized(PathBuf),
  /// Single-source recipe without a description; the tool will report it.
  NotNeeded,
}

/// Write an umbrella description at `configure_root` when a recipe has two or
/// more sources and none exists, adding every source destination in
/// declaration order.
pub async fn ensure_umbrella<T: BuildTool>(
  tool: &T,
  recipe: &Recipe,
  src_root: &Path,
  configure_root: &Path,
) -> Result<Synthesis, BuildToolError> {
  let description = configure_root.join(tool.description_file());
  if tokio::fs::try_exists(&description).await? {
    return Ok(Synthesis::Existing);
  }
  if recipe.sources.len() < 2 {
    return Ok(Synthesis::NotNeeded);
  }

  let root = lexical(configure_root);
  let mut subdirs = Vec::with_capacity(recipe.sources.len());
  for source in &recipe.sources {
    let dest = lexical(&src_root.join(&source.dest));
    let rel = dest.strip_prefix(&root).map_err(|_| {
      BuildToolError::Synthesis(format!(
        "source '{}' at '{}' lies outside the configure root '{}'",
        source.name,
        dest.display(),
        root.display()
      ))
    })?;
    if rel.as_os_str().is_empty() {
      return Err(BuildToolError::Synthesis(format!(
        "source '{}' is the configure root itself and cannot be added as a sub-project",
        source.name
      )));
    }
    subdirs.push(rel.to_string_lossy().replace('\\', "/"));
  }

  tokio::fs::create_dir_all(configure_root).await?;
  tokio::fs::write(&description, tool.umbrella_description(&recipe.name, &subdirs)).await?;
  info!(path = %description.display(), subprojects = subdirs.len(), "synthesized umbrella build");
  Ok(Synthesis::Synthesized(description))
}

/// Resolve `.` and `..` without touching the filesystem.
fn lexical(path: &Path) -> PathBuf {
  let mut out = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        out.pop();
      }
      other => out.push(other),
    }
  }
  out
}
