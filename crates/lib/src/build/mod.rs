//! Build orchestration.
//!
//! Drives a [`BuildTool`] through configure, build and install for one
//! recipe configuration. Every call receives explicit directories; nothing
//! depends on the process working directory.
//!
//! # Submodules
//!
//! - [`tool`] - the `BuildTool` collaborator trait and its error type
//! - [`cmake`] - the CMake implementation
//! - [`synthesize`] - umbrella descriptions for multi-source recipes

pub mod cmake;
pub mod synthesize;
pub mod tool;

use std::path::{Path, PathBuf};

use tracing::info;

use crate::options::BuildConfiguration;
use crate::recipe::Recipe;
use crate::store::paths::WorkDirs;

pub use cmake::CMake;
pub use synthesize::{Synthesis, ensure_umbrella};
pub use tool::{BuildHandle, BuildStep, BuildTool, BuildToolError, ConfigureRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
  pub synthesis: Synthesis,
  pub installed: bool,
}

/// Configure, build and (unless the recipe opts out) install into `install_dir`.
pub async fn run_build<T: BuildTool>(
  tool: &T,
  recipe: &Recipe,
  config: &BuildConfiguration,
  dirs: &WorkDirs,
  install_dir: &Path,
  prefix_paths: &[PathBuf],
) -> Result<BuildOutcome, BuildToolError> {
  let configure_root = dirs.src.join(&recipe.build.source_folder);
  if !configure_root.is_dir() {
    return Err(BuildToolError::MissingSourceFolder(configure_root));
  }

  let synthesis = ensure_umbrella(tool, recipe, &dirs.src, &configure_root).await?;

  tokio::fs::create_dir_all(&dirs.build).await?;
  let handle = tool
    .configure(ConfigureRequest {
      source_dir: &configure_root,
      build_dir: &dirs.build,
      install_dir,
      config,
      prefix_paths,
    })
    .await?;

  tool.build(&handle).await?;

  let installed = recipe.build.install;
  if installed {
    tool.install(&handle, install_dir).await?;
  }

  info!(recipe = %recipe.name, installed, "build finished");
  Ok(BuildOutcome { synthesis, installed })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::options::{Overrides, resolve_options};
  use crate::util::testutil::{FakeBuildTool, git_source, recipe_fixture, settings_fixture};
  use tempfile::TempDir;

  fn work_dirs(temp: &TempDir) -> WorkDirs {
    let dirs = WorkDirs {
      root: temp.path().to_path_buf(),
      src: temp.path().join("src"),
      build: temp.path().join("build"),
    };
    std::fs::create_dir_all(&dirs.src).unwrap();
    dirs
  }

  #[tokio::test]
  async fn runs_configure_build_install_in_order() {
    let temp = TempDir::new().unwrap();
    let dirs = work_dirs(&temp);
    let recipe = recipe_fixture("libucl", "0.8.1");
    let config = resolve_options(&recipe, &Overrides::new(), &settings_fixture()).unwrap();
    let tool = FakeBuildTool::default();

    let outcome = run_build(&tool, &recipe, &config, &dirs, &temp.path().join("pkg"), &[])
      .await
      .unwrap();

    assert!(outcome.installed);
    assert_eq!(tool.steps(), vec!["configure", "build", "install"]);
  }

  #[tokio::test]
  async fn install_can_be_skipped() {
    let temp = TempDir::new().unwrap();
    let dirs = work_dirs(&temp);
    let mut recipe = recipe_fixture("imgui", "1.77.docking.3d4af15");
    recipe.build.install = false;
    let config = resolve_options(&recipe, &Overrides::new(), &settings_fixture()).unwrap();
    let tool = FakeBuildTool::default();

    run_build(&tool, &recipe, &config, &dirs, &temp.path().join("pkg"), &[])
      .await
      .unwrap();
    assert_eq!(tool.steps(), vec!["configure", "build"]);
  }

  #[tokio::test]
  async fn synthesizes_before_configuring_multi_source_recipes() {
    let temp = TempDir::new().unwrap();
    let dirs = work_dirs(&temp);
    let mut recipe = recipe_fixture("diligent_graphics", "2.4.cfaf74c.6b7ae76");
    recipe.sources = vec![
      git_source("core", "DiligentCore", "cfaf74c"),
      git_source("tools", "DiligentTools", "6b7ae76"),
    ];
    let config = resolve_options(&recipe, &Overrides::new(), &settings_fixture()).unwrap();
    let tool = FakeBuildTool::default();

    let outcome = run_build(&tool, &recipe, &config, &dirs, &temp.path().join("pkg"), &[])
      .await
      .unwrap();
    assert!(matches!(outcome.synthesis, Synthesis::Synthesized(_)));
    assert!(dirs.src.join("CMakeLists.txt").exists());
  }

  #[tokio::test]
  async fn missing_source_folder_fails_before_configure() {
    let temp = TempDir::new().unwrap();
    let dirs = work_dirs(&temp);
    let mut recipe = recipe_fixture("fastnoise", "0.4");
    recipe.build.source_folder = "FastNoise".to_string();
    let config = resolve_options(&recipe, &Overrides::new(), &settings_fixture()).unwrap();
    let tool = FakeBuildTool::default();

    let err = run_build(&tool, &recipe, &config, &dirs, &temp.path().join("pkg"), &[])
      .await
      .unwrap_err();
    assert!(matches!(err, BuildToolError::MissingSourceFolder(_)));
    assert!(tool.steps().is_empty());
  }

  #[tokio::test]
  async fn tool_failure_stops_the_build() {
    let temp = TempDir::new().unwrap();
    let dirs = work_dirs(&temp);
    let recipe = recipe_fixture("rttr", "0.9.6");
    let config = resolve_options(&recipe, &Overrides::new(), &settings_fixture()).unwrap();
    let tool = FakeBuildTool::failing_at(BuildStep::Build);

    let err = run_build(&tool, &recipe, &config, &dirs, &temp.path().join("pkg"), &[])
      .await
      .unwrap_err();
    assert!(matches!(err, BuildToolError::Failed { step: BuildStep::Build, .. }));
    assert_eq!(tool.steps(), vec!["configure", "build"]);
  }
}
