//! The CMake [`BuildTool`].

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::build::tool::{BuildHandle, BuildStep, BuildTool, BuildToolError, ConfigureRequest};
use crate::recipe::SettingAxis;
use crate::util::process::run_tool;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CMake {
  pub program: String,
  /// Passed as `-G` when set.
  pub generator: Option<String>,
  /// Parallel build jobs; the tool's default when unset.
  pub jobs: Option<usize>,
}

impl Default for CMake {
  fn default() -> Self {
    Self {
      program: "cmake".to_string(),
      generator: None,
      jobs: None,
    }
  }
}

impl CMake {
  /// `PINFORGE_CMAKE` overrides the executable.
  pub fn from_env() -> Self {
    Self {
      program: std::env::var("PINFORGE_CMAKE").unwrap_or_else(|_| "cmake".to_string()),
      ..Self::default()
    }
  }

  pub fn with_jobs(mut self, jobs: Option<usize>) -> Self {
    self.jobs = jobs;
    self
  }

  /// Arguments for the configure step.
  ///
  /// Engine-supplied definitions come first and are replaced by recipe
  /// definitions of the same name.
  pub fn configure_args(&self, request: &ConfigureRequest<'_>) -> Vec<String> {
    let mut definitions = BTreeMap::new();
    if let Some(build_type) = request.config.setting(SettingAxis::BuildType) {
      definitions.insert("CMAKE_BUILD_TYPE".to_string(), build_type.to_string());
    }
    definitions.insert("CMAKE_INSTALL_PREFIX".to_string(), cmake_path(request.install_dir));
    if !request.prefix_paths.is_empty() {
      let joined = join_paths(request.prefix_paths);
      definitions.insert("CMAKE_PREFIX_PATH".to_string(), joined.clone());
      definitions.insert("CMAKE_MODULE_PATH".to_string(), joined);
    }
    for (key, value) in request.config.definitions() {
      definitions.insert(key.clone(), value.clone());
    }

    let mut args = vec![
      "-S".to_string(),
      cmake_path(request.source_dir),
      "-B".to_string(),
      cmake_path(request.build_dir),
    ];
    if let Some(generator) = &self.generator {
      args.push("-G".to_string());
      args.push(generator.clone());
    }
    args.extend(definitions.into_iter().map(|(k, v)| format!("-D{}={}", k, v)));
    args
  }

  pub fn build_args(&self, handle: &BuildHandle) -> Vec<String> {
    let mut args = vec!["--build".to_string(), cmake_path(&handle.build_dir)];
    if let Some(build_type) = &handle.build_type {
      args.push("--config".to_string());
      args.push(build_type.clone());
    }
    if let Some(jobs) = self.jobs {
      args.push("--parallel".to_string());
      args.push(jobs.to_string());
    }
    args
  }

  pub fn install_args(&self, handle: &BuildHandle, dest: &Path) -> Vec<String> {
    let mut args = vec![
      "--install".to_string(),
      cmake_path(&handle.build_dir),
      "--prefix".to_string(),
      cmake_path(dest),
    ];
    if let Some(build_type) = &handle.build_type {
      args.push("--config".to_string());
      args.push(build_type.clone());
    }
    args
  }

  async fn run(&self, step: BuildStep, args: &[String], cwd: &Path) -> Result<(), BuildToolError> {
    info!(step = %step, program = %self.program, "running build tool");
    let output = run_tool(&self.program, args, cwd)
      .await
      .map_err(|source| BuildToolError::Spawn {
        step,
        program: self.program.clone(),
        source,
      })?;
    if output.success {
      Ok(())
    } else {
      Err(BuildToolError::Failed { step, output })
    }
  }
}

fn cmake_path(path: &Path) -> String {
  path.to_string_lossy().replace('\\', "/")
}

fn join_paths(paths: &[PathBuf]) -> String {
  paths.iter().map(|p| cmake_path(p)).collect::<Vec<_>>().join(";")
}

impl BuildTool for CMake {
  fn description_file(&self) -> &'static str {
    "CMakeLists.txt"
  }

  fn umbrella_description(&self, project: &str, subdirs: &[String]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "cmake_minimum_required(VERSION 3.10)");
    let _ = writeln!(out, "project({} LANGUAGES C CXX)", project);
    for subdir in subdirs {
      let _ = writeln!(out, "add_subdirectory(\"{}\")", subdir);
    }
    out
  }

  async fn configure(&self, request: ConfigureRequest<'_>) -> Result<BuildHandle, BuildToolError> {
    tokio::fs::create_dir_all(request.build_dir).await?;
    let args = self.configure_args(&request);
    self.run(BuildStep::Configure, &args, request.build_dir).await?;
    Ok(BuildHandle {
      source_dir: request.source_dir.to_path_buf(),
      build_dir: request.build_dir.to_path_buf(),
      build_type: request.config.setting(SettingAxis::BuildType).map(str::to_string),
    })
  }

  async fn build(&self, handle: &BuildHandle) -> Result<(), BuildToolError> {
    let args = self.build_args(handle);
    self.run(BuildStep::Build, &args, &handle.build_dir).await
  }

  async fn install(&self, handle: &BuildHandle, dest: &Path) -> Result<(), BuildToolError> {
    tokio::fs::create_dir_all(dest).await?;
    let args = self.install_args(handle, dest);
    self.run(BuildStep::Install, &args, &handle.build_dir).await
  }
}
