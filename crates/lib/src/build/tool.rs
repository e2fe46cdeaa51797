use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::options::BuildConfiguration;
use crate::util::process::CapturedOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStep {
  Configure,
  Build,
  Install,
}

impl fmt::Display for BuildStep {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      BuildStep::Configure => "configure",
      BuildStep::Build => "build",
      BuildStep::Install => "install",
    })
  }
}

#[derive(Debug, Error)]
pub enum BuildToolError {
  #[error("{step} step failed: `{}` exited with {}\n{}", .output.command_line(), format_status(.output.status), format_diagnostics(.output))]
  Failed { step: BuildStep, output: CapturedOutput },

  #[error("failed to run '{program}' for the {step} step: {source}")]
  Spawn {
    step: BuildStep,
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("configure root '{}' does not exist", .0.display())]
  MissingSourceFolder(PathBuf),

  #[error("cannot synthesize umbrella build: {0}")]
  Synthesis(String),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}

fn format_status(status: Option<i32>) -> String {
  status
    .map(|code| format!("status {}", code))
    .unwrap_or_else(|| "a signal".to_string())
}

fn format_diagnostics(output: &CapturedOutput) -> String {
  let mut out = String::new();
  if !output.stdout.trim().is_empty() {
    out.push_str("--- stdout ---\n");
    out.push_str(output.stdout.trim_end());
    out.push('\n');
  }
  if !output.stderr.trim().is_empty() {
    out.push_str("--- stderr ---\n");
    out.push_str(output.stderr.trim_end());
    out.push('\n');
  }
  out
}

impl BuildToolError {
  /// Captured stdout and stderr of the failing tool, if it ran.
  pub fn diagnostics(&self) -> Option<&CapturedOutput> {
    match self {
      BuildToolError::Failed { output, .. } => Some(output),
      _ => None,
    }
  }
}

/// Everything one `configure` call needs, assembled up front.
#[derive(Debug, Clone, Copy)]
pub struct ConfigureRequest<'a> {
  pub source_dir: &'a Path,
  pub build_dir: &'a Path,
  pub install_dir: &'a Path,
  pub config: &'a BuildConfiguration,
  /// Package roots of resolved dependencies, in requirement order.
  pub prefix_paths: &'a [PathBuf],
}

/// A configured build tree, consumed by `build` and `install`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildHandle {
  pub source_dir: PathBuf,
  pub build_dir: PathBuf,
  pub build_type: Option<String>,
}

/// A native build system driven by the orchestrator.
pub trait BuildTool: Send + Sync + 'static {
  /// File name of a top-level build description in this tool's dialect.
  fn description_file(&self) -> &'static str;

  /// Render an umbrella description adding each of `subdirs` as a sub-project.
  fn umbrella_description(&self, project: &str, subdirs: &[String]) -> String;

  fn configure(&self, request: ConfigureRequest<'_>) -> impl Future<Output = Result<BuildHandle, BuildToolError>> + Send;

  fn build(&self, handle: &BuildHandle) -> impl Future<Output = Result<(), BuildToolError>> + Send;

  fn install(&self, handle: &BuildHandle, dest: &Path) -> impl Future<Output = Result<(), BuildToolError>> + Send;
}
