//! Running external tools (git, patch, cmake) with captured output.
//!
//! Tools are spawned directly, never through a shell, and inherit the
//! caller's environment so compilers and SDKs stay discoverable. Every
//! invocation receives an explicit working directory.

use std::path::Path;

use tokio::process::Command;
use tracing::debug;

/// Exit status and output of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
  pub program: String,
  pub args: Vec<String>,
  pub status: Option<i32>,
  pub success: bool,
  pub stdout: String,
  pub stderr: String,
}

impl CapturedOutput {
  pub fn command_line(&self) -> String {
    std::iter::once(self.program.as_str())
      .chain(self.args.iter().map(String::as_str))
      .collect::<Vec<_>>()
      .join(" ")
  }
}

/// Run `program` with `args` in `cwd` and wait for it to finish.
///
/// A non-zero exit is not an error here; callers decide what failure means.
pub async fn run_tool(program: &str, args: &[String], cwd: &Path) -> std::io::Result<CapturedOutput> {
  debug!(program = %program, args = ?args, cwd = %cwd.display(), "spawning process");

  let output = Command::new(program).args(args).current_dir(cwd).output().await?;

  let captured = CapturedOutput {
    program: program.to_string(),
    args: args.to_vec(),
    status: output.status.code(),
    success: output.status.success(),
    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
  };

  if !captured.success {
    if !captured.stderr.is_empty() {
      debug!(stderr = %captured.stderr, "command stderr");
    }
    if !captured.stdout.is_empty() {
      debug!(stdout = %captured.stdout, "command stdout");
    }
  }

  Ok(captured)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::shell_cmd;

  #[tokio::test]
  async fn captures_output_and_status() {
    let temp = tempfile::tempdir().unwrap();
    let (shell, args) = shell_cmd("echo hello && echo oops 1>&2 && exit 3");
    let out = run_tool(shell, &args, temp.path()).await.unwrap();

    assert!(!out.success);
    assert_eq!(out.status, Some(3));
    assert_eq!(out.stdout.trim(), "hello");
    assert_eq!(out.stderr.trim(), "oops");
  }

  #[tokio::test]
  async fn runs_in_requested_directory() {
    let temp = tempfile::tempdir().unwrap();
    std::fs::write(temp.path().join("marker.txt"), "").unwrap();
    #[cfg(unix)]
    let (shell, args) = shell_cmd("ls");
    #[cfg(windows)]
    let (shell, args) = shell_cmd("dir /b");
    let out = run_tool(shell, &args, temp.path()).await.unwrap();

    assert!(out.success);
    assert!(out.stdout.contains("marker.txt"));
  }

  #[tokio::test]
  async fn missing_program_is_an_io_error() {
    let temp = tempfile::tempdir().unwrap();
    assert!(run_tool("pinforge-no-such-tool", &[], temp.path()).await.is_err());
  }
}
