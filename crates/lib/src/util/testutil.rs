//! Test utilities for pinforge-lib.
//!
//! Recipe fixtures plus in-process stand-ins for the source fetcher and the
//! build tool, so pipelines can run without network access or a compiler.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::build::{BuildHandle, BuildStep, BuildTool, BuildToolError, ConfigureRequest};
use crate::export::ExportSpec;
use crate::recipe::types::{BuildSpec, Revision, SourceOrigin, SourceSpec};
use crate::recipe::{Recipe, SettingAxis, Version};
use crate::source::{SourceFetchError, SourceFetcher};
use crate::util::process::CapturedOutput;

/// Returns the shell command and args to execute a shell script.
#[cfg(unix)]
pub fn shell_cmd(script: &str) -> (&'static str, Vec<String>) {
  ("/bin/sh", vec!["-c".to_string(), script.to_string()])
}

#[cfg(windows)]
pub fn shell_cmd(script: &str) -> (&'static str, Vec<String>) {
  ("cmd.exe", vec!["/C".to_string(), script.to_string()])
}

/// A minimal recipe with one archive source at `https://example.com/<name>.tar.gz`.
pub fn recipe_fixture(name: &str, version: &str) -> Recipe {
  Recipe {
    name: name.to_string(),
    version: Version::literal(version),
    license: None,
    url: None,
    description: None,
    topics: Vec::new(),
    settings: Vec::new(),
    options: BTreeMap::new(),
    definitions: BTreeMap::new(),
    generators: Vec::new(),
    exports: Vec::new(),
    sources: vec![SourceSpec {
      name: name.to_string(),
      dest: name.to_string(),
      origin: SourceOrigin::Archive {
        url: format!("https://example.com/{}.tar.gz", name),
        sha256: None,
        strip_components: 0,
      },
      patches: Vec::new(),
    }],
    build: BuildSpec::default(),
    package: Vec::new(),
    info: ExportSpec::default(),
    requires: Vec::new(),
    recipe_dir: PathBuf::from("."),
  }
}

/// Settings of a Linux x86_64 gcc release build.
pub fn settings_fixture() -> BTreeMap<String, String> {
  BTreeMap::from([
    (SettingAxis::Os.as_str().to_string(), "linux".to_string()),
    (SettingAxis::Arch.as_str().to_string(), "x86_64".to_string()),
    (SettingAxis::Compiler.as_str().to_string(), "gcc".to_string()),
    (SettingAxis::BuildType.as_str().to_string(), "Release".to_string()),
  ])
}

/// A git source at `https://example.com/<name>.git`.
pub fn git_source(name: &str, dest: &str, rev: &str) -> SourceSpec {
  SourceSpec {
    name: name.to_string(),
    dest: dest.to_string(),
    origin: SourceOrigin::Git {
      url: format!("https://example.com/{}.git", name),
      rev: Revision::parse(rev).expect("fixture revision must be valid"),
      recursive: true,
    },
    patches: Vec::new(),
  }
}

/// Records every call and fabricates plausible results on disk.
///
/// Clones share the call log.
#[derive(Debug, Clone, Default)]
pub struct FakeFetcher {
  calls: Arc<Mutex<Vec<String>>>,
  failing: bool,
  rejecting_patches: bool,
}

impl FakeFetcher {
  /// A fetcher whose every fetch reports a missing revision.
  pub fn failing() -> Self {
    Self {
      failing: true,
      ..Self::default()
    }
  }

  /// A fetcher that fetches normally but rejects every patch.
  pub fn rejecting_patches() -> Self {
    Self {
      rejecting_patches: true,
      ..Self::default()
    }
  }

  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }

  fn record(&self, call: String) {
    self.calls.lock().unwrap().push(call);
  }
}

impl SourceFetcher for FakeFetcher {
  async fn fetch(&self, url: &str, rev: &Revision, _recursive: bool, dest: &Path) -> Result<(), SourceFetchError> {
    self.record(format!("fetch {}@{}", url, rev));
    if self.failing {
      return Err(SourceFetchError::RevisionNotFound {
        url: url.to_string(),
        rev: rev.to_string(),
        message: "fatal: couldn't find remote ref".to_string(),
      });
    }
    std::fs::create_dir_all(dest)?;
    std::fs::write(dest.join("README"), format!("{} at {}\n", url, rev))?;
    Ok(())
  }

  async fn download(&self, url: &str, _sha256: Option<&str>, dest: &Path) -> Result<(), SourceFetchError> {
    self.record(format!("download {}", url));
    if self.failing {
      return Err(SourceFetchError::Unreachable {
        url: url.to_string(),
        message: "connection refused".to_string(),
      });
    }
    if let Some(parent) = dest.parent() {
      std::fs::create_dir_all(parent)?;
    }
    write_tar_gz(dest, &[("README", url.as_bytes())])?;
    Ok(())
  }

  async fn apply_patch(&self, patch: &Path, strip: u32, dir: &Path) -> Result<(), SourceFetchError> {
    self.record(format!("patch -p{} {} {}", strip, patch.display(), dir.display()));
    if self.rejecting_patches {
      return Err(SourceFetchError::Patch {
        patch: patch.to_path_buf(),
        message: "1 out of 1 hunk FAILED".to_string(),
      });
    }
    Ok(())
  }

  /// Pinned when a previous fetch left its README for `rev` behind.
  fn is_pinned(&self, dest: &Path, rev: &Revision) -> bool {
    std::fs::read_to_string(dest.join("README"))
      .map(|readme| readme.ends_with(&format!(" at {}\n", rev)))
      .unwrap_or(false)
  }
}

/// Write a gzip-compressed tarball holding `entries`.
pub fn write_tar_gz(dest: &Path, entries: &[(&str, &[u8])]) -> std::io::Result<()> {
  let file = std::fs::File::create(dest)?;
  let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
  let mut builder = tar::Builder::new(encoder);
  for (name, data) in entries {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, name, *data)?;
  }
  builder.into_inner()?.finish()?;
  Ok(())
}

#[derive(Debug, Default)]
struct FakeBuildState {
  steps: Vec<String>,
  installed: Vec<String>,
  prefix_paths: Vec<Vec<PathBuf>>,
  packages: HashMap<PathBuf, String>,
}

/// A build tool that installs `lib/lib<package>.a` and `include/<package>.h`.
///
/// The package name is the install directory's name up to its last `-`, so
/// store package directories (`<name>-<key>`) map back to the recipe name.
/// Clones share their recorded state.
#[derive(Debug, Clone, Default)]
pub struct FakeBuildTool {
  state: Arc<Mutex<FakeBuildState>>,
  failure: Option<(Option<String>, BuildStep)>,
}

impl FakeBuildTool {
  /// Fails every package at `step`.
  pub fn failing_at(step: BuildStep) -> Self {
    Self {
      failure: Some((None, step)),
      ..Self::default()
    }
  }

  /// Fails only `package` at `step`.
  pub fn failing_for(package: &str, step: BuildStep) -> Self {
    Self {
      failure: Some((Some(package.to_string()), step)),
      ..Self::default()
    }
  }

  pub fn steps(&self) -> Vec<String> {
    self.state.lock().unwrap().steps.clone()
  }

  /// Install directory names, in install order.
  pub fn installed(&self) -> Vec<String> {
    self.state.lock().unwrap().installed.clone()
  }

  /// Prefix paths passed to each configure call, in call order.
  pub fn prefix_paths(&self) -> Vec<Vec<PathBuf>> {
    self.state.lock().unwrap().prefix_paths.clone()
  }

  fn package_for(&self, build_dir: &Path) -> String {
    self
      .state
      .lock()
      .unwrap()
      .packages
      .get(build_dir)
      .cloned()
      .unwrap_or_default()
  }

  fn step(&self, step: BuildStep, package: &str) -> Result<(), BuildToolError> {
    self.state.lock().unwrap().steps.push(step.to_string());
    match &self.failure {
      Some((target, failing)) if *failing == step && target.as_deref().is_none_or(|t| t == package) => {
        Err(BuildToolError::Failed {
          step,
          output: CapturedOutput {
            program: "fake-build".to_string(),
            args: vec![step.to_string()],
            status: Some(2),
            success: false,
            stdout: String::new(),
            stderr: format!("error: {} of {} failed", step, package),
          },
        })
      }
      _ => Ok(()),
    }
  }
}

fn package_name(install_dir: &Path) -> String {
  let dir = install_dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
  match dir.rsplit_once('-') {
    Some((name, _)) => name.to_string(),
    None => dir,
  }
}

impl BuildTool for FakeBuildTool {
  fn description_file(&self) -> &'static str {
    "CMakeLists.txt"
  }

  fn umbrella_description(&self, project: &str, subdirs: &[String]) -> String {
    let mut out = format!("project({})\n", project);
    for dir in subdirs {
      out.push_str(&format!("add_subdirectory({})\n", dir));
    }
    out
  }

  async fn configure(&self, request: ConfigureRequest<'_>) -> Result<BuildHandle, BuildToolError> {
    let package = package_name(request.install_dir);
    {
      let mut state = self.state.lock().unwrap();
      state.packages.insert(request.build_dir.to_path_buf(), package.clone());
      state.prefix_paths.push(request.prefix_paths.to_vec());
    }
    self.step(BuildStep::Configure, &package)?;
    Ok(BuildHandle {
      source_dir: request.source_dir.to_path_buf(),
      build_dir: request.build_dir.to_path_buf(),
      build_type: request.config.setting(SettingAxis::BuildType).map(str::to_string),
    })
  }

  async fn build(&self, handle: &BuildHandle) -> Result<(), BuildToolError> {
    let package = self.package_for(&handle.build_dir);
    self.step(BuildStep::Build, &package)
  }

  async fn install(&self, handle: &BuildHandle, dest: &Path) -> Result<(), BuildToolError> {
    let package = self.package_for(&handle.build_dir);
    self.step(BuildStep::Install, &package)?;

    std::fs::create_dir_all(dest.join("lib"))?;
    std::fs::create_dir_all(dest.join("include"))?;
    std::fs::write(dest.join("lib").join(format!("lib{}.a", package)), package.as_bytes())?;
    std::fs::write(dest.join("include").join(format!("{}.h", package)), "#pragma once\n")?;

    let dir = dest.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    self.state.lock().unwrap().installed.push(dir);
    Ok(())
  }
}
