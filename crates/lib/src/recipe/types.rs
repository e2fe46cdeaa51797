use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::collect::ArtifactRule;
use crate::export::{ExportSpec, Generator};
use crate::recipe::reference::{PackageRef, Requirement};
use crate::recipe::version::Version;

/// A configuration axis of the host toolchain that a recipe may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingAxis {
  Os,
  Arch,
  Compiler,
  BuildType,
}

impl SettingAxis {
  pub const ALL: [SettingAxis; 4] = [SettingAxis::Os, SettingAxis::Arch, SettingAxis::Compiler, SettingAxis::BuildType];

  pub fn as_str(&self) -> &'static str {
    match self {
      SettingAxis::Os => "os",
      SettingAxis::Arch => "arch",
      SettingAxis::Compiler => "compiler",
      SettingAxis::BuildType => "build_type",
    }
  }
}

impl FromStr for SettingAxis {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    SettingAxis::ALL
      .into_iter()
      .find(|axis| axis.as_str() == s)
      .ok_or_else(|| format!("unknown setting '{}' (expected os, arch, compiler or build_type)", s))
  }
}

impl fmt::Display for SettingAxis {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A scalar option value.
///
/// Values are compared by their canonical rendering, so an override that
/// arrives as the string `"true"` matches a boolean domain entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
  Bool(bool),
  Int(i64),
  Str(String),
}

impl OptionValue {
  /// Interpret untyped text (e.g. from a command line) as the most specific value.
  pub fn parse(raw: &str) -> Self {
    match raw {
      "true" | "True" => OptionValue::Bool(true),
      "false" | "False" => OptionValue::Bool(false),
      _ => raw
        .parse::<i64>()
        .map(OptionValue::Int)
        .unwrap_or_else(|_| OptionValue::Str(raw.to_string())),
    }
  }

  pub fn canonical(&self) -> String {
    self.to_string()
  }
}

impl fmt::Display for OptionValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      OptionValue::Bool(b) => write!(f, "{}", b),
      OptionValue::Int(i) => write!(f, "{}", i),
      OptionValue::Str(s) => f.write_str(s),
    }
  }
}

impl From<bool> for OptionValue {
  fn from(value: bool) -> Self {
    OptionValue::Bool(value)
  }
}

impl From<i64> for OptionValue {
  fn from(value: i64) -> Self {
    OptionValue::Int(value)
  }
}

impl From<&str> for OptionValue {
  fn from(value: &str) -> Self {
    OptionValue::Str(value.to_string())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionDecl {
  pub values: Vec<OptionValue>,
  pub default: OptionValue,
}

impl OptionDecl {
  /// The domain entry whose canonical rendering equals `value`'s.
  pub fn find(&self, value: &OptionValue) -> Option<&OptionValue> {
    let wanted = value.canonical();
    self.values.iter().find(|v| v.canonical() == wanted)
  }
}

/// Where a definition takes its value from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueRef {
  Option(String),
  Setting(String),
}

impl fmt::Display for ValueRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ValueRef::Option(name) => write!(f, "option '{}'", name),
      ValueRef::Setting(name) => write!(f, "setting '{}'", name),
    }
  }
}

/// Maps the configuration to one build-tool definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionRule {
  Constant(String),
  Mapped {
    from: ValueRef,
    /// Canonical value -> definition value. Values without an entry emit nothing.
    map: Option<BTreeMap<String, String>>,
  },
}

/// An exact source revision. Floating branches are never accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Revision {
  Commit(String),
  Tag(String),
}

impl Revision {
  /// Accepts a 7-40 character hex commit id or `tag:<name>`.
  pub fn parse(raw: &str) -> Result<Self, String> {
    if let Some(tag) = raw.strip_prefix("tag:") {
      if tag.is_empty() {
        return Err("empty tag name in revision".to_string());
      }
      return Ok(Revision::Tag(tag.to_string()));
    }
    if (7..=40).contains(&raw.len()) && raw.chars().all(|c| c.is_ascii_hexdigit()) {
      return Ok(Revision::Commit(raw.to_ascii_lowercase()));
    }
    Err(format!(
      "revision '{}' is not an exact pin (expected a 7-40 character commit id or tag:<name>)",
      raw
    ))
  }

  /// The argument `git checkout` understands.
  pub fn checkout_target(&self) -> String {
    match self {
      Revision::Commit(id) => id.clone(),
      Revision::Tag(tag) => format!("refs/tags/{}", tag),
    }
  }

  /// The text contributed to composite versions.
  pub fn label(&self) -> &str {
    match self {
      Revision::Commit(id) => id,
      Revision::Tag(tag) => tag,
    }
  }
}

impl fmt::Display for Revision {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Revision::Commit(id) => f.write_str(id),
      Revision::Tag(tag) => write!(f, "tag:{}", tag),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceOrigin {
  Git {
    url: String,
    rev: Revision,
    recursive: bool,
  },
  Archive {
    url: String,
    sha256: Option<String>,
    strip_components: usize,
  },
}

impl SourceOrigin {
  pub fn url(&self) -> &str {
    match self {
      SourceOrigin::Git { url, .. } | SourceOrigin::Archive { url, .. } => url,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchSpec {
  /// Patch file, relative to the recipe directory.
  pub file: PathBuf,
  /// Directory inside the source destination the patch applies to.
  pub base: Option<String>,
  pub strip: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
  pub name: String,
  /// Destination relative to the working directory.
  pub dest: String,
  pub origin: SourceOrigin,
  pub patches: Vec<PatchSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
  pub source_folder: String,
  pub install: bool,
}

impl Default for BuildSpec {
  fn default() -> Self {
    Self {
      source_folder: ".".to_string(),
      install: true,
    }
  }
}

/// A fully loaded, validated recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
  pub name: String,
  pub version: Version,
  pub license: Option<String>,
  pub url: Option<String>,
  pub description: Option<String>,
  pub topics: Vec<String>,
  pub settings: Vec<SettingAxis>,
  pub options: BTreeMap<String, OptionDecl>,
  pub definitions: BTreeMap<String, DefinitionRule>,
  pub generators: Vec<Generator>,
  /// Files relative to `recipe_dir` copied into the working directory.
  pub exports: Vec<String>,
  pub sources: Vec<SourceSpec>,
  pub build: BuildSpec,
  pub package: Vec<ArtifactRule>,
  pub info: ExportSpec,
  pub requires: Vec<Requirement>,
  /// Directory the recipe was loaded from; not part of its identity.
  #[serde(skip)]
  pub recipe_dir: PathBuf,
}

impl Recipe {
  pub fn canonical_version(&self) -> String {
    self.version.canonical()
  }

  pub fn reference(&self, channel: &str) -> Result<PackageRef, crate::recipe::reference::ReferenceError> {
    PackageRef::new(&self.name, &self.canonical_version(), channel)
  }

  pub fn declares(&self, axis: SettingAxis) -> bool {
    self.settings.contains(&axis)
  }

  /// Check the cross-field invariants the loader cannot express structurally.
  pub fn validate(&self) -> Result<(), String> {
    crate::recipe::reference::validate_component("name", &self.name).map_err(|e| e.to_string())?;
    crate::recipe::reference::validate_component("version", &self.canonical_version()).map_err(|e| e.to_string())?;

    if self.sources.is_empty() {
      return Err("at least one source is required".to_string());
    }

    let mut seen = Vec::new();
    for source in &self.sources {
      if seen.contains(&source.name.as_str()) {
        return Err(format!("duplicate source name '{}'", source.name));
      }
      seen.push(source.name.as_str());
      if !is_contained(Path::new(&source.dest)) {
        return Err(format!(
          "source '{}' destination '{}' must be a relative path inside the working directory",
          source.name, source.dest
        ));
      }
    }

    for pin in self.version.pins() {
      let Some(source) = self.sources.iter().find(|s| s.name == pin.name) else {
        return Err(format!("version pin '{}' does not name a declared source", pin.name));
      };
      if let SourceOrigin::Git { rev, .. } = &source.origin
        && rev.label() != pin.rev
      {
        return Err(format!("version pin '{}' disagrees with the source revision", pin.name));
      }
    }

    for (name, decl) in &self.options {
      if decl.values.is_empty() {
        return Err(format!("option '{}' has an empty domain", name));
      }
      if decl.find(&decl.default).is_none() {
        return Err(format!(
          "default '{}' of option '{}' is not one of its allowed values",
          decl.default, name
        ));
      }
    }

    for export in &self.exports {
      if !is_contained(Path::new(export)) {
        return Err(format!("export '{}' must be a relative path", export));
      }
    }

    if !is_contained(Path::new(&self.build.source_folder)) {
      return Err(format!(
        "build.source_folder '{}' must be a relative path",
        self.build.source_folder
      ));
    }

    Ok(())
  }
}

/// True for relative paths that never climb above their base.
pub(crate) fn is_contained(path: &Path) -> bool {
  let mut depth: i32 = 0;
  for component in path.components() {
    match component {
      Component::Normal(_) => depth += 1,
      Component::CurDir => {}
      Component::ParentDir => {
        depth -= 1;
        if depth < 0 {
          return false;
        }
      }
      Component::RootDir | Component::Prefix(_) => return false,
    }
  }
  true
}
