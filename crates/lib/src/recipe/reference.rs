//! Exact package references: `name/version@channel`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::DEFAULT_CHANNEL;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
  #[error("reference '{0}' must have the form name/version@channel")]
  Malformed(String),

  #[error("invalid {field} '{value}' in reference: only letters, digits and '_', '-', '.', '+' are allowed")]
  InvalidComponent { field: &'static str, value: String },
}

/// An exact pin on a published recipe: name, canonical version string, channel.
///
/// Matching is always by equality on all three components; there is no notion
/// of a compatible or closest version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageRef {
  pub name: String,
  pub version: String,
  pub channel: String,
}

impl PackageRef {
  pub fn new(name: &str, version: &str, channel: &str) -> Result<Self, ReferenceError> {
    validate_component("name", name)?;
    validate_component("version", version)?;
    validate_component("channel", channel)?;
    Ok(Self {
      name: name.to_string(),
      version: version.to_string(),
      channel: channel.to_string(),
    })
  }
}

/// Names, versions and channels end up in store paths, so they share one
/// conservative alphabet.
pub(crate) fn validate_component(field: &'static str, value: &str) -> Result<(), ReferenceError> {
  let valid = !value.is_empty()
    && value != "."
    && value != ".."
    && value
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '+'));
  if valid {
    Ok(())
  } else {
    Err(ReferenceError::InvalidComponent {
      field,
      value: value.to_string(),
    })
  }
}

impl FromStr for PackageRef {
  type Err = ReferenceError;

  /// Parses `name/version@channel`; the channel defaults to `stable`.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (name, rest) = s.split_once('/').ok_or_else(|| ReferenceError::Malformed(s.to_string()))?;
    let (version, channel) = match rest.split_once('@') {
      Some((version, channel)) => (version, channel),
      None => (rest, DEFAULT_CHANNEL),
    };
    PackageRef::new(name, version, channel)
  }
}

impl TryFrom<String> for PackageRef {
  type Error = ReferenceError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<PackageRef> for String {
  fn from(value: PackageRef) -> Self {
    value.to_string()
  }
}

impl fmt::Display for PackageRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}@{}", self.name, self.version, self.channel)
  }
}

/// Whether a dependency is needed by consumers or only to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
  Link,
  Build,
}

/// A dependency edge declared by a recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
  pub reference: PackageRef,
  pub kind: DependencyKind,
}
