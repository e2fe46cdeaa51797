//! Option resolution.
//!
//! Turns a recipe's option schema, the caller's overrides and the host's
//! default settings into a [`BuildConfiguration`]: the complete, validated,
//! hashable set of choices one build runs with. Nothing touches the
//! filesystem until this has succeeded.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platform::{host_arch, host_os};
use crate::recipe::types::{DefinitionRule, OptionValue, Recipe, SettingAxis, ValueRef};
use crate::util::hash::Hashable;

/// Values the `build_type` setting may take.
pub const BUILD_TYPES: [&str; 4] = ["Debug", "Release", "RelWithDebInfo", "MinSizeRel"];

pub const DEFAULT_BUILD_TYPE: &str = "Release";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionValidationError {
  #[error("recipe '{recipe}' has no option '{option}'")]
  UnknownOption { recipe: String, option: String },

  #[error("value '{value}' is not allowed for option '{option}' of '{recipe}' (allowed: {allowed})")]
  ValueOutOfDomain {
    recipe: String,
    option: String,
    value: String,
    allowed: String,
  },

  #[error("unknown setting '{setting}' (expected os, arch, compiler or build_type)")]
  UnknownSetting { setting: String },

  #[error("recipe '{recipe}' does not declare setting '{setting}'")]
  UndeclaredSetting { recipe: String, setting: String },

  #[error("invalid build_type '{value}' (allowed: {})", BUILD_TYPES.join(", "))]
  InvalidBuildType { value: String },

  #[error("definition '{definition}' of '{recipe}' references {reference}, which is not part of the configuration")]
  UnresolvedReference {
    recipe: String,
    definition: String,
    reference: String,
  },

  #[error("unknown placeholder '${{{placeholder}}}' in '{template}'")]
  UnknownPlaceholder { template: String, placeholder: String },

  #[error("malformed assignment '{0}' (expected key=value)")]
  MalformedAssignment(String),
}

/// Caller-supplied setting and option values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overrides {
  pub settings: BTreeMap<String, String>,
  pub options: BTreeMap<String, OptionValue>,
}

impl Overrides {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_option(mut self, name: &str, value: impl Into<OptionValue>) -> Self {
    self.options.insert(name.to_string(), value.into());
    self
  }

  pub fn with_setting(mut self, name: &str, value: &str) -> Self {
    self.settings.insert(name.to_string(), value.to_string());
    self
  }

  /// Record `name=value` from untyped text as an option override.
  pub fn push_option(&mut self, assignment: &str) -> Result<(), OptionValidationError> {
    let (name, value) = split_assignment(assignment)?;
    self.options.insert(name.to_string(), OptionValue::parse(value));
    Ok(())
  }

  pub fn push_setting(&mut self, assignment: &str) -> Result<(), OptionValidationError> {
    let (name, value) = split_assignment(assignment)?;
    self.settings.insert(name.to_string(), value.to_string());
    Ok(())
  }

  pub fn is_empty(&self) -> bool {
    self.settings.is_empty() && self.options.is_empty()
  }
}

fn split_assignment(assignment: &str) -> Result<(&str, &str), OptionValidationError> {
  match assignment.split_once('=') {
    Some((name, value)) if !name.trim().is_empty() => Ok((name.trim(), value.trim())),
    _ => Err(OptionValidationError::MalformedAssignment(assignment.to_string())),
  }
}

/// Default values for every setting axis, taken from the host.
///
/// `PINFORGE_COMPILER` names the compiler; it defaults to `cc`.
pub fn host_settings() -> BTreeMap<String, String> {
  let compiler = std::env::var("PINFORGE_COMPILER").unwrap_or_else(|_| "cc".to_string());
  BTreeMap::from([
    (SettingAxis::Os.as_str().to_string(), host_os()),
    (SettingAxis::Arch.as_str().to_string(), host_arch()),
    (SettingAxis::Compiler.as_str().to_string(), compiler),
    (SettingAxis::BuildType.as_str().to_string(), DEFAULT_BUILD_TYPE.to_string()),
  ])
}

/// The resolved, immutable configuration of one build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfiguration {
  settings: BTreeMap<String, String>,
  options: BTreeMap<String, OptionValue>,
  definitions: BTreeMap<String, String>,
}

impl Hashable for BuildConfiguration {}

impl BuildConfiguration {
  pub fn settings(&self) -> &BTreeMap<String, String> {
    &self.settings
  }

  pub fn options(&self) -> &BTreeMap<String, OptionValue> {
    &self.options
  }

  pub fn definitions(&self) -> &BTreeMap<String, String> {
    &self.definitions
  }

  pub fn setting(&self, axis: SettingAxis) -> Option<&str> {
    self.settings.get(axis.as_str()).map(String::as_str)
  }

  pub fn option(&self, name: &str) -> Option<&OptionValue> {
    self.options.get(name)
  }

  fn lookup(&self, reference: &ValueRef) -> Option<OptionValue> {
    match reference {
      ValueRef::Option(name) => self.options.get(name).cloned(),
      ValueRef::Setting(name) => self.settings.get(name).map(|v| OptionValue::Str(v.clone())),
    }
  }
}

/// Validate overrides against the recipe and produce its configuration.
pub fn resolve_options(
  recipe: &Recipe,
  overrides: &Overrides,
  defaults: &BTreeMap<String, String>,
) -> Result<BuildConfiguration, OptionValidationError> {
  for name in overrides.settings.keys() {
    let axis = SettingAxis::from_str(name).map_err(|_| OptionValidationError::UnknownSetting {
      setting: name.clone(),
    })?;
    if !recipe.declares(axis) {
      return Err(OptionValidationError::UndeclaredSetting {
        recipe: recipe.name.clone(),
        setting: name.clone(),
      });
    }
  }

  let mut settings = BTreeMap::new();
  for axis in &recipe.settings {
    let key = axis.as_str();
    let value = overrides
      .settings
      .get(key)
      .or_else(|| defaults.get(key))
      .cloned()
      .unwrap_or_default();
    if *axis == SettingAxis::BuildType && !BUILD_TYPES.contains(&value.as_str()) {
      return Err(OptionValidationError::InvalidBuildType { value });
    }
    settings.insert(key.to_string(), value);
  }

  for (name, value) in &overrides.options {
    let Some(decl) = recipe.options.get(name) else {
      return Err(OptionValidationError::UnknownOption {
        recipe: recipe.name.clone(),
        option: name.clone(),
      });
    };
    if decl.find(value).is_none() {
      return Err(OptionValidationError::ValueOutOfDomain {
        recipe: recipe.name.clone(),
        option: name.clone(),
        value: value.canonical(),
        allowed: decl.values.iter().map(|v| v.canonical()).collect::<Vec<_>>().join(", "),
      });
    }
  }

  let options: BTreeMap<String, OptionValue> = recipe
    .options
    .iter()
    .map(|(name, decl)| {
      let chosen = overrides
        .options
        .get(name)
        .and_then(|v| decl.find(v))
        .unwrap_or(&decl.default);
      (name.clone(), chosen.clone())
    })
    .collect();

  let mut config = BuildConfiguration {
    settings,
    options,
    definitions: BTreeMap::new(),
  };

  let mut definitions = BTreeMap::new();
  for (key, rule) in &recipe.definitions {
    match rule {
      DefinitionRule::Constant(value) => {
        definitions.insert(key.clone(), value.clone());
      }
      DefinitionRule::Mapped { from, map } => {
        let value = config
          .lookup(from)
          .ok_or_else(|| OptionValidationError::UnresolvedReference {
            recipe: recipe.name.clone(),
            definition: key.clone(),
            reference: from.to_string(),
          })?;
        let rendered = match (map, &value) {
          (Some(map), _) => map.get(&value.canonical()).cloned(),
          (None, OptionValue::Bool(true)) => Some("ON".to_string()),
          (None, OptionValue::Bool(false)) => Some("OFF".to_string()),
          (None, other) => Some(other.canonical()),
        };
        if let Some(rendered) = rendered {
          definitions.insert(key.clone(), rendered);
        }
      }
    }
  }
  config.definitions = definitions;

  Ok(config)
}

/// Replace `${build_type}`, `${os}`, `${arch}`, `${compiler}` and
/// `${options.<name>}` with values from `config`.
pub fn substitute(template: &str, config: &BuildConfiguration) -> Result<String, OptionValidationError> {
  let mut out = String::with_capacity(template.len());
  let mut rest = template;

  while let Some(start) = rest.find("${") {
    out.push_str(&rest[..start]);
    let after = &rest[start + 2..];
    let Some(end) = after.find('}') else {
      return Err(OptionValidationError::UnknownPlaceholder {
        template: template.to_string(),
        placeholder: after.to_string(),
      });
    };
    let placeholder = &after[..end];
    let value = match placeholder.strip_prefix("options.") {
      Some(option) => config.option(option).map(OptionValue::canonical),
      None => SettingAxis::from_str(placeholder)
        .ok()
        .and_then(|axis| config.setting(axis))
        .map(str::to_string),
    };
    let value = value.ok_or_else(|| OptionValidationError::UnknownPlaceholder {
      template: template.to_string(),
      placeholder: placeholder.to_string(),
    })?;
    out.push_str(&value);
    rest = &after[end + 1..];
  }
  out.push_str(rest);

  Ok(out)
}
