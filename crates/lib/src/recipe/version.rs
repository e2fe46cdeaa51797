//! Structured recipe versions.
//!
//! A version is either a literal (`1.6.1`) or a composite built from a base
//! and the revisions of named sources (`2.4` + `core@cfaf74c` + `tools@6b7ae76`
//! renders as `2.4.cfaf74c.6b7ae76`). Downstream code compares the canonical
//! rendering and never parses it back apart.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One named component of a composite version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentPin {
  pub name: String,
  pub rev: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Version {
  Literal(String),
  Composite { base: String, pins: Vec<ComponentPin> },
}

impl Version {
  pub fn literal(version: &str) -> Self {
    Version::Literal(version.to_string())
  }

  /// Pins in the order they contribute to the canonical rendering.
  pub fn pins(&self) -> &[ComponentPin] {
    match self {
      Version::Literal(_) => &[],
      Version::Composite { pins, .. } => pins,
    }
  }

  pub fn canonical(&self) -> String {
    self.to_string()
  }
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Version::Literal(v) => write!(f, "{}", v),
      Version::Composite { base, pins } => {
        write!(f, "{}", base)?;
        for pin in pins {
          write!(f, ".{}", pin.rev)?;
        }
        Ok(())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn pin(name: &str, rev: &str) -> ComponentPin {
    ComponentPin {
      name: name.to_string(),
      rev: rev.to_string(),
    }
  }

  #[test]
  fn literal_renders_verbatim() {
    assert_eq!(Version::literal("0.9.6").canonical(), "0.9.6");
    assert!(Version::literal("0.9.6").pins().is_empty());
  }

  #[test]
  fn composite_appends_pins_in_order() {
    let version = Version::Composite {
      base: "2.4".to_string(),
      pins: vec![pin("core", "cfaf74c"), pin("tools", "6b7ae76")],
    };
    assert_eq!(version.canonical(), "2.4.cfaf74c.6b7ae76");
    assert_eq!(version.pins()[1].name, "tools");
  }
}
