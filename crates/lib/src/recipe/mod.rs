//! Recipes: the declarative description of how one pinned library is built.
//!
//! - [`types`]: the validated recipe data model
//! - [`version`]: literal and composite versions
//! - [`reference`]: `name/version@channel` package references
//! - [`lua`]: evaluation of `recipe.lua` files
//! - [`book`]: a directory of recipes indexed by name and version

pub mod book;
pub mod lua;
pub mod reference;
pub mod types;
pub mod version;

use std::path::PathBuf;

use thiserror::Error;

pub use book::RecipeBook;
pub use reference::{DependencyKind, PackageRef, Requirement};
pub use types::{OptionDecl, OptionValue, Recipe, SettingAxis};
pub use version::Version;

/// Errors raised while loading or looking up recipes, before any pipeline runs.
#[derive(Debug, Error)]
pub enum RecipeError {
  #[error("failed to read recipe '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to evaluate recipe '{path}': {message}")]
  Lua { path: PathBuf, message: String },

  #[error("invalid recipe '{path}': {message}")]
  Invalid { path: PathBuf, message: String },

  #[error("recipe {name}/{version} is defined twice: '{first}' and '{second}'")]
  Duplicate {
    name: String,
    version: String,
    first: PathBuf,
    second: PathBuf,
  },

  #[error("no recipe found for '{0}'")]
  NotFound(String),

  #[error("recipe '{name}' has several versions ({versions}); specify one")]
  Ambiguous { name: String, versions: String },

  #[error("invalid reference: {0}")]
  Reference(#[from] reference::ReferenceError),
}
