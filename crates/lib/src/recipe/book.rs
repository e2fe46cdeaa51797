use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::consts::RECIPE_FILE;
use crate::recipe::lua::load_recipe;
use crate::recipe::{Recipe, RecipeError};

/// A collection of recipes indexed by `(name, canonical version)`.
///
/// On disk a book is a directory whose immediate subdirectories each hold a
/// `recipe.lua`.
#[derive(Debug, Default, Clone)]
pub struct RecipeBook {
  recipes: BTreeMap<(String, String), Arc<Recipe>>,
}

impl RecipeBook {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn load(dir: &Path) -> Result<Self, RecipeError> {
    let read_err = |source| RecipeError::Read {
      path: dir.to_path_buf(),
      source,
    };
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
      .map_err(read_err)?
      .filter_map(|entry| entry.ok().map(|e| e.path()))
      .filter(|path| path.join(RECIPE_FILE).is_file())
      .collect();
    entries.sort();

    let mut book = Self::new();
    for entry in entries {
      let recipe = load_recipe(&entry.join(RECIPE_FILE))?;
      debug!(name = %recipe.name, version = %recipe.version, dir = %entry.display(), "loaded recipe");
      book.insert(recipe)?;
    }

    info!(count = book.len(), dir = %dir.display(), "loaded recipe book");
    Ok(book)
  }

  pub fn insert(&mut self, recipe: Recipe) -> Result<Arc<Recipe>, RecipeError> {
    let key = (recipe.name.clone(), recipe.canonical_version());
    if let Some(existing) = self.recipes.get(&key) {
      return Err(RecipeError::Duplicate {
        name: key.0,
        version: key.1,
        first: existing.recipe_dir.clone(),
        second: recipe.recipe_dir,
      });
    }
    let recipe = Arc::new(recipe);
    self.recipes.insert(key, recipe.clone());
    Ok(recipe)
  }

  pub fn get(&self, name: &str, version: &str) -> Option<&Arc<Recipe>> {
    self.recipes.get(&(name.to_string(), version.to_string()))
  }

  /// Find a recipe by name, optionally narrowed to one canonical version.
  ///
  /// Without a version the name must be unambiguous.
  pub fn find(&self, name: &str, version: Option<&str>) -> Result<&Arc<Recipe>, RecipeError> {
    if let Some(version) = version {
      return self
        .get(name, version)
        .ok_or_else(|| RecipeError::NotFound(format!("{}/{}", name, version)));
    }

    let candidates: Vec<&Arc<Recipe>> = self
      .recipes
      .iter()
      .filter(|((n, _), _)| n == name)
      .map(|(_, recipe)| recipe)
      .collect();
    match candidates.as_slice() {
      [] => Err(RecipeError::NotFound(name.to_string())),
      [only] => Ok(only),
      many => Err(RecipeError::Ambiguous {
        name: name.to_string(),
        versions: many
          .iter()
          .map(|r| r.canonical_version())
          .collect::<Vec<_>>()
          .join(", "),
      }),
    }
  }

  pub fn iter(&self) -> impl Iterator<Item = &Arc<Recipe>> {
    self.recipes.values()
  }

  pub fn len(&self) -> usize {
    self.recipes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.recipes.is_empty()
  }
}
