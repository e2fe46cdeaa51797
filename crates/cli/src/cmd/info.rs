//! Implementation of the `pinforge info` command.

use anyhow::Result;
use serde::Serialize;

use pinforge_lib::platform::host_platform;
use pinforge_lib::recipe::{DependencyKind, Recipe};

use super::GlobalArgs;
use crate::output::{OutputFormat, print_info, print_json, print_stat};

#[derive(Debug, Serialize)]
struct HostInfo {
  platform: String,
  store: String,
  book: String,
  recipes: usize,
}

/// Show one recipe, or the host and store when no recipe is named.
///
/// Recipes are named as `name` or `name/version`.
pub fn cmd_info(global: &GlobalArgs, recipe: Option<&str>, output: OutputFormat) -> Result<()> {
  let book = global.recipe_book()?;

  let Some(raw) = recipe else {
    let host = HostInfo {
      platform: host_platform(),
      store: global.engine_config().store.root.display().to_string(),
      book: global.book.display().to_string(),
      recipes: book.len(),
    };
    if output.is_json() {
      return print_json(&host);
    }
    print_stat("Platform", &host.platform);
    print_stat("Store", &host.store);
    print_stat("Book", &host.book);
    print_stat("Recipes", &host.recipes.to_string());
    return Ok(());
  };

  let (name, version) = match raw.split_once('/') {
    Some((name, version)) => (name, Some(version)),
    None => (raw, None),
  };
  let recipe = book.find(name, version)?;

  if output.is_json() {
    return print_json(recipe.as_ref());
  }
  print_recipe(recipe);
  Ok(())
}

fn print_recipe(recipe: &Recipe) {
  print_info(&format!("{}/{}", recipe.name, recipe.canonical_version()));
  if let Some(description) = &recipe.description {
    print_stat("Description", description);
  }
  if let Some(license) = &recipe.license {
    print_stat("License", license);
  }
  if let Some(url) = &recipe.url {
    print_stat("Homepage", url);
  }
  if !recipe.topics.is_empty() {
    print_stat("Topics", &recipe.topics.join(", "));
  }
  if !recipe.settings.is_empty() {
    let axes: Vec<&str> = recipe.settings.iter().map(|axis| axis.as_str()).collect();
    print_stat("Settings", &axes.join(", "));
  }
  for (name, decl) in &recipe.options {
    let values: Vec<String> = decl.values.iter().map(ToString::to_string).collect();
    print_stat(
      &format!("Option {}", name),
      &format!("[{}] default {}", values.join(", "), decl.default),
    );
  }
  for source in &recipe.sources {
    print_stat("Source", &format!("{} -> {}", source.origin.url(), source.dest));
  }
  for requirement in &recipe.requires {
    let label = match requirement.kind {
      DependencyKind::Link => "Requires",
      DependencyKind::Build => "Build requires",
    };
    print_stat(label, &requirement.reference.to_string());
  }
}
