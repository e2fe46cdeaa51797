//! Implementation of the `pinforge list` command.

use anyhow::Result;
use serde::Serialize;

use super::GlobalArgs;
use crate::output::{OutputFormat, print_info, print_json, symbols};

#[derive(Debug, Serialize)]
struct ListEntry {
  name: String,
  version: String,
  description: Option<String>,
}

/// List every recipe in the book, ordered by name then version.
pub fn cmd_list(global: &GlobalArgs, output: OutputFormat) -> Result<()> {
  let book = global.recipe_book()?;
  let mut entries: Vec<ListEntry> = book
    .iter()
    .map(|recipe| ListEntry {
      name: recipe.name.clone(),
      version: recipe.canonical_version(),
      description: recipe.description.clone(),
    })
    .collect();
  entries.sort_by(|a, b| (&a.name, &a.version).cmp(&(&b.name, &b.version)));

  if output.is_json() {
    return print_json(&entries);
  }
  if entries.is_empty() {
    print_info(&format!("No recipes found in {}", global.book.display()));
    return Ok(());
  }
  for entry in &entries {
    match &entry.description {
      Some(description) => println!("{} {}/{} {}", symbols::INFO, entry.name, entry.version, description),
      None => println!("{} {}/{}", symbols::INFO, entry.name, entry.version),
    }
  }
  Ok(())
}
