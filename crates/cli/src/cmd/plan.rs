//! Implementation of the `pinforge plan` command.
//!
//! Validates every request and prints the waves a build would run, with the
//! cache key of each recipe and whether the store already holds it.

use anyhow::Result;
use serde::Serialize;

use pinforge_lib::execute::{Engine, PackageManifest};

use super::{GlobalArgs, parse_overrides, parse_requests};
use crate::output::{OutputFormat, print_info, print_json, print_stat, symbols, truncate_hash};

#[derive(Debug, Serialize)]
struct PlanEntry {
  reference: String,
  key: String,
  cached: bool,
  dependencies: Vec<String>,
}

pub fn cmd_plan(
  global: &GlobalArgs,
  requests: &[String],
  with_deps: bool,
  options: &[String],
  settings: &[String],
  output: OutputFormat,
) -> Result<()> {
  let overrides = parse_overrides(options, settings)?;
  let requests = parse_requests(requests, &overrides)?;
  let engine = Engine::new(global.recipe_book()?, global.engine_config());
  let plan = engine.plan(&requests, with_deps)?;
  let store = &engine.config().store;

  let waves: Vec<Vec<PlanEntry>> = plan
    .waves()
    .iter()
    .map(|wave| {
      wave
        .iter()
        .filter_map(|reference| plan.get(reference))
        .map(|planned| {
          let package_dir = store.package_dir(&planned.recipe.name, &planned.key);
          PlanEntry {
            reference: planned.reference.to_string(),
            key: planned.key.0.clone(),
            cached: PackageManifest::load_valid(&package_dir, &planned.reference, &planned.key).is_some(),
            dependencies: plan.dependencies(&planned.reference).iter().map(ToString::to_string).collect(),
          }
        })
        .collect()
    })
    .collect();

  if output.is_json() {
    return print_json(&waves);
  }

  for (idx, wave) in waves.iter().enumerate() {
    print_info(&format!("Wave {}", idx + 1));
    for entry in wave {
      let state = if entry.cached { "cached" } else { "build" };
      println!(
        "  {} {} [{}] {}",
        symbols::ARROW,
        entry.reference,
        truncate_hash(&entry.key),
        state
      );
      if global.verbose && !entry.dependencies.is_empty() {
        println!("      after {}", entry.dependencies.join(", "));
      }
    }
  }
  println!();
  print_stat("Recipes", &plan.len().to_string());
  print_stat("Waves", &waves.len().to_string());
  Ok(())
}
