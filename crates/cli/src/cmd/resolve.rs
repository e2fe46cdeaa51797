//! Implementation of the `pinforge resolve` command.

use std::time::Instant;

use anyhow::{Context, Result};

use pinforge_lib::execute::{Engine, ExecuteError};
use pinforge_lib::export::PackageInfo;
use pinforge_lib::recipe::PackageRef;

use super::{GlobalArgs, parse_overrides, report_failure};
use crate::output::{OutputFormat, format_elapsed, print_json, print_stat, print_success};

/// Resolve exactly one package. Its requirements must already be resolved
/// or published in the store.
pub fn cmd_resolve(
  global: &GlobalArgs,
  reference: &str,
  options: &[String],
  settings: &[String],
  output: OutputFormat,
) -> Result<()> {
  let reference: PackageRef = reference
    .parse()
    .with_context(|| format!("Invalid package reference '{}'", reference))?;
  let overrides = parse_overrides(options, settings)?;
  let engine = Engine::new(global.recipe_book()?, global.engine_config());

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let started = Instant::now();
  let result = rt.block_on(engine.resolve(&reference.name, &reference.version, &reference.channel, &overrides));

  let info = match result {
    Ok(info) => info,
    Err(ExecuteError::Failed(failure)) => {
      report_failure(&failure, global.verbose);
      return Err((*failure).into());
    }
    Err(e) => return Err(e.into()),
  };

  if output.is_json() {
    print_json(info.as_ref())?;
  } else {
    print_success(&format!("{} ({})", info.reference, format_elapsed(started.elapsed())));
    print_package(&info);
  }
  Ok(())
}

pub(super) fn print_package(info: &PackageInfo) {
  print_stat("Root", &info.root.display().to_string());
  for dir in &info.include_dirs {
    print_stat("Include", &dir.display().to_string());
  }
  for dir in &info.lib_dirs {
    print_stat("Lib dir", &dir.display().to_string());
  }
  print_stat("Libs", &info.libs.join(", "));
  if !info.requires.is_empty() {
    let requires: Vec<String> = info.requires.iter().map(ToString::to_string).collect();
    print_stat("Requires", &requires.join(", "));
  }
}
