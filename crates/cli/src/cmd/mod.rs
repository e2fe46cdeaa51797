mod build;
mod info;
mod list;
mod plan;
mod resolve;

use std::path::PathBuf;

use anyhow::{Context, Result};

use pinforge_lib::execute::{EngineConfig, RecipeFailure, Request};
use pinforge_lib::options::Overrides;
use pinforge_lib::recipe::RecipeBook;
use pinforge_lib::store::paths::StorePaths;

use crate::output::{print_diagnostics, print_error};

pub use build::{BuildArgs, cmd_build};
pub use info::cmd_info;
pub use list::cmd_list;
pub use plan::cmd_plan;
pub use resolve::cmd_resolve;

/// Flags every subcommand sees.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
  pub book: PathBuf,
  pub store: Option<PathBuf>,
  pub verbose: bool,
}

impl GlobalArgs {
  pub fn recipe_book(&self) -> Result<RecipeBook> {
    RecipeBook::load(&self.book).with_context(|| format!("Failed to load recipe book '{}'", self.book.display()))
  }

  /// Engine configuration from the environment, with `--store` taking precedence.
  pub fn engine_config(&self) -> EngineConfig {
    let mut config = EngineConfig::from_env();
    if let Some(store) = &self.store {
      config.store = StorePaths::new(store);
    }
    config
  }
}

pub fn parse_overrides(options: &[String], settings: &[String]) -> Result<Overrides> {
  let mut overrides = Overrides::new();
  for option in options {
    overrides.push_option(option)?;
  }
  for setting in settings {
    overrides.push_setting(setting)?;
  }
  Ok(overrides)
}

pub fn parse_requests(raw: &[String], overrides: &Overrides) -> Result<Vec<Request>> {
  raw
    .iter()
    .map(|r| {
      Request::parse(r)
        .map(|req| req.with_overrides(overrides.clone()))
        .with_context(|| format!("Invalid request '{}'", r))
    })
    .collect()
}

/// Print a failed recipe with its stage and any captured tool output.
pub fn report_failure(failure: &RecipeFailure, verbose: bool) {
  print_error(&format!("{} failed during {}", failure.reference, failure.stage));
  eprintln!("  {}", failure.source);

  if let Some(output) = failure.diagnostics() {
    print_diagnostics("command", &output.command_line());
    if verbose {
      print_diagnostics("stdout", &output.stdout);
    }
    print_diagnostics("stderr", &output.stderr);
  }
}
