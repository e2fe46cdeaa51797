mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pinforge_lib::collect::CollisionPolicy;

use cmd::GlobalArgs;
use output::OutputFormat;

/// pinforge - build and repackage pinned native libraries from Lua recipes
#[derive(Parser)]
#[command(name = "pinforge")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Directory holding one subdirectory per recipe
  #[arg(long, global = true, env = "PINFORGE_BOOK", default_value = "recipes")]
  book: PathBuf,

  /// Artifact store root (defaults to the per-user data directory)
  #[arg(long, global = true, env = "PINFORGE_STORE")]
  store: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

/// Overrides shared by every command that configures recipes.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct OverrideArgs {
  /// Option override, `name=value` (repeatable)
  #[arg(short = 'O', long = "option", value_name = "NAME=VALUE")]
  options: Vec<String>,

  /// Setting override, `axis=value` (repeatable)
  #[arg(short = 's', long = "setting", value_name = "AXIS=VALUE")]
  settings: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
  /// Resolve one recipe; its requirements must already be resolved
  Resolve {
    /// Package reference, `name/version[@channel]`
    reference: String,

    #[command(flatten)]
    overrides: OverrideArgs,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Build recipes in dependency order
  Build {
    /// Requests, `name[/version][@channel]`
    #[arg(required = true)]
    requests: Vec<String>,

    /// Also build requirements found in the recipe book
    #[arg(long)]
    with_deps: bool,

    /// Maximum number of recipes built at once
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// How flattened files with the same name are handled
    #[arg(long)]
    collision: Option<CollisionPolicy>,

    #[command(flatten)]
    overrides: OverrideArgs,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Show what a build would do without running it
  Plan {
    /// Requests, `name[/version][@channel]`
    #[arg(required = true)]
    requests: Vec<String>,

    /// Include requirements found in the recipe book
    #[arg(long)]
    with_deps: bool,

    #[command(flatten)]
    overrides: OverrideArgs,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Show a recipe, or the host and store when no recipe is given
  Info {
    /// Recipe, `name[/version]`
    recipe: Option<String>,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// List the recipes in the book
  List {
    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let global = GlobalArgs {
    book: cli.book,
    store: cli.store,
    verbose: cli.verbose,
  };

  match cli.command {
    Commands::Resolve {
      reference,
      overrides,
      output,
    } => cmd::cmd_resolve(&global, &reference, &overrides.options, &overrides.settings, output),
    Commands::Build {
      requests,
      with_deps,
      jobs,
      collision,
      overrides,
      output,
    } => cmd::cmd_build(
      &global,
      cmd::BuildArgs {
        requests,
        with_deps,
        jobs,
        collision,
        options: overrides.options,
        settings: overrides.settings,
      },
      output,
    ),
    Commands::Plan {
      requests,
      with_deps,
      overrides,
      output,
    } => cmd::cmd_plan(&global, &requests, with_deps, &overrides.options, &overrides.settings, output),
    Commands::Info { recipe, output } => cmd::cmd_info(&global, recipe.as_deref(), output),
    Commands::List { output } => cmd::cmd_list(&global, output),
  }
}
