//! The per-recipe pipeline.
//!
//! Dependencies, cache check, sources, build, collection, export, manifest,
//! publication. Each step is attributed to a [`Stage`] so failures say where
//! they happened.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::build::{BuildTool, run_build};
use crate::collect::{SearchRoot, TreeKind, collect};
use crate::execute::manifest::PackageManifest;
use crate::execute::types::{EngineConfig, ExecuteError, RecipeFailure, Stage, StageError};
use crate::export::{PackageInfo, export};
use crate::options::{BuildConfiguration, Overrides, resolve_options};
use crate::recipe::{PackageRef, Recipe};
use crate::resolve::PackageRegistry;
use crate::source::{SourceFetcher, acquire, copy_exports};
use crate::util::hash::{Hashable, ObjectHash, hash_file};

/// A recipe with its reference, validated configuration and cache key.
#[derive(Debug, Clone)]
pub struct PlannedRecipe {
  pub reference: PackageRef,
  pub recipe: Arc<Recipe>,
  pub config: BuildConfiguration,
  pub key: ObjectHash,
}

impl PlannedRecipe {
  /// Validate `overrides` and compute the cache key. Reads recipe files but
  /// writes nothing.
  pub fn new(
    recipe: Arc<Recipe>,
    channel: &str,
    overrides: &Overrides,
    defaults: &BTreeMap<String, String>,
  ) -> Result<Self, ExecuteError> {
    let reference = recipe.reference(channel).map_err(crate::recipe::RecipeError::from)?;
    let config =
      resolve_options(&recipe, overrides, defaults).map_err(|e| RecipeFailure::new(&reference, Stage::Options, e))?;
    let key = cache_key(&recipe, &reference, &config).map_err(|e| RecipeFailure::new(&reference, Stage::Load, e))?;
    Ok(Self {
      reference,
      recipe,
      config,
      key,
    })
  }
}

#[derive(Serialize)]
struct CacheKey<'a> {
  recipe: &'a Recipe,
  /// Hashes of files shipped next to the recipe, keyed by relative path.
  files: BTreeMap<String, String>,
  reference: &'a PackageRef,
  configuration: &'a BuildConfiguration,
}

impl Hashable for CacheKey<'_> {}

fn cache_key(recipe: &Recipe, reference: &PackageRef, config: &BuildConfiguration) -> Result<ObjectHash, StageError> {
  let patches = recipe.sources.iter().flat_map(|s| s.patches.iter().map(|p| p.file.clone()));
  let mut files = BTreeMap::new();
  for rel in recipe.exports.iter().map(PathBuf::from).chain(patches) {
    let digest = hash_file(&recipe.recipe_dir.join(&rel))?;
    files.insert(rel.to_string_lossy().replace('\\', "/"), digest.0);
  }

  Ok(
    CacheKey {
      recipe,
      files,
      reference,
      configuration: config,
    }
    .compute_hash()?,
  )
}

/// The shared collaborators one pipeline runs against.
pub(crate) struct Collaborators<'a, F, T> {
  pub fetcher: &'a F,
  pub tool: &'a T,
  pub registry: &'a PackageRegistry,
  pub config: &'a EngineConfig,
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
  pub info: Arc<PackageInfo>,
  pub cached: bool,
}

/// Run one planned recipe to a published package.
pub(crate) async fn run_pipeline<F: SourceFetcher, T: BuildTool>(
  ctx: &Collaborators<'_, F, T>,
  planned: &PlannedRecipe,
) -> Result<PipelineOutcome, RecipeFailure> {
  let reference = &planned.reference;
  let recipe = &planned.recipe;
  let store = &ctx.config.store;

  let dependencies = ctx
    .registry
    .resolve_requirements(reference, &recipe.requires)
    .map_err(|e| RecipeFailure::new(reference, Stage::Dependencies, e))?;

  let package_dir = store.package_dir(&recipe.name, &planned.key);
  if let Some(manifest) = PackageManifest::load_valid(&package_dir, reference, &planned.key) {
    info!(reference = %reference, path = ?package_dir, "reusing cached package");
    let info = ctx
      .registry
      .publish(manifest.package)
      .map_err(|e| RecipeFailure::new(reference, Stage::Store, e))?;
    return Ok(PipelineOutcome { info, cached: true });
  }

  info!(reference = %reference, key = %planned.key, "building package");
  let dirs = store.work_dirs(&planned.key);
  if package_dir.exists() {
    debug!(path = ?package_dir, "discarding incomplete package");
    remove_dir(&package_dir).await.map_err(store_error(reference, &package_dir))?;
  }
  tokio::fs::create_dir_all(&dirs.src)
    .await
    .map_err(store_error(reference, &dirs.src))?;
  tokio::fs::create_dir_all(&package_dir)
    .await
    .map_err(store_error(reference, &package_dir))?;

  acquire(ctx.fetcher, recipe, &dirs.src, &store.downloads_dir())
    .await
    .map_err(|e| RecipeFailure::new(reference, Stage::Source, e))?;
  copy_exports(recipe, &dirs.src).map_err(|e| RecipeFailure::new(reference, Stage::Source, e))?;

  let prefix_paths: Vec<PathBuf> = dependencies.iter().map(|dep| dep.root.clone()).collect();
  run_build(ctx.tool, recipe, &planned.config, &dirs, &package_dir, &prefix_paths)
    .await
    .map_err(|e| RecipeFailure::new(reference, Stage::Build, e))?;

  let roots = [
    SearchRoot {
      kind: TreeKind::Source,
      path: dirs.src.clone(),
    },
    SearchRoot {
      kind: TreeKind::Build,
      path: dirs.build.clone(),
    },
  ];
  let collected = collect(&recipe.package, &roots, &package_dir, ctx.config.collision_policy)
    .map_err(|e| RecipeFailure::new(reference, Stage::Collect, e))?;
  debug!(reference = %reference, files = collected.files.len(), overwritten = collected.overwritten, "collected artifacts");

  let info = export(recipe, reference, &planned.config, &package_dir)
    .map_err(|e| RecipeFailure::new(reference, Stage::Export, e))?;

  PackageManifest::seal(&package_dir, reference, &planned.key, &planned.config, &info)
    .and_then(|manifest| manifest.write(&package_dir))
    .map_err(|e| RecipeFailure::new(reference, Stage::Store, e))?;

  let info = ctx
    .registry
    .publish(info)
    .map_err(|e| RecipeFailure::new(reference, Stage::Store, e))?;
  info!(reference = %reference, libs = ?info.libs, "package ready");
  Ok(PipelineOutcome { info, cached: false })
}

fn store_error<'a>(reference: &'a PackageRef, path: &'a Path) -> impl FnOnce(std::io::Error) -> RecipeFailure + 'a {
  move |source| {
    RecipeFailure::new(
      reference,
      Stage::Store,
      StageError::Store {
        path: path.to_path_buf(),
        source,
      },
    )
  }
}

async fn remove_dir(path: &Path) -> std::io::Result<()> {
  match tokio::fs::remove_dir_all(path).await {
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
    other => other,
  }
}
