//! Recipe execution.
//!
//! This module provides the engine entry points:
//! - [`Engine::resolve`] runs one recipe whose requirements are already resolved
//! - [`Engine::execute`] plans several recipes into dependency waves and runs
//!   independent recipes concurrently
//!
//! Failures never stop unrelated recipes. A recipe whose dependency failed is
//! not attempted and is reported with the upstream root cause.

pub mod manifest;
pub mod pipeline;
pub mod types;

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::build::{BuildTool, CMake};
use crate::export::PackageInfo;
use crate::options::Overrides;
use crate::recipe::{PackageRef, Recipe, RecipeBook};
use crate::resolve::{DependencyResolutionError, ExecutionDag, PackageRegistry};
use crate::source::{SourceFetcher, SystemFetcher};

use pipeline::{Collaborators, PipelineOutcome, run_pipeline};

pub use manifest::PackageManifest;
pub use pipeline::PlannedRecipe;
pub use types::{
  CancelHandle, EngineConfig, ExecuteError, ExecutionReport, RecipeFailure, Request, Stage, StageError,
};

/// Validated recipes and the order they must run in.
#[derive(Debug)]
pub struct ExecutionPlan {
  recipes: BTreeMap<PackageRef, Arc<PlannedRecipe>>,
  dag: ExecutionDag,
}

impl ExecutionPlan {
  pub fn waves(&self) -> Vec<Vec<PackageRef>> {
    self.dag.waves()
  }

  pub fn get(&self, reference: &PackageRef) -> Option<&PlannedRecipe> {
    self.recipes.get(reference).map(Arc::as_ref)
  }

  /// Direct dependencies of `reference` that are part of this plan.
  pub fn dependencies(&self, reference: &PackageRef) -> Vec<PackageRef> {
    self.dag.dependencies(reference)
  }

  pub fn iter(&self) -> impl Iterator<Item = &PlannedRecipe> {
    self.recipes.values().map(Arc::as_ref)
  }

  pub fn len(&self) -> usize {
    self.recipes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.recipes.is_empty()
  }
}

pub struct Engine<F = SystemFetcher, T = CMake> {
  book: Arc<RecipeBook>,
  fetcher: Arc<F>,
  tool: Arc<T>,
  registry: Arc<PackageRegistry>,
  config: Arc<EngineConfig>,
  cancel: CancelHandle,
}

impl Engine {
  /// An engine using the host's git, patch and cmake.
  pub fn new(book: RecipeBook, config: EngineConfig) -> Self {
    let tool = CMake::from_env().with_jobs(config.jobs);
    Self::with_collaborators(book, config, SystemFetcher::from_env(), tool)
  }
}

impl<F: SourceFetcher, T: BuildTool> Engine<F, T> {
  pub fn with_collaborators(book: RecipeBook, config: EngineConfig, fetcher: F, tool: T) -> Self {
    let registry = PackageRegistry::with_store(config.store.clone());
    Self {
      book: Arc::new(book),
      fetcher: Arc::new(fetcher),
      tool: Arc::new(tool),
      registry: Arc::new(registry),
      config: Arc::new(config),
      cancel: CancelHandle::default(),
    }
  }

  pub fn book(&self) -> &RecipeBook {
    &self.book
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  pub fn registry(&self) -> &PackageRegistry {
    &self.registry
  }

  /// A handle that stops scheduling further recipes when cancelled.
  pub fn cancel_handle(&self) -> CancelHandle {
    self.cancel.clone()
  }

  /// Resolve exactly one recipe. Every requirement must already be resolved
  /// in this engine or published in its store.
  pub async fn resolve(
    &self,
    name: &str,
    version: &str,
    channel: &str,
    overrides: &Overrides,
  ) -> Result<Arc<PackageInfo>, ExecuteError> {
    let recipe = self.book.find(name, Some(version))?.clone();
    let planned = PlannedRecipe::new(recipe, channel, overrides, &self.config.settings)?;
    let ctx = Collaborators {
      fetcher: self.fetcher.as_ref(),
      tool: self.tool.as_ref(),
      registry: self.registry.as_ref(),
      config: self.config.as_ref(),
    };
    Ok(run_pipeline(&ctx, &planned).await?.info)
  }

  /// Validate every request and order them. Nothing is written.
  ///
  /// With `include_deps`, requirements found in the recipe book join the plan
  /// with default options; the rest must be satisfied by the registry.
  pub fn plan(&self, requests: &[Request], include_deps: bool) -> Result<ExecutionPlan, ExecuteError> {
    let mut queue: VecDeque<(Arc<Recipe>, String, Overrides)> = VecDeque::new();
    for request in requests {
      let recipe = self.book.find(&request.name, request.version.as_deref())?;
      queue.push_back((recipe.clone(), request.channel.clone(), request.overrides.clone()));
    }

    let mut recipes: BTreeMap<PackageRef, Arc<PlannedRecipe>> = BTreeMap::new();
    while let Some((recipe, channel, overrides)) = queue.pop_front() {
      let reference = recipe.reference(&channel).map_err(crate::recipe::RecipeError::from)?;
      if recipes.contains_key(&reference) {
        if !overrides.is_empty() {
          warn!(reference = %reference, "already planned; ignoring repeated overrides");
        }
        continue;
      }

      let planned = PlannedRecipe::new(recipe, &channel, &overrides, &self.config.settings)?;
      if include_deps {
        for requirement in &planned.recipe.requires {
          let dep = &requirement.reference;
          match self.book.get(&dep.name, &dep.version) {
            Some(dep_recipe) => queue.push_back((dep_recipe.clone(), dep.channel.clone(), Overrides::new())),
            None => debug!(requirement = %dep, "not in the recipe book; expecting a published package"),
          }
        }
      }
      recipes.insert(reference, Arc::new(planned));
    }

    let dag = ExecutionDag::new(
      recipes
        .iter()
        .map(|(reference, planned)| (reference, planned.recipe.requires.as_slice())),
    )?;
    info!(recipes = recipes.len(), "execution planned");
    Ok(ExecutionPlan { recipes, dag })
  }

  /// Plan and run `requests`.
  pub async fn execute(&self, requests: &[Request], include_deps: bool) -> Result<ExecutionReport, ExecuteError> {
    let plan = self.plan(requests, include_deps)?;
    Ok(self.run(&plan).await)
  }

  /// Run a plan wave by wave.
  pub async fn run(&self, plan: &ExecutionPlan) -> ExecutionReport {
    let waves = plan.waves();
    info!(wave_count = waves.len(), "starting execution");

    let mut report = ExecutionReport::default();
    let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));

    for (wave_idx, wave) in waves.iter().enumerate() {
      if self.cancel.is_cancelled() {
        report.cancelled.extend(waves[wave_idx..].iter().flatten().cloned());
        warn!(remaining = report.cancelled.len(), "execution cancelled");
        break;
      }
      debug!(wave = wave_idx, recipes = wave.len(), "executing wave");

      let mut ready = Vec::new();
      for reference in wave {
        let upstream = plan
          .dag
          .dependencies(reference)
          .into_iter()
          .find_map(|dep| report.failed.get(&dep).map(|failure| (dep, failure.root_cause())));

        match upstream {
          Some((dependency, (root, cause))) => {
            warn!(recipe = %reference, dependency = %dependency, root = %root, "skipping recipe due to failed dependency");
            let failure = RecipeFailure::new(
              reference,
              Stage::Dependencies,
              DependencyResolutionError::UpstreamFailed {
                recipe: reference.clone(),
                dependency,
                root,
                cause,
              },
            );
            report.failed.insert(reference.clone(), failure);
          }
          None => {
            if let Some(planned) = plan.recipes.get(reference) {
              ready.push(planned.clone());
            }
          }
        }
      }

      for (reference, result) in self.execute_wave(ready, semaphore.clone()).await {
        match result {
          Ok(outcome) => {
            if outcome.cached {
              report.cached.insert(reference.clone());
            }
            report.resolved.insert(reference, outcome.info);
          }
          Err(failure) => {
            error!(recipe = %reference, stage = %failure.stage, error = %failure.source, "recipe failed");
            report.failed.insert(reference, failure);
          }
        }
      }
    }

    info!(
      resolved = report.resolved.len(),
      cached = report.cached.len(),
      failed = report.failed.len(),
      cancelled = report.cancelled.len(),
      "execution complete"
    );
    report
  }

  async fn execute_wave(
    &self,
    wave: Vec<Arc<PlannedRecipe>>,
    semaphore: Arc<Semaphore>,
  ) -> Vec<(PackageRef, Result<PipelineOutcome, RecipeFailure>)> {
    let mut join_set = JoinSet::new();

    for planned in &wave {
      let planned = planned.clone();
      let fetcher = self.fetcher.clone();
      let tool = self.tool.clone();
      let registry = self.registry.clone();
      let config = self.config.clone();
      let semaphore = semaphore.clone();

      join_set.spawn(async move {
        // A closed semaphore only means no limit is enforced.
        let _permit = semaphore.acquire_owned().await.ok();
        let ctx = Collaborators {
          fetcher: fetcher.as_ref(),
          tool: tool.as_ref(),
          registry: registry.as_ref(),
          config: config.as_ref(),
        };
        let result = run_pipeline(&ctx, &planned).await;
        (planned.reference.clone(), result)
      });
    }

    let mut results = Vec::new();
    while let Some(joined) = join_set.join_next().await {
      match joined {
        Ok(result) => results.push(result),
        Err(e) => error!(error = %e, "recipe task panicked"),
      }
    }

    for planned in wave {
      if !results.iter().any(|(reference, _)| *reference == planned.reference) {
        let failure = RecipeFailure::new(
          &planned.reference,
          Stage::Build,
          StageError::Task("the pipeline task panicked".to_string()),
        );
        results.push((planned.reference.clone(), Err(failure)));
      }
    }

    results
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::build::BuildStep;
  use crate::collect::ArtifactRule;
  use crate::recipe::{DependencyKind, OptionDecl, Requirement};
  use crate::store::paths::StorePaths;
  use crate::util::testutil::{FakeBuildTool, FakeFetcher, recipe_fixture, settings_fixture};
  use std::fs;
  use std::path::Path;
  use tempfile::TempDir;

  fn config(store: &Path) -> EngineConfig {
    let mut config = EngineConfig::new(StorePaths::new(store));
    config.settings = settings_fixture();
    config.parallelism = 2;
    config
  }

  fn requiring(mut recipe: Recipe, reference: &str) -> Recipe {
    recipe.requires.push(Requirement {
      reference: reference.parse().unwrap(),
      kind: DependencyKind::Link,
    });
    recipe
  }

  fn imgui() -> Recipe {
    recipe_fixture("imgui", "1.77.docking.3d4af15")
  }

  fn node_editor() -> Recipe {
    requiring(
      recipe_fixture("imgui_node_editor", "0.1.cf3a1c3"),
      "imgui/1.77.docking.3d4af15@wip",
    )
  }

  fn book(recipes: Vec<Recipe>) -> RecipeBook {
    let mut book = RecipeBook::new();
    for recipe in recipes {
      book.insert(recipe).unwrap();
    }
    book
  }

  fn engine(
    temp: &TempDir,
    recipes: Vec<Recipe>,
    fetcher: FakeFetcher,
    tool: FakeBuildTool,
  ) -> Engine<FakeFetcher, FakeBuildTool> {
    Engine::with_collaborators(book(recipes), config(temp.path()), fetcher, tool)
  }

  #[tokio::test]
  async fn node_editor_requires_imgui_resolved_first() {
    let temp = TempDir::new().unwrap();
    let engine = engine(
      &temp,
      vec![imgui(), node_editor()],
      FakeFetcher::default(),
      FakeBuildTool::default(),
    );

    let err = engine
      .resolve("imgui_node_editor", "0.1.cf3a1c3", "wip", &Overrides::new())
      .await
      .unwrap_err();
    match err {
      ExecuteError::Failed(failure) => {
        assert_eq!(failure.stage, Stage::Dependencies);
        assert!(matches!(
          failure.source,
          StageError::Dependency(DependencyResolutionError::Missing { .. })
        ));
      }
      other => panic!("expected a dependency failure, got {:?}", other),
    }
    assert!(!temp.path().join("work").exists());

    engine
      .resolve("imgui", "1.77.docking.3d4af15", "wip", &Overrides::new())
      .await
      .unwrap();
    let info = engine
      .resolve("imgui_node_editor", "0.1.cf3a1c3", "wip", &Overrides::new())
      .await
      .unwrap();

    assert!(info.libs.contains(&"imgui_node_editor".to_string()));
    assert!(info.lib_dirs[0].join("libimgui_node_editor.a").exists());
    assert_eq!(info.requires, vec!["imgui/1.77.docking.3d4af15@wip".parse::<PackageRef>().unwrap()]);
  }

  #[tokio::test]
  async fn second_resolution_is_a_cache_hit() {
    let temp = TempDir::new().unwrap();
    let fetcher = FakeFetcher::default();
    let tool = FakeBuildTool::default();

    let first = engine(&temp, vec![imgui()], fetcher.clone(), tool.clone())
      .resolve("imgui", "1.77.docking.3d4af15", "wip", &Overrides::new())
      .await
      .unwrap();
    let fetches = fetcher.calls().len();
    let steps = tool.steps().len();

    // A fresh engine only has the store in common with the first one.
    let second = engine(&temp, vec![imgui()], fetcher.clone(), tool.clone())
      .resolve("imgui", "1.77.docking.3d4af15", "wip", &Overrides::new())
      .await
      .unwrap();

    assert_eq!(fetcher.calls().len(), fetches);
    assert_eq!(tool.steps().len(), steps);
    assert_eq!(
      serde_json::to_vec(first.as_ref()).unwrap(),
      serde_json::to_vec(second.as_ref()).unwrap()
    );
  }

  fn bundled(name: &str) -> Recipe {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
      .join("../../recipes")
      .join(name)
      .join(crate::consts::RECIPE_FILE);
    crate::recipe::lua::load_recipe(&path).unwrap()
  }

  #[tokio::test]
  async fn bundled_node_editor_links_what_its_build_installed() {
    let temp = TempDir::new().unwrap();
    let engine = engine(
      &temp,
      vec![bundled("imgui"), bundled("imgui_node_editor")],
      FakeFetcher::default(),
      FakeBuildTool::default(),
    );

    let imgui = engine
      .resolve("imgui", "1.77.docking.3d4af15", "wip", &Overrides::new())
      .await
      .unwrap();
    assert_eq!(imgui.libs, vec!["imgui"]);

    let editor = engine
      .resolve("imgui_node_editor", "0.9.cf3a1c3", "stable", &Overrides::new())
      .await
      .unwrap();
    assert_eq!(editor.libs, vec!["imgui_node_editor"]);
    assert!(editor.lib_dirs[0].join("libimgui_node_editor.a").is_file());
    assert_eq!(editor.requires, vec![imgui.reference.clone()]);
  }

  #[tokio::test]
  async fn each_configuration_resolves_to_its_own_package() {
    let temp = TempDir::new().unwrap();
    let mut recipe = imgui();
    recipe.options.insert(
      "shared".to_string(),
      OptionDecl {
        values: vec![true.into(), false.into()],
        default: false.into(),
      },
    );
    let tool = FakeBuildTool::default();
    let engine = engine(&temp, vec![recipe], FakeFetcher::default(), tool.clone());
    let reference: PackageRef = "imgui/1.77.docking.3d4af15@wip".parse().unwrap();

    let static_build = engine
      .resolve("imgui", "1.77.docking.3d4af15", "wip", &Overrides::new())
      .await
      .unwrap();
    let shared_build = engine
      .resolve(
        "imgui",
        "1.77.docking.3d4af15",
        "wip",
        &Overrides::new().with_option("shared", true),
      )
      .await
      .unwrap();

    assert_ne!(static_build.root, shared_build.root);
    assert_eq!(tool.installed().len(), 2);
    assert_eq!(engine.registry().lookup(&reference).unwrap().unwrap().root, shared_build.root);

    let again = engine
      .resolve("imgui", "1.77.docking.3d4af15", "wip", &Overrides::new())
      .await
      .unwrap();
    assert_eq!(again.root, static_build.root);
    assert_eq!(tool.installed().len(), 2);
    assert_eq!(engine.registry().lookup(&reference).unwrap().unwrap().root, static_build.root);
  }

  #[tokio::test]
  async fn tampered_package_is_rebuilt() {
    let temp = TempDir::new().unwrap();
    let tool = FakeBuildTool::default();
    let engine_a = engine(&temp, vec![imgui()], FakeFetcher::default(), tool.clone());
    let info = engine_a
      .resolve("imgui", "1.77.docking.3d4af15", "wip", &Overrides::new())
      .await
      .unwrap();
    fs::write(info.root.join("lib/stray.txt"), "x").unwrap();

    let engine_b = engine(&temp, vec![imgui()], FakeFetcher::default(), tool.clone());
    engine_b
      .resolve("imgui", "1.77.docking.3d4af15", "wip", &Overrides::new())
      .await
      .unwrap();

    assert_eq!(tool.steps().iter().filter(|s| *s == "install").count(), 2);
    assert!(!info.root.join("lib/stray.txt").exists());
  }

  #[tokio::test]
  async fn invalid_option_fails_without_touching_the_store() {
    let temp = TempDir::new().unwrap();
    let store = temp.path().join("store");
    let mut recipe = recipe_fixture("libucl", "0.8.1");
    recipe.options.insert(
      "shared".to_string(),
      OptionDecl {
        values: vec![true.into(), false.into()],
        default: false.into(),
      },
    );
    let fetcher = FakeFetcher::default();
    let engine = Engine::with_collaborators(book(vec![recipe]), config(&store), fetcher.clone(), FakeBuildTool::default());

    let overrides = Overrides::new().with_option("shared", "maybe");
    let err = engine.resolve("libucl", "0.8.1", "stable", &overrides).await.unwrap_err();

    match err {
      ExecuteError::Failed(failure) => assert_eq!(failure.stage, Stage::Options),
      other => panic!("expected an options failure, got {:?}", other),
    }
    assert!(!store.exists());
    assert!(fetcher.calls().is_empty());
  }

  #[tokio::test]
  async fn execute_orders_dependencies_before_dependents() {
    let temp = TempDir::new().unwrap();
    let tool = FakeBuildTool::default();
    let engine = engine(&temp, vec![imgui(), node_editor()], FakeFetcher::default(), tool.clone());

    let request = Request::parse("imgui_node_editor/0.1.cf3a1c3@wip").unwrap();
    let plan = engine.plan(std::slice::from_ref(&request), true).unwrap();
    assert_eq!(
      plan.waves(),
      vec![
        vec!["imgui/1.77.docking.3d4af15@wip".parse::<PackageRef>().unwrap()],
        vec!["imgui_node_editor/0.1.cf3a1c3@wip".parse::<PackageRef>().unwrap()],
      ]
    );

    let report = engine.execute(&[request], true).await.unwrap();
    assert!(report.is_success(), "{:?}", report.failed);
    assert_eq!(report.resolved.len(), 2);

    let installs = tool.installed();
    assert_eq!(installs.len(), 2);
    assert!(installs[0].starts_with("imgui-"));
    assert!(installs[1].starts_with("imgui_node_editor-"));

    let configures = tool.prefix_paths();
    let editor_prefix = configures.last().unwrap();
    assert_eq!(editor_prefix.len(), 1);
    assert_eq!(editor_prefix[0], report.resolved.values().next().unwrap().root);
  }

  #[tokio::test]
  async fn failed_dependency_skips_dependents_with_root_cause() {
    let temp = TempDir::new().unwrap();
    let viewer = requiring(
      recipe_fixture("viewer", "1.0"),
      "imgui_node_editor/0.1.cf3a1c3@wip",
    );
    let mut other = recipe_fixture("libnoise", "1.0.0");
    other.package = vec![ArtifactRule::new("*.h", ".", "include")];
    let engine = engine(
      &temp,
      vec![imgui(), node_editor(), viewer, other],
      FakeFetcher::default(),
      FakeBuildTool::failing_for("imgui", BuildStep::Build),
    );

    let requests = [
      Request::parse("viewer/1.0@wip").unwrap(),
      Request::parse("libnoise/1.0.0").unwrap(),
    ];
    let report = engine.execute(&requests, true).await.unwrap();

    let imgui_ref: PackageRef = "imgui/1.77.docking.3d4af15@wip".parse().unwrap();
    assert_eq!(report.failed[&imgui_ref].stage, Stage::Build);
    assert!(report.failed[&imgui_ref].diagnostics().is_some());

    let viewer_ref: PackageRef = "viewer/1.0@wip".parse().unwrap();
    match &report.failed[&viewer_ref].source {
      StageError::Dependency(DependencyResolutionError::UpstreamFailed { dependency, root, .. }) => {
        assert_eq!(dependency.name, "imgui_node_editor");
        assert_eq!(root, &imgui_ref);
      }
      other => panic!("expected an upstream failure, got {:?}", other),
    }
    assert!(report.resolved.contains_key(&"libnoise/1.0.0@stable".parse::<PackageRef>().unwrap()));
  }

  #[tokio::test]
  async fn cancellation_stops_further_waves() {
    let temp = TempDir::new().unwrap();
    let engine = engine(
      &temp,
      vec![imgui(), node_editor()],
      FakeFetcher::default(),
      FakeBuildTool::default(),
    );
    engine.cancel_handle().cancel();

    let report = engine
      .execute(&[Request::parse("imgui_node_editor/0.1.cf3a1c3@wip").unwrap()], true)
      .await
      .unwrap();
    assert!(report.resolved.is_empty());
    assert_eq!(report.cancelled.len(), 2);
    assert!(!report.is_success());
  }

  #[tokio::test]
  async fn cycles_are_rejected_before_running() {
    let temp = TempDir::new().unwrap();
    let a = requiring(recipe_fixture("a", "1.0"), "b/1.0@stable");
    let b = requiring(recipe_fixture("b", "1.0"), "a/1.0@stable");
    let fetcher = FakeFetcher::default();
    let engine = engine(&temp, vec![a, b], fetcher.clone(), FakeBuildTool::default());

    let err = engine.execute(&[Request::parse("a/1.0").unwrap()], true).await.unwrap_err();
    assert!(matches!(err, ExecuteError::Dependency(DependencyResolutionError::Cycle(_))));
    assert!(fetcher.calls().is_empty());
  }

  #[tokio::test]
  async fn unknown_recipe_is_a_recipe_error() {
    let temp = TempDir::new().unwrap();
    let engine = engine(&temp, vec![imgui()], FakeFetcher::default(), FakeBuildTool::default());
    let err = engine.plan(&[Request::new("rttr")], false).unwrap_err();
    assert!(matches!(err, ExecuteError::Recipe(_)));
  }
}
