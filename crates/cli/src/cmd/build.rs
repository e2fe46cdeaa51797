//! Implementation of the `pinforge build` command.
//!
//! Plans the requested recipes, runs them wave by wave and prints a summary.
//! Ctrl-C stops scheduling further recipes; running builds finish first.

use std::time::Instant;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::warn;

use pinforge_lib::collect::CollisionPolicy;
use pinforge_lib::execute::{Engine, ExecutionReport};

use super::{GlobalArgs, parse_overrides, parse_requests, report_failure};
use crate::output::{OutputFormat, format_elapsed, print_json, print_stat, print_success, print_warning};

#[derive(Debug, Clone)]
pub struct BuildArgs {
  pub requests: Vec<String>,
  pub with_deps: bool,
  pub jobs: Option<usize>,
  pub collision: Option<CollisionPolicy>,
  pub options: Vec<String>,
  pub settings: Vec<String>,
}

#[derive(Debug, Serialize)]
struct BuildSummary {
  resolved: Vec<ResolvedEntry>,
  failed: Vec<FailedEntry>,
  cancelled: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ResolvedEntry {
  reference: String,
  root: String,
  cached: bool,
  libs: Vec<String>,
}

#[derive(Debug, Serialize)]
struct FailedEntry {
  reference: String,
  stage: String,
  error: String,
  root_cause: String,
}

impl BuildSummary {
  fn from_report(report: &ExecutionReport) -> Self {
    Self {
      resolved: report
        .resolved
        .iter()
        .map(|(reference, info)| ResolvedEntry {
          reference: reference.to_string(),
          root: info.root.display().to_string(),
          cached: report.cached.contains(reference),
          libs: info.libs.clone(),
        })
        .collect(),
      failed: report
        .failed
        .iter()
        .map(|(reference, failure)| FailedEntry {
          reference: reference.to_string(),
          stage: failure.stage.to_string(),
          error: failure.source.to_string(),
          root_cause: failure.root_cause().0.to_string(),
        })
        .collect(),
      cancelled: report.cancelled.iter().map(ToString::to_string).collect(),
    }
  }
}

pub fn cmd_build(global: &GlobalArgs, args: BuildArgs, output: OutputFormat) -> Result<()> {
  let overrides = parse_overrides(&args.options, &args.settings)?;
  let requests = parse_requests(&args.requests, &overrides)?;

  let mut config = global.engine_config();
  if let Some(jobs) = args.jobs {
    config.parallelism = jobs.max(1);
  }
  if let Some(policy) = args.collision {
    config.collision_policy = policy;
  }
  let engine = Engine::new(global.recipe_book()?, config);

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let started = Instant::now();
  let report = rt.block_on(async {
    let cancel = engine.cancel_handle();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupted; no further recipes will be scheduled");
        cancel.cancel();
      }
    });
    engine.execute(&requests, args.with_deps).await
  })?;

  if output.is_json() {
    print_json(&BuildSummary::from_report(&report))?;
  } else {
    for (reference, info) in &report.resolved {
      if report.cached.contains(reference) {
        print_success(&format!("{} (cached)", reference));
      } else {
        print_success(&reference.to_string());
      }
      if global.verbose {
        super::resolve::print_package(info);
      }
    }
    for failure in report.failed.values() {
      report_failure(failure, global.verbose);
    }
    for reference in &report.cancelled {
      print_warning(&format!("{} cancelled", reference));
    }

    println!();
    print_stat("Built", &(report.resolved.len() - report.cached.len()).to_string());
    print_stat("Cached", &report.cached.len().to_string());
    print_stat("Failed", &report.failed.len().to_string());
    print_stat("Elapsed", &format_elapsed(started.elapsed()));
  }

  if !report.is_success() {
    bail!(
      "{} of {} recipes did not complete",
      report.failed.len() + report.cancelled.len(),
      report.total()
    );
  }
  Ok(())
}
