//! pinforge-lib: the recipe engine behind pinforge.
//!
//! A recipe pins a native library at an exact revision, declares its build
//! options, and describes how to repackage the build output. This crate runs
//! recipes:
//! - `recipe`: loading Lua recipes into a recipe book
//! - `options`: validating overrides into a `BuildConfiguration`
//! - `source`: fetching pinned sources
//! - `build`: driving the native build tool
//! - `collect` and `export`: normalizing the package layout and describing it
//! - `resolve` and `execute`: ordering recipes and running their pipelines

pub mod build;
pub mod collect;
pub mod consts;
pub mod execute;
pub mod export;
pub mod options;
pub mod platform;
pub mod recipe;
pub mod resolve;
pub mod source;
pub mod store;
pub mod util;
