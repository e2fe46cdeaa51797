//! Names and sizes shared across the engine.

pub const APP_NAME: &str = "pinforge";

/// Length of the truncated hex digest used in store directory names.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// File every recipe directory in a recipe book must contain.
pub const RECIPE_FILE: &str = "recipe.lua";

/// Cache manifest written last into a finished package directory.
pub const MANIFEST_MARKER: &str = ".pinforge-manifest.json";

/// Consumer-facing export written into every package directory.
pub const PACKAGE_INFO_FILE: &str = "package.json";

/// Stamp recording which archive populated a source destination.
pub const SOURCE_STAMP: &str = ".pinforge-source";

/// Channel used when a reference omits `@channel`.
pub const DEFAULT_CHANNEL: &str = "stable";
