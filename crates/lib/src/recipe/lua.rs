//! Loading recipes from Lua.
//!
//! A recipe file returns a table. Before it runs, the `pinforge` global is
//! registered with the host platform (`pinforge.os`, `pinforge.arch`,
//! `pinforge.platform`) and the recipe's own directory (`pinforge.dir`), so a
//! recipe may branch on the host when computing its fields.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use mlua::prelude::*;

use crate::collect::{ArtifactRule, CollisionPolicy, RootSelector};
use crate::export::{ExportSpec, Generator};
use crate::platform::{host_arch, host_os, host_platform};
use crate::recipe::RecipeError;
use crate::recipe::reference::{DependencyKind, PackageRef, Requirement};
use crate::recipe::types::{
  BuildSpec, DefinitionRule, OptionDecl, OptionValue, PatchSpec, Recipe, Revision, SettingAxis, SourceOrigin,
  SourceSpec, ValueRef,
};
use crate::recipe::version::{ComponentPin, Version};

/// Create a Lua runtime with the `pinforge` global registered.
pub fn create_runtime(recipe_dir: &Path) -> LuaResult<Lua> {
  let lua = Lua::new();
  let pinforge = lua.create_table()?;

  pinforge.set("platform", host_platform())?;
  pinforge.set("os", host_os())?;
  pinforge.set("arch", host_arch())?;
  pinforge.set("dir", recipe_dir.to_string_lossy().to_string())?;

  lua.globals().set("pinforge", pinforge)?;
  Ok(lua)
}

/// Evaluate and validate the recipe file at `path`.
pub fn load_recipe(path: &Path) -> Result<Recipe, RecipeError> {
  let canonical = dunce::canonicalize(path).map_err(|source| RecipeError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  let content = std::fs::read_to_string(&canonical).map_err(|source| RecipeError::Read {
    path: canonical.clone(),
    source,
  })?;
  let recipe_dir = canonical.parent().unwrap_or(Path::new(".")).to_path_buf();

  let lua_err = |e: LuaError| RecipeError::Lua {
    path: canonical.clone(),
    message: e.to_string(),
  };
  let lua = create_runtime(&recipe_dir).map_err(lua_err)?;
  let value = lua
    .load(&content)
    .set_name(format!("@{}", canonical.display()))
    .eval::<LuaValue>()
    .map_err(lua_err)?;

  let invalid_recipe = |message: String| RecipeError::Invalid {
    path: canonical.clone(),
    message,
  };
  let table = match value {
    LuaValue::Table(table) => table,
    other => return Err(invalid_recipe(format!("recipe must return a table, got {}", other.type_name()))),
  };

  let recipe = parse_recipe(&table, recipe_dir).map_err(|e| invalid_recipe(e.to_string()))?;
  recipe.validate().map_err(invalid_recipe)?;
  Ok(recipe)
}

fn invalid(message: impl Into<String>) -> LuaError {
  LuaError::external(message.into())
}

/// Parse the table a recipe file returns.
pub fn parse_recipe(t: &LuaTable, recipe_dir: PathBuf) -> LuaResult<Recipe> {
  let name: String = t
    .get::<Option<String>>("name")?
    .ok_or_else(|| invalid("missing required field 'name'"))?;

  let sources = match t.get::<LuaValue>("sources")? {
    LuaValue::Table(list) => list
      .sequence_values::<LuaTable>()
      .map(|entry| parse_source(&entry?, &name))
      .collect::<LuaResult<Vec<_>>>()?,
    LuaValue::Nil => return Err(invalid("missing required field 'sources'")),
    other => return Err(invalid(format!("'sources' must be a list, got {}", other.type_name()))),
  };

  let version = parse_version(t.get::<LuaValue>("version")?, &sources)?;

  let settings = string_list(t, "settings")?
    .iter()
    .map(|s| SettingAxis::from_str(s).map_err(invalid))
    .collect::<LuaResult<Vec<_>>>()?;

  let generators = string_list(t, "generators")?
    .iter()
    .map(|s| Generator::from_str(s).map_err(invalid))
    .collect::<LuaResult<Vec<_>>>()?;

  let mut options = BTreeMap::new();
  if let Some(table) = t.get::<Option<LuaTable>>("options")? {
    for pair in table.pairs::<String, LuaTable>() {
      let (option, decl) = pair?;
      options.insert(option.clone(), parse_option(&option, &decl)?);
    }
  }

  let mut definitions = BTreeMap::new();
  if let Some(table) = t.get::<Option<LuaTable>>("definitions")? {
    for pair in table.pairs::<String, LuaValue>() {
      let (key, rule) = pair?;
      let rule = parse_definition(&key, rule)?;
      definitions.insert(key, rule);
    }
  }

  let build = match t.get::<Option<LuaTable>>("build")? {
    Some(b) => BuildSpec {
      source_folder: b.get::<Option<String>>("source_folder")?.unwrap_or_else(|| ".".to_string()),
      install: b.get::<Option<bool>>("install")?.unwrap_or(true),
    },
    None => BuildSpec::default(),
  };

  let package = match t.get::<Option<LuaTable>>("package")? {
    Some(list) => list
      .sequence_values::<LuaTable>()
      .map(|rule| parse_artifact_rule(&rule?))
      .collect::<LuaResult<Vec<_>>>()?,
    None => Vec::new(),
  };

  let info = match t.get::<Option<LuaTable>>("info")? {
    Some(info) => {
      let defaults = ExportSpec::default();
      ExportSpec {
        include_dirs: optional_string_list(&info, "includedirs")?.unwrap_or(defaults.include_dirs),
        lib_dirs: optional_string_list(&info, "libdirs")?.unwrap_or(defaults.lib_dirs),
        libs: optional_string_list(&info, "libs")?,
      }
    }
    None => ExportSpec::default(),
  };

  let mut requires = Vec::new();
  if let Some(list) = t.get::<Option<LuaTable>>("requires")? {
    for entry in list.sequence_values::<LuaValue>() {
      requires.push(parse_requirement(entry?)?);
    }
  }
  for reference in string_list(t, "build_requires")? {
    requires.push(Requirement {
      reference: parse_reference(&reference)?,
      kind: DependencyKind::Build,
    });
  }

  Ok(Recipe {
    name,
    version,
    license: t.get("license")?,
    url: t.get("url")?,
    description: t.get("description")?,
    topics: string_list(t, "topics")?,
    settings,
    options,
    definitions,
    generators,
    exports: string_list(t, "exports")?,
    sources,
    build,
    package,
    info,
    requires,
    recipe_dir,
  })
}

fn parse_version(value: LuaValue, sources: &[SourceSpec]) -> LuaResult<Version> {
  match value {
    LuaValue::String(s) => Ok(Version::literal(&s.to_str()?)),
    LuaValue::Integer(i) => Ok(Version::literal(&i.to_string())),
    LuaValue::Number(n) => Ok(Version::literal(&n.to_string())),
    LuaValue::Table(t) => {
      let base: String = t
        .get::<Option<String>>("base")?
        .ok_or_else(|| invalid("composite version requires 'base'"))?;
      let mut pins = Vec::new();
      for pin in string_list(&t, "pins")? {
        let source = sources
          .iter()
          .find(|s| s.name == pin)
          .ok_or_else(|| invalid(format!("version pin '{}' does not name a declared source", pin)))?;
        let SourceOrigin::Git { rev, .. } = &source.origin else {
          return Err(invalid(format!("version pin '{}' must name a git source", pin)));
        };
        pins.push(ComponentPin {
          name: pin,
          rev: rev.label().to_string(),
        });
      }
      if pins.is_empty() {
        return Err(invalid("composite version requires at least one pin"));
      }
      Ok(Version::Composite { base, pins })
    }
    LuaValue::Nil => Err(invalid("missing required field 'version'")),
    other => Err(invalid(format!("'version' must be a string or table, got {}", other.type_name()))),
  }
}

fn parse_source(t: &LuaTable, recipe_name: &str) -> LuaResult<SourceSpec> {
  let dest: String = t.get::<Option<String>>("dest")?.unwrap_or_else(|| ".".to_string());
  let name = match t.get::<Option<String>>("name")? {
    Some(name) => name,
    None => Path::new(&dest)
      .file_name()
      .map(|n| n.to_string_lossy().to_string())
      .unwrap_or_else(|| recipe_name.to_string()),
  };

  let git: Option<String> = t.get("git")?;
  let url: Option<String> = t.get("url")?;
  let origin = match (git, url) {
    (Some(url), None) => {
      let rev: String = t
        .get::<Option<String>>("rev")?
        .ok_or_else(|| invalid(format!("git source '{}' requires an exact 'rev'", name)))?;
      SourceOrigin::Git {
        url,
        rev: Revision::parse(&rev).map_err(|e| invalid(format!("source '{}': {}", name, e)))?,
        recursive: t.get::<Option<bool>>("recursive")?.unwrap_or(true),
      }
    }
    (None, Some(url)) => SourceOrigin::Archive {
      url,
      sha256: t.get::<Option<String>>("sha256")?.map(|s| s.to_ascii_lowercase()),
      strip_components: t.get::<Option<usize>>("strip_components")?.unwrap_or(0),
    },
    (Some(_), Some(_)) => return Err(invalid(format!("source '{}' sets both 'git' and 'url'", name))),
    (None, None) => return Err(invalid(format!("source '{}' needs either 'git' or 'url'", name))),
  };

  let mut patches = Vec::new();
  if let Some(list) = t.get::<Option<LuaTable>>("patches")? {
    for entry in list.sequence_values::<LuaValue>() {
      patches.push(match entry? {
        LuaValue::String(file) => PatchSpec {
          file: PathBuf::from(file.to_str()?.to_string()),
          base: None,
          strip: 1,
        },
        LuaValue::Table(p) => PatchSpec {
          file: PathBuf::from(
            p.get::<Option<String>>("file")?
              .ok_or_else(|| invalid(format!("patch in source '{}' requires 'file'", name)))?,
          ),
          base: p.get("base")?,
          strip: p.get::<Option<u32>>("strip")?.unwrap_or(1),
        },
        other => {
          return Err(invalid(format!(
            "patch in source '{}' must be a string or table, got {}",
            name,
            other.type_name()
          )));
        }
      });
    }
  }

  Ok(SourceSpec {
    name,
    dest,
    origin,
    patches,
  })
}

fn parse_option(name: &str, t: &LuaTable) -> LuaResult<OptionDecl> {
  let values = match t.get::<Option<LuaTable>>("values")? {
    Some(list) => list
      .sequence_values::<LuaValue>()
      .map(|v| to_option_value(v?))
      .collect::<LuaResult<Vec<_>>>()?,
    None => return Err(invalid(format!("option '{}' requires 'values'", name))),
  };
  let default = match t.get::<LuaValue>("default")? {
    LuaValue::Nil => return Err(invalid(format!("option '{}' requires 'default'", name))),
    value => to_option_value(value)?,
  };
  Ok(OptionDecl { values, default })
}

fn to_option_value(value: LuaValue) -> LuaResult<OptionValue> {
  match value {
    LuaValue::Boolean(b) => Ok(OptionValue::Bool(b)),
    LuaValue::Integer(i) => Ok(OptionValue::Int(i)),
    LuaValue::Number(n) if n.fract() == 0.0 => Ok(OptionValue::Int(n as i64)),
    LuaValue::String(s) => Ok(OptionValue::Str(s.to_str()?.to_string())),
    other => Err(invalid(format!(
      "option values must be booleans, integers or strings, got {}",
      other.type_name()
    ))),
  }
}

fn parse_definition(key: &str, value: LuaValue) -> LuaResult<DefinitionRule> {
  match value {
    LuaValue::String(s) => Ok(DefinitionRule::Constant(s.to_str()?.to_string())),
    LuaValue::Integer(i) => Ok(DefinitionRule::Constant(i.to_string())),
    LuaValue::Boolean(b) => Ok(DefinitionRule::Constant(if b { "ON" } else { "OFF" }.to_string())),
    LuaValue::Table(t) => {
      let option: Option<String> = t.get("option")?;
      let setting: Option<String> = t.get("setting")?;
      let from = match (option, setting) {
        (Some(option), None) => ValueRef::Option(option),
        (None, Some(setting)) => ValueRef::Setting(setting),
        _ => {
          return Err(invalid(format!(
            "definition '{}' must reference exactly one of 'option' or 'setting'",
            key
          )));
        }
      };
      let map = match t.get::<Option<LuaTable>>("map")? {
        Some(m) => {
          let mut map = BTreeMap::new();
          for pair in m.pairs::<LuaValue, String>() {
            let (k, v) = pair?;
            map.insert(to_option_value(k)?.canonical(), v);
          }
          Some(map)
        }
        None => None,
      };
      Ok(DefinitionRule::Mapped { from, map })
    }
    other => Err(invalid(format!(
      "definition '{}' must be a string or table, got {}",
      key,
      other.type_name()
    ))),
  }
}

fn parse_artifact_rule(t: &LuaTable) -> LuaResult<ArtifactRule> {
  let pattern: String = t
    .get::<Option<String>>("pattern")?
    .ok_or_else(|| invalid("package rule requires 'pattern'"))?;
  let root = match t.get::<Option<String>>("root")? {
    Some(root) => RootSelector::from_str(&root).map_err(invalid)?,
    None => RootSelector::Any,
  };
  let collision = match t.get::<Option<String>>("collision")? {
    Some(policy) => Some(CollisionPolicy::from_str(&policy).map_err(invalid)?),
    None => None,
  };
  Ok(ArtifactRule {
    pattern,
    src: t.get::<Option<String>>("src")?.unwrap_or_else(|| ".".to_string()),
    dst: t.get::<Option<String>>("dst")?.unwrap_or_else(|| ".".to_string()),
    keep_path: t.get::<Option<bool>>("keep_path")?.unwrap_or(true),
    excludes: string_list(t, "excludes")?,
    required: t.get::<Option<bool>>("required")?.unwrap_or(false),
    root,
    collision,
  })
}

fn parse_requirement(value: LuaValue) -> LuaResult<Requirement> {
  match value {
    LuaValue::String(s) => Ok(Requirement {
      reference: parse_reference(&s.to_str()?)?,
      kind: DependencyKind::Link,
    }),
    LuaValue::Table(t) => {
      let reference: String = t
        .get::<Option<String>>("ref")?
        .ok_or_else(|| invalid("requirement table requires 'ref'"))?;
      let kind = match t.get::<Option<String>>("kind")?.as_deref() {
        None | Some("link") => DependencyKind::Link,
        Some("build") => DependencyKind::Build,
        Some(other) => return Err(invalid(format!("unknown requirement kind '{}'", other))),
      };
      Ok(Requirement {
        reference: parse_reference(&reference)?,
        kind,
      })
    }
    other => Err(invalid(format!(
      "requirement must be a string or table, got {}",
      other.type_name()
    ))),
  }
}

fn parse_reference(raw: &str) -> LuaResult<PackageRef> {
  raw.parse().map_err(|e: crate::recipe::reference::ReferenceError| invalid(e.to_string()))
}

/// A string or list of strings; absent means empty.
fn string_list(t: &LuaTable, key: &str) -> LuaResult<Vec<String>> {
  Ok(optional_string_list(t, key)?.unwrap_or_default())
}

fn optional_string_list(t: &LuaTable, key: &str) -> LuaResult<Option<Vec<String>>> {
  match t.get::<LuaValue>(key)? {
    LuaValue::Nil => Ok(None),
    LuaValue::String(s) => Ok(Some(vec![s.to_str()?.to_string()])),
    LuaValue::Table(list) => Ok(Some(list.sequence_values::<String>().collect::<LuaResult<Vec<_>>>()?)),
    other => Err(invalid(format!(
      "'{}' must be a string or list of strings, got {}",
      key,
      other.type_name()
    ))),
  }
}
