//! Consumer-facing build descriptions written next to `package.json`.

use std::fmt;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::export::PackageInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Generator {
  /// `pinforge-<name>.cmake` defining `<name>_*` variables.
  Cmake,
  /// `Find<name>.cmake` defining variables and a `<name>::<name>` target.
  CmakeFindPackage,
}

impl FromStr for Generator {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "cmake" => Ok(Generator::Cmake),
      "cmake_find_package" => Ok(Generator::CmakeFindPackage),
      other => Err(format!(
        "unknown generator '{}' (expected cmake or cmake_find_package)",
        other
      )),
    }
  }
}

impl fmt::Display for Generator {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Generator::Cmake => "cmake",
      Generator::CmakeFindPackage => "cmake_find_package",
    })
  }
}

impl Generator {
  pub fn file_name(&self, name: &str) -> String {
    match self {
      Generator::Cmake => format!("pinforge-{}.cmake", name),
      Generator::CmakeFindPackage => format!("Find{}.cmake", name),
    }
  }

  pub fn render(&self, info: &PackageInfo) -> String {
    match self {
      Generator::Cmake => render_variables(info),
      Generator::CmakeFindPackage => render_find_package(info),
    }
  }
}

/// Write every generator's file into `package_dir`.
pub fn write_generators(
  generators: &[Generator],
  info: &PackageInfo,
  package_dir: &Path,
) -> std::io::Result<Vec<PathBuf>> {
  let mut written = Vec::new();
  for generator in generators {
    let path = package_dir.join(generator.file_name(&info.reference.name));
    std::fs::write(&path, generator.render(info))?;
    written.push(path);
  }
  Ok(written)
}

fn cmake_path(path: &Path) -> String {
  path.to_string_lossy().replace('\\', "/")
}

fn cmake_list<'a>(items: impl Iterator<Item = &'a str>) -> String {
  items.map(|item| format!("\"{}\"", item)).collect::<Vec<_>>().join(" ")
}

fn render_variables(info: &PackageInfo) -> String {
  let name = &info.reference.name;
  let includes: Vec<String> = info.include_dirs.iter().map(|p| cmake_path(p)).collect();
  let lib_dirs: Vec<String> = info.lib_dirs.iter().map(|p| cmake_path(p)).collect();

  let mut out = String::new();
  let _ = writeln!(out, "# {}", info.reference);
  let _ = writeln!(out, "set({}_ROOT \"{}\")", name, cmake_path(&info.root));
  let _ = writeln!(
    out,
    "set({}_INCLUDE_DIRS {})",
    name,
    cmake_list(includes.iter().map(String::as_str))
  );
  let _ = writeln!(
    out,
    "set({}_LIB_DIRS {})",
    name,
    cmake_list(lib_dirs.iter().map(String::as_str))
  );
  let _ = writeln!(
    out,
    "set({}_LIBRARIES {})",
    name,
    cmake_list(info.libs.iter().map(String::as_str))
  );
  out
}

fn render_find_package(info: &PackageInfo) -> String {
  let name = &info.reference.name;
  let mut out = render_variables(info);

  for dependency in &info.requires {
    let _ = writeln!(out, "find_package({} REQUIRED)", dependency.name);
  }

  let _ = writeln!(out, "set({}_FOUND TRUE)", name);
  let _ = writeln!(out, "if(NOT TARGET {0}::{0})", name);
  let _ = writeln!(out, "  add_library({0}::{0} INTERFACE IMPORTED)", name);
  let _ = writeln!(out, "  set_target_properties({0}::{0} PROPERTIES", name);
  let _ = writeln!(out, "    INTERFACE_INCLUDE_DIRECTORIES \"${{{}_INCLUDE_DIRS}}\"", name);
  let _ = writeln!(out, "    INTERFACE_LINK_DIRECTORIES \"${{{}_LIB_DIRS}}\"", name);
  let mut link = format!("${{{}_LIBRARIES}}", name);
  for dependency in &info.requires {
    link.push_str(&format!(";{0}::{0}", dependency.name));
  }
  let _ = writeln!(out, "    INTERFACE_LINK_LIBRARIES \"{}\")", link);
  let _ = writeln!(out, "endif()");
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  fn info() -> PackageInfo {
    PackageInfo {
      reference: "imgui_node_editor/0.1.cf3a1c3@wip".parse().unwrap(),
      root: PathBuf::from("/store/pkg/imgui_node_editor-abc"),
      include_dirs: vec![PathBuf::from("/store/pkg/imgui_node_editor-abc/include")],
      lib_dirs: vec![PathBuf::from("/store/pkg/imgui_node_editor-abc/lib")],
      libs: vec!["imgui_node_editor".to_string()],
      requires: vec!["imgui/1.77.docking.3d4af15@wip".parse().unwrap()],
    }
  }

  #[test]
  fn variables_file_lists_paths_and_libraries() {
    let rendered = Generator::Cmake.render(&info());
    assert!(rendered.contains("set(imgui_node_editor_ROOT \"/store/pkg/imgui_node_editor-abc\")"));
    assert!(rendered.contains("set(imgui_node_editor_LIBRARIES \"imgui_node_editor\")"));
  }

  #[test]
  fn find_module_declares_target_and_dependencies() {
    let rendered = Generator::CmakeFindPackage.render(&info());
    assert!(rendered.contains("find_package(imgui REQUIRED)"));
    assert!(rendered.contains("add_library(imgui_node_editor::imgui_node_editor INTERFACE IMPORTED)"));
    assert!(rendered.contains("INTERFACE_LINK_LIBRARIES \"${imgui_node_editor_LIBRARIES};imgui::imgui\")"));
    assert_eq!(
      Generator::CmakeFindPackage.file_name("imgui_node_editor"),
      "Findimgui_node_editor.cmake"
    );
  }

  #[test]
  fn generators_parse_by_name() {
    assert_eq!("cmake_find_package".parse::<Generator>().unwrap(), Generator::CmakeFindPackage);
    assert!("premake".parse::<Generator>().is_err());
  }
}
