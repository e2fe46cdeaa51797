//! Library-name discovery.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

/// Extensions recognized as linkable libraries.
pub const LIBRARY_EXTENSIONS: [&str; 4] = ["a", "so", "dylib", "lib"];

/// The logical library name for a file, or `None` if it is not a library.
///
/// `libfoo.a`, `libfoo.so`, `libfoo.so.1.2` and `libfoo.dylib` all name
/// `foo`; `foo.lib` names `foo`. A `lib` prefix on a `.lib` file is kept, as
/// MSVC import libraries are linked by their full stem.
pub fn library_name(file_name: &str) -> Option<String> {
  let (stem, extension) = match file_name.find(".so.") {
    Some(idx)
      if file_name[idx + 4..]
        .split('.')
        .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit())) =>
    {
      (&file_name[..idx], "so")
    }
    _ => {
      let (stem, extension) = file_name.rsplit_once('.')?;
      (stem, extension)
    }
  };

  if stem.is_empty() || !LIBRARY_EXTENSIONS.contains(&extension) {
    return None;
  }

  if extension == "lib" {
    return Some(stem.to_string());
  }

  match stem.strip_prefix("lib") {
    Some(name) if !name.is_empty() => Some(name.to_string()),
    _ => Some(stem.to_string()),
  }
}

/// Scan `lib_dirs` non-recursively, in declaration order then lexical order,
/// keeping the first occurrence of each logical name.
pub fn discover_libraries(lib_dirs: &[PathBuf]) -> std::io::Result<Vec<String>> {
  let mut seen = HashSet::new();
  let mut libs = Vec::new();

  for dir in lib_dirs {
    if !dir.is_dir() {
      continue;
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
      let entry = entry?;
      if entry.file_type()?.is_dir() {
        continue;
      }
      names.push(entry.file_name().to_string_lossy().to_string());
    }
    names.sort();

    for name in names {
      if let Some(lib) = library_name(&name)
        && seen.insert(lib.clone())
      {
        libs.push(lib);
      }
    }
  }

  Ok(libs)
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn strips_platform_prefix_and_suffix() {
    assert_eq!(library_name("libimgui_node_editor.a").as_deref(), Some("imgui_node_editor"));
    assert_eq!(library_name("libucl.so").as_deref(), Some("ucl"));
    assert_eq!(library_name("libucl.so.0.8.1").as_deref(), Some("ucl"));
    assert_eq!(library_name("libnoise.dylib").as_deref(), Some("noise"));
    assert_eq!(library_name("rttr_core.lib").as_deref(), Some("rttr_core"));
    assert_eq!(library_name("libcpgf.lib").as_deref(), Some("libcpgf"));
    assert_eq!(library_name("lib.a").as_deref(), Some("lib"));
  }

  #[test]
  fn ignores_non_libraries() {
    assert_eq!(library_name("imgui.h"), None);
    assert_eq!(library_name("README"), None);
    assert_eq!(library_name(".a"), None);
    assert_eq!(library_name("libfoo.so.x"), None);
  }

  #[test]
  fn discovery_orders_by_directory_then_name_and_dedupes() {
    let temp = TempDir::new().unwrap();
    let release = temp.path().join("lib/Release");
    let common = temp.path().join("lib");
    fs::create_dir_all(&release).unwrap();
    for name in ["libzeta.a", "libalpha.a", "notes.txt"] {
      fs::write(release.join(name), "").unwrap();
    }
    for name in ["libalpha.so", "libbeta.a"] {
      fs::write(common.join(name), "").unwrap();
    }

    let libs = discover_libraries(&[release, common, temp.path().join("missing")]).unwrap();
    assert_eq!(libs, vec!["alpha", "zeta", "beta"]);
  }
}
