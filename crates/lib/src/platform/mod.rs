//! Host platform detection.
//!
//! The detected host provides the default values for the `os` and `arch`
//! settings and the `pinforge.platform` value visible to recipes.

pub mod paths;

/// Host value for the `os` setting. macOS is reported as `darwin`.
pub fn host_os() -> String {
  match std::env::consts::OS {
    "macos" => "darwin".to_string(),
    other => other.to_string(),
  }
}

/// Host value for the `arch` setting.
pub fn host_arch() -> String {
  std::env::consts::ARCH.to_string()
}

/// `<arch>-<os>`, e.g. `x86_64-linux` or `aarch64-darwin`.
pub fn host_platform() -> String {
  format!("{}-{}", host_arch(), host_os())
}
