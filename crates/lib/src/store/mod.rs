//! On-disk store for work trees, finished packages and published references.
//!
//! # Layout
//!
//! ```text
//! store/
//! ├── work/<key>/             # Per-configuration scratch space
//! │   ├── src/                # Acquired sources plus exported recipe files
//! │   └── build/              # Out-of-tree build directory
//! ├── pkg/<name>-<key>/       # Finished package, marker written last
//! ├── downloads/              # Verified archive downloads
//! └── refs/<name>/<version>/<channel>.json
//! ```
//!
//! `<key>` is the cache key of one (recipe, reference, configuration) triple.

pub mod paths;
