//! Default filesystem path table.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::CONFIG_FILE_NAME;

/// Well-known project paths, all absolute.
///
/// The `paths` hook receives this table and may rewrite any entry or add
/// new ones under `extra`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathTable {
    /// Project root.
    pub app_root: PathBuf,
    /// Source directory.
    pub app_src: PathBuf,
    /// Client entry module (extension resolved by the bundler).
    pub app_src_index: PathBuf,
    /// Static-generation entry module.
    pub app_src_ssg_index: PathBuf,
    /// Static files copied verbatim into the output directory.
    pub app_public: PathBuf,
    /// HTML template.
    pub app_html: PathBuf,
    /// Project manifest.
    pub app_package_json: PathBuf,
    /// Kiln configuration file.
    pub app_config: PathBuf,
    /// Build output directory.
    pub app_output_path: PathBuf,
    /// Bundler cache directory.
    pub app_cache: PathBuf,
    /// Paths contributed by plugins.
    #[serde(default)]
    pub extra: BTreeMap<String, PathBuf>,
}

impl PathTable {
    /// Builds the default table for a project rooted at `root`.
    ///
    /// The root is canonicalized when it exists so that symlinked checkouts
    /// resolve to one location.
    pub fn resolve_from(root: &Path) -> Self {
        let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let resolve = |relative: &str| root.join(relative);

        Self {
            app_src: resolve("src"),
            app_src_index: resolve("src/index"),
            app_src_ssg_index: resolve("src/ssg"),
            app_public: resolve("public"),
            app_html: resolve("public/index.html"),
            app_package_json: resolve("package.json"),
            app_config: resolve(CONFIG_FILE_NAME),
            app_output_path: resolve("dist"),
            app_cache: resolve(".kiln/cache"),
            extra: BTreeMap::new(),
            app_root: root,
        }
    }
}
