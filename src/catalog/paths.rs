//! Catalog directory path management
//!
//! This module provides the `CatalogPaths` struct which manages all filesystem
//! paths for the catalog layout:
//!
//! ```text
//! <root>/
//! ├── <manifest-repo>/          # Manifest repository checkout
//! │   └── repos.json
//! ├── <repo>/                   # One working tree per tracked repository
//! │   ├── README.md
//! │   └── versions/             # Release artifacts (flat)
//! └── .locks/
//!     └── <repo>.lock           # flock-based locking
//! ```

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::types::RepoName;

/// Candidate icon locations, relative to a repository root, in lookup order.
pub const ICON_CANDIDATES: [&str; 9] = [
    "favicon.png",
    "icon.png",
    "logo.png",
    "assets/favicon.png",
    "assets/icon.png",
    "assets/logo.png",
    "images/favicon.png",
    "images/icon.png",
    "images/logo.png",
];

/// Manages all filesystem paths for the catalog layout
#[derive(Debug, Clone)]
pub struct CatalogPaths {
    root: PathBuf,
    manifest_name: RepoName,
    manifest_file: String,
}

impl CatalogPaths {
    pub fn new(
        root: impl Into<PathBuf>,
        manifest_name: RepoName,
        manifest_file: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            manifest_name,
            manifest_file: manifest_file.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.root.clone(),
            config.manifest_name.clone(),
            config.manifest_file.clone(),
        )
    }

    /// Returns the catalog root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the working tree of a repository: `{root}/{name}`
    pub fn repo_dir(&self, name: &RepoName) -> PathBuf {
        self.root.join(name.as_str())
    }

    /// Returns the manifest repository working tree: `{root}/{manifest}`
    pub fn manifest_dir(&self) -> PathBuf {
        self.repo_dir(&self.manifest_name)
    }

    /// Returns the manifest file: `{root}/{manifest}/repos.json`
    pub fn manifest_file(&self) -> PathBuf {
        self.manifest_dir().join(&self.manifest_file)
    }

    /// Returns the release artifact directory: `{root}/{name}/versions`
    pub fn versions_dir(&self, name: &RepoName) -> PathBuf {
        self.repo_dir(name).join("versions")
    }

    /// Returns the README path: `{root}/{name}/README.md`
    pub fn readme_path(&self, name: &RepoName) -> PathBuf {
        self.repo_dir(name).join("README.md")
    }

    /// Returns icon candidate paths for a repository, in lookup order
    pub fn icon_candidates(&self, name: &RepoName) -> impl Iterator<Item = PathBuf> + '_ {
        let base = self.repo_dir(name);
        ICON_CANDIDATES.iter().map(move |rel| base.join(rel))
    }

    /// Returns the locks directory path: `{root}/.locks`
    pub fn locks_dir(&self) -> PathBuf {
        self.root.join(".locks")
    }

    /// Returns the lock file path: `{root}/.locks/{name}.lock`
    ///
    /// Repository names never start with a dot, so the lock directory cannot
    /// clash with a working tree.
    pub fn lock_path(&self, name: &RepoName) -> PathBuf {
        self.locks_dir().join(format!("{}.lock", name.as_str()))
    }
}
