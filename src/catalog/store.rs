//! Read side of the catalog.
//!
//! `CatalogStore` resolves repository names to working trees and answers
//! metadata queries (manifest, README, release artifacts, icons). Nothing in
//! here touches the network or mutates a working tree.

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::CatalogPaths;
use crate::config::Config;
use crate::types::{ParseError, RepoName, RepoRecord};

/// Errors returned by catalog reads.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The manifest repository (or its manifest file) is not checked out.
    #[error("manifest not found; sync the repository list first")]
    ManifestNotFound,
    /// The manifest is not a JSON list of repository URLs.
    #[error("manifest is malformed: {0}")]
    ManifestMalformed(String),
    /// No working tree for the requested repository.
    #[error("repository not found: {0}")]
    RepositoryNotFound(RepoName),
    /// No release artifact with the requested file name.
    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),
    /// None of the icon candidates exist.
    #[error("no icon found for repository: {0}")]
    IconNotFound(RepoName),
    /// A requested file name is not a plain file name.
    #[error("invalid file name: {0}")]
    InvalidFileName(String),
    /// A repository name failed validation.
    #[error("invalid repository name: {0}")]
    InvalidName(#[from] ParseError),
    /// Underlying IO error.
    #[error("filesystem error: {0}")]
    Io(#[from] io::Error),
}

/// A downloadable file found directly under a repository's `versions`
/// directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseArtifact {
    pub name: String,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
}

/// Read-only health snapshot of the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub main_repo_initialized: bool,
    pub repos_json_exists: bool,
    pub repos_count: usize,
    pub base_dir: String,
    /// Why the manifest could not be counted, when it exists but is unreadable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_error: Option<String>,
}

/// Catalog reads over the on-disk layout.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    paths: CatalogPaths,
    artifact_extensions: Vec<String>,
}

fn artifact_order(a: &(SystemTime, ReleaseArtifact), b: &(SystemTime, ReleaseArtifact)) -> Ordering {
    // Most recent first; name breaks ties so listings are stable.
    b.0.cmp(&a.0).then_with(|| a.1.name.cmp(&b.1.name))
}

/// Reject anything that is not a plain file name.
fn validate_file_name(file_name: &str) -> Result<(), CatalogError> {
    let invalid = file_name.is_empty()
        || file_name.starts_with('.')
        || file_name.contains(['/', '\\'])
        || file_name.bytes().any(|b| b < 0x20);
    if invalid {
        return Err(CatalogError::InvalidFileName(file_name.to_string()));
    }
    Ok(())
}

/// Resolve `path` to a regular file inside the working tree at `repo_root`
/// (already canonical).
///
/// Symlinks are followed, but only while the target stays inside the
/// repository. Missing files, non-files and escaping links yield `None`.
fn contained_file(repo_root: &Path, path: &Path) -> Result<Option<(PathBuf, fs::Metadata)>, CatalogError> {
    let resolved = match fs::canonicalize(path) {
        Ok(resolved) => resolved,
        Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
            return Ok(None);
        }
        Err(e) => return Err(CatalogError::Io(e)),
    };

    if !resolved.starts_with(repo_root) {
        log::warn!("Ignoring {}: resolves outside the repository", path.display());
        return Ok(None);
    }

    let metadata = fs::metadata(&resolved)?;
    if !metadata.is_file() {
        return Ok(None);
    }
    Ok(Some((resolved, metadata)))
}

impl CatalogStore {
    pub fn new(paths: CatalogPaths) -> Self {
        Self {
            paths,
            artifact_extensions: Vec::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(CatalogPaths::from_config(config))
            .with_artifact_extensions(config.artifact_extensions.clone())
    }

    /// Only count files with these (lowercase) extensions as artifacts.
    pub fn with_artifact_extensions(mut self, extensions: Vec<String>) -> Self {
        self.artifact_extensions = extensions;
        self
    }

    pub fn paths(&self) -> &CatalogPaths {
        &self.paths
    }

    /// Create the catalog root if it is missing. Idempotent.
    pub fn ensure_root_exists(&self) -> Result<(), CatalogError> {
        fs::create_dir_all(self.paths.root())?;
        Ok(())
    }

    /// Working tree location of a repository. Pure path computation.
    pub fn resolve_path(&self, name: &RepoName) -> PathBuf {
        self.paths.repo_dir(name)
    }

    /// Build the record for a remote URL.
    pub fn record_for(&self, url: &str) -> Result<RepoRecord, ParseError> {
        let local_name = RepoName::from_url(url)?;
        Ok(RepoRecord {
            url: url.trim().to_string(),
            local_path: self.resolve_path(&local_name),
            local_name,
        })
    }

    pub fn manifest_repo_exists(&self) -> bool {
        self.paths.manifest_dir().exists()
    }

    /// Read the manifest's ordered list of repository URLs.
    pub fn read_manifest(&self) -> Result<Vec<String>, CatalogError> {
        let contents = match fs::read_to_string(self.paths.manifest_file()) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CatalogError::ManifestNotFound);
            }
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                return Err(CatalogError::ManifestMalformed(
                    "manifest is not valid UTF-8".to_string(),
                ));
            }
            Err(e) => return Err(CatalogError::Io(e)),
        };

        serde_json::from_str::<Vec<String>>(&contents)
            .map_err(|e| CatalogError::ManifestMalformed(e.to_string()))
    }

    /// Read the manifest and derive a record for every entry.
    ///
    /// An entry without a usable repository name makes the whole manifest
    /// malformed.
    pub fn manifest_records(&self) -> Result<Vec<RepoRecord>, CatalogError> {
        self.read_manifest()?
            .iter()
            .map(|url| {
                self.record_for(url)
                    .map_err(|e| CatalogError::ManifestMalformed(e.to_string()))
            })
            .collect()
    }

    /// Canonical working tree of an existing repository.
    fn require_repo(&self, name: &RepoName) -> Result<PathBuf, CatalogError> {
        let dir = self.resolve_path(name);
        if !dir.is_dir() {
            return Err(CatalogError::RepositoryNotFound(name.clone()));
        }
        Ok(fs::canonicalize(dir)?)
    }

    fn is_artifact_name(&self, file_name: &str) -> bool {
        if self.artifact_extensions.is_empty() {
            return true;
        }
        Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .is_some_and(|ext| self.artifact_extensions.contains(&ext))
    }

    /// List release artifacts, most recently modified first.
    ///
    /// Only the immediate `versions` directory is scanned; a missing
    /// `versions` directory yields an empty list. Names that
    /// [`artifact_path`](Self::artifact_path) would refuse are skipped.
    pub fn list_artifacts(&self, name: &RepoName) -> Result<Vec<ReleaseArtifact>, CatalogError> {
        let repo_root = self.require_repo(name)?;

        let entries = match fs::read_dir(self.paths.versions_dir(name)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CatalogError::Io(e)),
        };

        let mut artifacts = Vec::new();
        for entry in entries {
            let entry = entry?;
            let Ok(file_name) = entry.file_name().into_string() else {
                continue;
            };
            if validate_file_name(&file_name).is_err() || !self.is_artifact_name(&file_name) {
                continue;
            }

            let Some((_, metadata)) = contained_file(&repo_root, &entry.path())? else {
                continue;
            };
            let modified = metadata.modified()?;

            artifacts.push((
                modified,
                ReleaseArtifact {
                    name: file_name,
                    size_bytes: metadata.len(),
                    modified_at: DateTime::<Utc>::from(modified),
                },
            ));
        }

        artifacts.sort_by(artifact_order);
        Ok(artifacts.into_iter().map(|(_, artifact)| artifact).collect())
    }

    /// Read the repository README. A missing README is an empty string.
    pub fn read_readme(&self, name: &RepoName) -> Result<String, CatalogError> {
        let repo_root = self.require_repo(name)?;

        match contained_file(&repo_root, &self.paths.readme_path(name))? {
            Some((path, _)) => Ok(String::from_utf8_lossy(&fs::read(path)?).into_owned()),
            None => Ok(String::new()),
        }
    }

    /// Find the repository icon; the first existing candidate wins.
    pub fn locate_icon(&self, name: &RepoName) -> Result<PathBuf, CatalogError> {
        let repo_root = self.require_repo(name)?;

        for candidate in self.paths.icon_candidates(name) {
            if let Some((path, _)) = contained_file(&repo_root, &candidate)? {
                return Ok(path);
            }
        }
        Err(CatalogError::IconNotFound(name.clone()))
    }

    /// Resolve a release artifact file for download.
    pub fn artifact_path(&self, name: &RepoName, file_name: &str) -> Result<PathBuf, CatalogError> {
        validate_file_name(file_name)?;
        let repo_root = self.require_repo(name)?;

        let not_found = || CatalogError::ArtifactNotFound(file_name.to_string());
        if !self.is_artifact_name(file_name) {
            return Err(not_found());
        }
        contained_file(&repo_root, &self.paths.versions_dir(name).join(file_name))?
            .map(|(path, _)| path)
            .ok_or_else(not_found)
    }

    /// Snapshot catalog health without side effects.
    pub fn status(&self) -> StatusSnapshot {
        let main_repo_initialized = self.manifest_repo_exists();
        let repos_json_exists = self.paths.manifest_file().is_file();

        let (repos_count, manifest_error) = if repos_json_exists {
            match self.read_manifest() {
                Ok(urls) => (urls.len(), None),
                Err(e) => {
                    log::warn!("Failed to read manifest for status: {}", e);
                    (0, Some(e.to_string()))
                }
            }
        } else {
            (0, None)
        };

        StatusSnapshot {
            main_repo_initialized,
            repos_json_exists,
            repos_count,
            base_dir: self.paths.root().display().to_string(),
            manifest_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{FileTime, set_file_mtime};
    use tempfile::{TempDir, tempdir};

    fn name(s: &str) -> RepoName {
        s.parse().unwrap()
    }

    fn test_store() -> (CatalogStore, TempDir) {
        let dir = tempdir().unwrap();
        let paths = CatalogPaths::new(dir.path(), name("manifest"), "repos.json");
        (CatalogStore::new(paths), dir)
    }

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn write_manifest(store: &CatalogStore, contents: &str) {
        write(&store.paths().manifest_file(), contents);
    }

    fn write_artifact(store: &CatalogStore, repo: &str, file: &str, mtime_secs: i64) {
        let path = store.paths().versions_dir(&name(repo)).join(file);
        write(&path, file);
        set_file_mtime(&path, FileTime::from_unix_time(mtime_secs, 0)).unwrap();
    }

    #[test]
    fn ensure_root_exists_is_idempotent() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("nested").join("catalog");
        let store = CatalogStore::new(CatalogPaths::new(&root, name("manifest"), "repos.json"));

        store.ensure_root_exists().unwrap();
        store.ensure_root_exists().unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn resolve_path_joins_root() {
        let (store, dir) = test_store();
        assert_eq!(store.resolve_path(&name("app")), dir.path().join("app"));
    }

    #[test]
    fn read_manifest_not_found_before_sync() {
        let (store, _dir) = test_store();
        assert!(matches!(
            store.read_manifest(),
            Err(CatalogError::ManifestNotFound)
        ));
    }

    #[test]
    fn read_manifest_preserves_order() {
        let (store, _dir) = test_store();
        write_manifest(&store, r#"["https://host/b", "https://host/a"]"#);

        let urls = store.read_manifest().unwrap();
        assert_eq!(urls, vec!["https://host/b", "https://host/a"]);
    }

    #[test]
    fn read_manifest_rejects_non_list() {
        let (store, _dir) = test_store();
        write_manifest(&store, r#"{"repos": []}"#);

        assert!(matches!(
            store.read_manifest(),
            Err(CatalogError::ManifestMalformed(_))
        ));
    }

    #[test]
    fn read_manifest_rejects_non_string_entries() {
        let (store, _dir) = test_store();
        write_manifest(&store, r#"["https://host/a", 42]"#);

        assert!(matches!(
            store.read_manifest(),
            Err(CatalogError::ManifestMalformed(_))
        ));
    }

    #[test]
    fn manifest_records_reject_unnamed_urls() {
        let (store, _dir) = test_store();
        write_manifest(&store, r#"["https://host/a", "https://host/"]"#);

        assert!(matches!(
            store.manifest_records(),
            Err(CatalogError::ManifestMalformed(_))
        ));
    }

    #[test]
    fn manifest_records_derive_names_and_paths() {
        let (store, dir) = test_store();
        write_manifest(&store, r#"["https://host/owner/a.git"]"#);

        let records = store.manifest_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].local_name.as_str(), "a");
        assert_eq!(records[0].local_path, dir.path().join("a"));
        assert_eq!(records[0].url, "https://host/owner/a.git");
    }

    #[test]
    fn list_artifacts_missing_repo() {
        let (store, _dir) = test_store();
        assert!(matches!(
            store.list_artifacts(&name("ghost")),
            Err(CatalogError::RepositoryNotFound(_))
        ));
    }

    #[test]
    fn list_artifacts_without_versions_dir_is_empty() {
        let (store, _dir) = test_store();
        fs::create_dir_all(store.resolve_path(&name("app"))).unwrap();

        assert!(store.list_artifacts(&name("app")).unwrap().is_empty());
    }

    #[test]
    fn list_artifacts_most_recent_first() {
        let (store, _dir) = test_store();
        write_artifact(&store, "app", "app-1.0.apk", 1_600_000_000);
        write_artifact(&store, "app", "app-1.2.apk", 1_700_000_000);
        write_artifact(&store, "app", "app-1.1.apk", 1_650_000_000);

        let artifacts = store.list_artifacts(&name("app")).unwrap();
        let names: Vec<&str> = artifacts.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["app-1.2.apk", "app-1.1.apk", "app-1.0.apk"]);

        for pair in artifacts.windows(2) {
            assert!(pair[0].modified_at >= pair[1].modified_at);
        }
        assert_eq!(artifacts[0].size_bytes, "app-1.2.apk".len() as u64);
    }

    #[test]
    fn list_artifacts_is_flat() {
        let (store, _dir) = test_store();
        write_artifact(&store, "app", "top.apk", 1_600_000_000);
        let nested = store.paths().versions_dir(&name("app")).join("old").join("nested.apk");
        write(&nested, "nested");

        let artifacts = store.list_artifacts(&name("app")).unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].name, "top.apk");
    }

    #[test]
    fn list_artifacts_applies_extension_filter() {
        let (store, _dir) = test_store();
        let store = store.with_artifact_extensions(vec!["apk".to_string()]);
        write_artifact(&store, "app", "app.APK", 1_600_000_000);
        write_artifact(&store, "app", "notes.txt", 1_600_000_000);

        let artifacts = store.list_artifacts(&name("app")).unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].name, "app.APK");
    }

    #[test]
    fn artifact_serializes_camel_case() {
        let artifact = ReleaseArtifact {
            name: "app.apk".to_string(),
            size_bytes: 3,
            modified_at: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
        };
        let json = serde_json::to_string(&artifact).unwrap();
        assert!(json.contains(r#""sizeBytes":3"#));
        assert!(json.contains(r#""modifiedAt":"1970-01-01T00:00:00Z""#));
    }

    #[test]
    fn read_readme_missing_is_empty() {
        let (store, _dir) = test_store();
        fs::create_dir_all(store.resolve_path(&name("app"))).unwrap();

        assert_eq!(store.read_readme(&name("app")).unwrap(), "");
    }

    #[test]
    fn read_readme_contents() {
        let (store, _dir) = test_store();
        write(&store.paths().readme_path(&name("app")), "# App\n");

        assert_eq!(store.read_readme(&name("app")).unwrap(), "# App\n");
    }

    #[test]
    fn locate_icon_first_match_wins() {
        let (store, dir) = test_store();
        write(&dir.path().join("app").join("icon.png"), "icon");
        write(&dir.path().join("app").join("favicon.png"), "favicon");

        let icon = store.locate_icon(&name("app")).unwrap();
        assert_eq!(icon, fs::canonicalize(dir.path().join("app").join("favicon.png")).unwrap());
    }

    #[test]
    fn locate_icon_searches_subdirectories_in_order() {
        let (store, dir) = test_store();
        write(&dir.path().join("app").join("images").join("favicon.png"), "x");
        write(&dir.path().join("app").join("assets").join("logo.png"), "x");

        let icon = store.locate_icon(&name("app")).unwrap();
        assert_eq!(icon, fs::canonicalize(dir.path().join("app").join("assets").join("logo.png")).unwrap());
    }

    #[test]
    fn locate_icon_not_found() {
        let (store, _dir) = test_store();
        fs::create_dir_all(store.resolve_path(&name("app"))).unwrap();

        assert!(matches!(
            store.locate_icon(&name("app")),
            Err(CatalogError::IconNotFound(_))
        ));
    }

    #[test]
    fn artifact_path_rejects_traversal() {
        let (store, _dir) = test_store();
        fs::create_dir_all(store.resolve_path(&name("app"))).unwrap();

        for bad in ["../README.md", "..", "a/b.apk", "a\\b.apk", ""] {
            assert!(
                matches!(
                    store.artifact_path(&name("app"), bad),
                    Err(CatalogError::InvalidFileName(_))
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn artifact_path_resolves_existing_file() {
        let (store, _dir) = test_store();
        write_artifact(&store, "app", "app.apk", 1_600_000_000);

        let path = store.artifact_path(&name("app"), "app.apk").unwrap();
        assert!(path.ends_with("app/versions/app.apk"));
        assert!(matches!(
            store.artifact_path(&name("app"), "missing.apk"),
            Err(CatalogError::ArtifactNotFound(_))
        ));
    }

    #[test]
    fn list_artifacts_skips_hidden_files() {
        let (store, _dir) = test_store();
        write_artifact(&store, "app", ".gitkeep", 1_600_000_000);
        write_artifact(&store, "app", "app.apk", 1_600_000_000);

        let artifacts = store.list_artifacts(&name("app")).unwrap();
        let names: Vec<_> = artifacts.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["app.apk"]);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_leaving_the_repository_are_ignored() {
        use std::os::unix::fs::symlink;

        let (store, dir) = test_store();
        let outside = tempdir().unwrap();
        let secret = outside.path().join("secret.txt");
        write(&secret, "secret");

        let repo = dir.path().join("app");
        fs::create_dir_all(repo.join("versions")).unwrap();
        symlink(&secret, repo.join("versions").join("app.apk")).unwrap();
        symlink(&secret, repo.join("favicon.png")).unwrap();
        symlink(&secret, repo.join("README.md")).unwrap();

        assert!(store.list_artifacts(&name("app")).unwrap().is_empty());
        assert!(matches!(
            store.artifact_path(&name("app"), "app.apk"),
            Err(CatalogError::ArtifactNotFound(_))
        ));
        assert!(matches!(
            store.locate_icon(&name("app")),
            Err(CatalogError::IconNotFound(_))
        ));
        assert_eq!(store.read_readme(&name("app")).unwrap(), "");
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_within_the_repository_are_followed() {
        use std::os::unix::fs::symlink;

        let (store, dir) = test_store();
        let repo = dir.path().join("app");
        write(&repo.join("build").join("app-1.0.apk"), "apk");
        write(&repo.join("docs").join("README.md"), "# App");
        fs::create_dir_all(repo.join("versions")).unwrap();
        symlink(
            repo.join("build").join("app-1.0.apk"),
            repo.join("versions").join("app.apk"),
        )
        .unwrap();
        symlink(repo.join("docs").join("README.md"), repo.join("README.md")).unwrap();

        let artifacts = store.list_artifacts(&name("app")).unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].name, "app.apk");
        assert_eq!(artifacts[0].size_bytes, 3);

        let path = store.artifact_path(&name("app"), "app.apk").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "apk");
        assert_eq!(store.read_readme(&name("app")).unwrap(), "# App");
    }

    #[test]
    fn status_before_and_after_manifest() {
        let (store, _dir) = test_store();
        let status = store.status();
        assert!(!status.main_repo_initialized);
        assert!(!status.repos_json_exists);
        assert_eq!(status.repos_count, 0);

        write_manifest(&store, r#"["https://host/a", "https://host/b"]"#);
        let status = store.status();
        assert!(status.main_repo_initialized);
        assert!(status.repos_json_exists);
        assert_eq!(status.repos_count, 2);
        assert!(status.manifest_error.is_none());
    }

    #[test]
    fn status_reports_malformed_manifest() {
        let (store, _dir) = test_store();
        write_manifest(&store, "not json");

        let status = store.status();
        assert_eq!(status.repos_count, 0);
        assert!(status.manifest_error.is_some());
    }
}
