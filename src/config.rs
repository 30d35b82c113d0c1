//! Service configuration, built once at startup and shared by the catalog
//! store and the sync engine.

use std::path::PathBuf;
use std::time::Duration;

use crate::sync::RetryPolicy;
use crate::types::{ParseError, RepoName};

/// Manifest repository tracked when none is configured.
pub const DEFAULT_MANIFEST_URL: &str = "https://github.com/CoderXYZ7/sdroid-repos";

/// File inside the manifest repository listing the catalog URLs.
pub const DEFAULT_MANIFEST_FILE: &str = "repos.json";

/// Default size of the sync worker pool.
pub const DEFAULT_WORKERS: usize = 4;

/// Default per-repository lock timeout (5 minutes) - prevents indefinite hangs
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct Config {
    /// Catalog root holding one directory per tracked repository.
    pub root: PathBuf,
    /// Remote URL of the manifest repository.
    pub manifest_url: String,
    /// Local name of the manifest repository, derived from its URL.
    pub manifest_name: RepoName,
    /// Manifest file name inside the manifest repository.
    pub manifest_file: String,
    /// Number of concurrent repository syncs in a batch.
    pub workers: usize,
    /// Retry policy for transient sync failures.
    pub retry: RetryPolicy,
    /// Upper bound on waiting for a per-repository lock.
    pub lock_timeout: Duration,
    /// Lowercase extensions counted as release artifacts; empty accepts every file.
    pub artifact_extensions: Vec<String>,
}

impl Config {
    /// Create a configuration with defaults for everything but the root and
    /// manifest URL.
    pub fn new(root: impl Into<PathBuf>, manifest_url: impl Into<String>) -> Result<Self, ParseError> {
        let manifest_url = manifest_url.into();
        let manifest_name = RepoName::from_url(&manifest_url)?;

        Ok(Self {
            root: root.into(),
            manifest_url,
            manifest_name,
            manifest_file: DEFAULT_MANIFEST_FILE.to_string(),
            workers: DEFAULT_WORKERS,
            retry: RetryPolicy::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            artifact_extensions: Vec::new(),
        })
    }

    /// Set the worker pool size. Zero is clamped to one.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_manifest_file(mut self, file: impl Into<String>) -> Self {
        self.manifest_file = file.into();
        self
    }

    /// Restrict release artifacts to the given extensions (without the dot).
    pub fn with_artifact_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.artifact_extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        self
    }

    /// Default catalog root under the platform data directory.
    ///
    /// Uses `dirs::data_local_dir()` which resolves to:
    /// - Linux: `~/.local/share`
    /// - macOS: `~/Library/Application Support`
    /// - Windows: `C:\Users\<user>\AppData\Local`
    pub fn default_root() -> PathBuf {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        data_dir.join("repomirror").join("repos_data")
    }
}
