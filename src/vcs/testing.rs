//! Test doubles and git fixtures shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use git2::{Repository, Signature};

use super::{VcsClient, VcsError, git_available};
use crate::types::normalize_url;

/// Returns false (and says so) when no `git` binary is installed.
pub fn require_git() -> bool {
    if git_available() {
        true
    } else {
        eprintln!("skipping test: git binary not found");
        false
    }
}

/// Create a non-bare source repository at `path`.
pub fn init_source_repo(path: &Path) -> Repository {
    std::fs::create_dir_all(path).unwrap();
    Repository::init(path).unwrap()
}

/// Write `contents` to `rel` in the source repo and commit it on HEAD.
pub fn commit_file(repo: &Repository, rel: &str, contents: &str) {
    let workdir = repo.workdir().unwrap().to_path_buf();
    let file = workdir.join(rel);
    std::fs::create_dir_all(file.parent().unwrap()).unwrap();
    std::fs::write(&file, contents).unwrap();

    let mut index = repo.index().unwrap();
    index.add_path(Path::new(rel)).unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();

    let sig = Signature::now("repomirror", "repomirror@example.com").unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, &format!("update {rel}"), &tree, &parents)
        .unwrap();
}

/// Failure injected into the next operation against a URL.
#[derive(Debug, Clone, Copy)]
pub enum FakeFailure {
    Unreachable,
    Corrupt,
}

impl FakeFailure {
    fn into_error(self) -> VcsError {
        match self {
            FakeFailure::Unreachable => VcsError::RemoteUnreachable("connection refused".into()),
            FakeFailure::Corrupt => VcsError::CorruptLocalState("not a git repository".into()),
        }
    }
}

/// In-memory stand-in for git.
///
/// A clone creates the destination with a `.git` marker plus any files
/// registered for the URL; a pull requires the marker. Tracks how many
/// operations overlap.
#[derive(Default)]
pub struct FakeVcs {
    files: Mutex<HashMap<String, Vec<(PathBuf, String)>>>,
    failures: Mutex<HashMap<String, VecDeque<FakeFailure>>>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeVcs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every operation for `delay` so overlapping calls are observable.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Files materialized by cloning `url`.
    pub fn with_file(self, url: &str, rel: &str, contents: &str) -> Self {
        self.files
            .lock()
            .unwrap()
            .entry(normalize_url(url).to_string())
            .or_default()
            .push((PathBuf::from(rel), contents.to_string()));
        self
    }

    /// Queue failures for the next operations against `url`.
    pub fn fail_next(&self, url: &str, failures: &[FakeFailure]) {
        self.failures
            .lock()
            .unwrap()
            .entry(normalize_url(url).to_string())
            .or_default()
            .extend(failures.iter().copied());
    }

    /// Total clone and pull invocations.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of operations observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn run(&self, url: &str, op: impl FnOnce() -> Result<(), VcsError>) -> Result<(), VcsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let injected = self
            .failures
            .lock()
            .unwrap()
            .get_mut(normalize_url(url))
            .and_then(|queue| queue.pop_front());
        let result = match injected {
            Some(failure) => Err(failure.into_error()),
            None => op(),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn materialize(&self, url: &str, dest: &Path) -> Result<(), VcsError> {
        std::fs::create_dir_all(dest.join(".git"))?;
        let files = self.files.lock().unwrap();
        for (rel, contents) in files.get(normalize_url(url)).into_iter().flatten() {
            let path = dest.join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, contents)?;
        }
        Ok(())
    }
}

impl VcsClient for FakeVcs {
    fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), VcsError> {
        self.run(url, || {
            if dest.exists() {
                return Err(VcsError::CorruptLocalState(
                    "clone destination already exists".into(),
                ));
            }
            self.materialize(url, dest)
        })
    }

    fn pull(&self, url: &str, path: &Path) -> Result<(), VcsError> {
        self.run(url, || {
            if !path.join(".git").is_dir() {
                return Err(VcsError::CorruptLocalState("not a git repository".into()));
            }
            self.materialize(url, path)
        })
    }
}
