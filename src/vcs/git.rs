//! Git operations using a hybrid CLI + libgit2 approach.
//!
//! **CLI (with hardening) for network operations:**
//! - `clone_repo` - `git clone`
//! - `pull` - `git fetch` followed by a fast-forward-only merge
//!
//! **libgit2 for local inspection:**
//! - validating that an existing directory is a non-bare repository whose
//!   `origin` matches the expected URL, before anything touches it
//!
//! Failures are classified by which step failed, never by parsing git's
//! output: a failed clone or fetch is `RemoteUnreachable`, a directory that
//! is not the expected repository (or cannot be fast-forwarded) is
//! `CorruptLocalState`.

use std::path::Path;
use std::process::{Command, Output, Stdio};

use git2::Repository;

use super::{VcsClient, VcsError};
use crate::types::normalize_url;

/// Validate that a remote URL cannot be mistaken for an option and carries
/// no control characters.
fn validate_url(url: &str) -> Result<(), VcsError> {
    if url.trim().is_empty() {
        return Err(VcsError::InvalidInput("url cannot be empty".to_string()));
    }
    if url.starts_with('-') {
        return Err(VcsError::InvalidInput(
            "url cannot start with '-'".to_string(),
        ));
    }
    if url.bytes().any(|b| b < 0x20) {
        return Err(VcsError::InvalidInput(
            "url cannot contain null or control characters".to_string(),
        ));
    }
    Ok(())
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

/// Check that `path` holds a working tree cloned from `url`.
fn verify_working_tree(url: &str, path: &Path) -> Result<(), VcsError> {
    let repo = Repository::open(path).map_err(|e| {
        VcsError::CorruptLocalState(format!("not a git repository: {}", e.message()))
    })?;

    if repo.is_bare() {
        return Err(VcsError::CorruptLocalState(
            "repository has no working tree".to_string(),
        ));
    }

    let origin = repo
        .find_remote("origin")
        .map_err(|_| VcsError::CorruptLocalState("repository has no origin remote".to_string()))?;
    let origin_url = origin.url().unwrap_or_default();

    if normalize_url(origin_url) != normalize_url(url) {
        return Err(VcsError::CorruptLocalState(format!(
            "origin points at {} instead of {}",
            origin_url, url
        )));
    }

    Ok(())
}

/// Check whether a usable `git` binary is on the PATH.
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Git CLI wrapper with security hardening.
pub struct GitCli {
    git_path: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCli {
    /// Create a new GitCli instance using the system git.
    pub fn new() -> Self {
        Self {
            git_path: "git".into(),
        }
    }

    /// Use a specific git executable.
    pub fn with_git_path(git_path: impl Into<String>) -> Self {
        Self {
            git_path: git_path.into(),
        }
    }

    /// Create a hardened Command with security settings.
    ///
    /// Applies:
    /// - `GIT_LFS_SKIP_SMUDGE=1` - skip LFS file downloads
    /// - `GIT_TERMINAL_PROMPT=0` - disable interactive prompts
    /// - `core.hooksPath=` - disable hooks execution
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.git_path);
        cmd.env("GIT_LFS_SKIP_SMUDGE", "1");
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd.args(["-c", "core.hooksPath="]);
        cmd.stdin(Stdio::null());
        cmd
    }
}

impl VcsClient for GitCli {
    fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), VcsError> {
        validate_url(url)?;

        if dest.exists() {
            return Err(VcsError::CorruptLocalState(
                "clone destination already exists".to_string(),
            ));
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let output = self
            .command()
            .args(["clone", "--quiet", "--"])
            .arg(url.trim())
            .arg(dest)
            .output()?;

        if !output.status.success() {
            discard_partial_clone(dest);
            return Err(VcsError::RemoteUnreachable(stderr_of(&output)));
        }

        Ok(())
    }

    fn pull(&self, url: &str, path: &Path) -> Result<(), VcsError> {
        validate_url(url)?;
        verify_working_tree(url, path)?;

        let output = self
            .command()
            .arg("-C")
            .arg(path)
            .args(["fetch", "--quiet", "--prune", "origin"])
            .output()?;
        if !output.status.success() {
            return Err(VcsError::RemoteUnreachable(stderr_of(&output)));
        }

        let output = self
            .command()
            .arg("-C")
            .arg(path)
            .args(["merge", "--quiet", "--ff-only", "@{upstream}"])
            .output()?;
        if !output.status.success() {
            return Err(VcsError::CorruptLocalState(format!(
                "cannot fast-forward working tree: {}",
                stderr_of(&output)
            )));
        }

        Ok(())
    }
}

/// Remove whatever a failed clone left at `dest`; a leftover tree would be
/// taken for an existing checkout on the next sync.
fn discard_partial_clone(dest: &Path) {
    match std::fs::remove_dir_all(dest) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!(
            "Failed to remove incomplete clone at {}: {}",
            dest.display(),
            e
        ),
    }
}
