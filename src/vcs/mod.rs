//! Version-control client boundary.
//!
//! The sync engine only sees the narrow [`VcsClient`] trait and its typed
//! [`VcsError`]; how a clone or pull is carried out (and how failures are
//! classified) stays inside the implementation.

mod git;
#[cfg(test)]
pub mod testing;

use std::io;
use std::path::Path;

use thiserror::Error;

pub use git::{GitCli, git_available};

/// Errors returned by version-control operations.
#[derive(Error, Debug)]
pub enum VcsError {
    /// The remote could not be cloned or fetched.
    #[error("remote unreachable: {0}")]
    RemoteUnreachable(String),
    /// The local directory exists but is not the expected working tree.
    #[error("corrupt local state: {0}")]
    CorruptLocalState(String),
    /// Invalid inputs were provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Underlying IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl VcsError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, VcsError::RemoteUnreachable(_))
    }
}

/// What a successful clone-or-update did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetched {
    Cloned,
    Updated,
}

/// Clone/pull operations against a remote origin.
pub trait VcsClient: Send + Sync {
    /// Clone `url` into `dest`, which must not exist yet.
    fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), VcsError>;

    /// Bring the existing working tree at `path` up to date with `url`.
    fn pull(&self, url: &str, path: &Path) -> Result<(), VcsError>;

    /// Clone if `path` is absent, pull otherwise.
    fn clone_or_update(&self, url: &str, path: &Path) -> Result<Fetched, VcsError> {
        if path.exists() {
            self.pull(url, path)?;
            Ok(Fetched::Updated)
        } else {
            self.clone_repo(url, path)?;
            Ok(Fetched::Cloned)
        }
    }
}
