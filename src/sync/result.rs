use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::CatalogError;
use crate::types::RepoRecord;
use crate::vcs::{Fetched, VcsError};

/// Machine-readable failure kinds, shared by sync results and API errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ManifestNotFound,
    ManifestMalformed,
    RepositoryNotFound,
    NameCollision,
    CorruptLocalState,
    RemoteUnreachable,
    FilesystemError,
    ArtifactNotFound,
    IconNotFound,
    InvalidName,
    LockTimeout,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::ManifestNotFound => "manifest_not_found",
            FailureKind::ManifestMalformed => "manifest_malformed",
            FailureKind::RepositoryNotFound => "repository_not_found",
            FailureKind::NameCollision => "name_collision",
            FailureKind::CorruptLocalState => "corrupt_local_state",
            FailureKind::RemoteUnreachable => "remote_unreachable",
            FailureKind::FilesystemError => "filesystem_error",
            FailureKind::ArtifactNotFound => "artifact_not_found",
            FailureKind::IconNotFound => "icon_not_found",
            FailureKind::InvalidName => "invalid_name",
            FailureKind::LockTimeout => "lock_timeout",
        }
    }
}

impl From<&VcsError> for FailureKind {
    fn from(err: &VcsError) -> Self {
        match err {
            VcsError::RemoteUnreachable(_) => FailureKind::RemoteUnreachable,
            VcsError::CorruptLocalState(_) => FailureKind::CorruptLocalState,
            VcsError::InvalidInput(_) => FailureKind::InvalidName,
            VcsError::Io(_) => FailureKind::FilesystemError,
        }
    }
}

impl From<&CatalogError> for FailureKind {
    fn from(err: &CatalogError) -> Self {
        match err {
            CatalogError::ManifestNotFound => FailureKind::ManifestNotFound,
            CatalogError::ManifestMalformed(_) => FailureKind::ManifestMalformed,
            CatalogError::RepositoryNotFound(_) => FailureKind::RepositoryNotFound,
            CatalogError::ArtifactNotFound(_) => FailureKind::ArtifactNotFound,
            CatalogError::IconNotFound(_) => FailureKind::IconNotFound,
            CatalogError::InvalidFileName(_) | CatalogError::InvalidName(_) => {
                FailureKind::InvalidName
            }
            CatalogError::Io(_) => FailureKind::FilesystemError,
        }
    }
}

/// Terminal state of one repository sync attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Cloned,
    Updated,
    Failed { kind: FailureKind, reason: String },
}

impl From<Fetched> for SyncOutcome {
    fn from(fetched: Fetched) -> Self {
        match fetched {
            Fetched::Cloned => SyncOutcome::Cloned,
            Fetched::Updated => SyncOutcome::Updated,
        }
    }
}

/// Outcome of syncing one repository. Response payload only, never stored.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub repository: RepoRecord,
    #[serde(flatten)]
    pub outcome: SyncOutcome,
    /// Clone/pull attempts made; zero when rejected before running.
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
}

impl SyncResult {
    pub fn new(repository: RepoRecord, outcome: SyncOutcome, attempts: u32) -> Self {
        Self {
            repository,
            outcome,
            attempts,
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self.outcome, SyncOutcome::Failed { .. })
    }

    /// Failure kind, if the sync failed.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.outcome {
            SyncOutcome::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Results of a catalog sync, in manifest order.
///
/// When the batch was cancelled, repositories that never started are absent.
#[derive(Debug, Clone)]
pub struct SyncBatch {
    pub results: Vec<SyncResult>,
    pub cancelled: bool,
}

impl SyncBatch {
    pub fn failures(&self) -> usize {
        self.results.iter().filter(|r| r.failure_kind().is_some()).count()
    }
}
