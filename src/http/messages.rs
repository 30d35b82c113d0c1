use serde::{Deserialize, Serialize};

use crate::catalog::{ReleaseArtifact, StatusSnapshot};
use crate::sync::SyncResult;

/// `POST /UpdateRepoList` response
#[derive(Debug, Clone, Serialize)]
pub struct UpdateRepoListResponse {
    pub status: &'static str,
    pub message: String,
}

/// `POST /UpdateRepos` response
#[derive(Debug, Clone, Serialize)]
pub struct UpdateReposResponse {
    /// `success`, `partial` when any repository failed, or `cancelled`.
    pub status: &'static str,
    pub results: Vec<SyncResult>,
}

/// `GET /GetRepos` response
#[derive(Debug, Clone, Serialize)]
pub struct ReposResponse {
    pub repos: Vec<String>,
}

/// `GET /GetDetails/{repoName}` response
#[derive(Debug, Clone, Serialize)]
pub struct DetailsResponse {
    pub name: String,
    pub readme: String,
    pub versions: Vec<ReleaseArtifact>,
}

/// `GET /api/status` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub catalog: StatusSnapshot,
    /// Repositories with a sync in progress.
    #[serde(default)]
    pub syncing: Vec<String>,
}

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub reason: String,
}
