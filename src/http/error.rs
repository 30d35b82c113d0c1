use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use super::messages::ErrorBody;
use crate::catalog::CatalogError;
use crate::sync::{FailureKind, SyncError};

/// Request failures, rendered as `{kind, reason}` JSON.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    /// A single-repository sync that failed.
    #[error("{reason}")]
    Failed { kind: FailureKind, reason: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("background task failed: {}", e))
    }
}

impl ApiError {
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            ApiError::Catalog(e) => Some(FailureKind::from(e)),
            ApiError::Sync(e) => Some(e.kind()),
            ApiError::Failed { kind, .. } => Some(*kind),
            ApiError::Internal(_) => None,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            Some(
                FailureKind::ManifestNotFound
                | FailureKind::RepositoryNotFound
                | FailureKind::ArtifactNotFound
                | FailureKind::IconNotFound,
            ) => StatusCode::NOT_FOUND,
            Some(FailureKind::InvalidName) => StatusCode::BAD_REQUEST,
            Some(FailureKind::NameCollision) => StatusCode::CONFLICT,
            Some(FailureKind::RemoteUnreachable) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Request failed: {}", self);
        } else {
            log::debug!("Request rejected: {}", self);
        }

        let body = ErrorBody {
            kind: self.kind().map_or("internal", FailureKind::as_str).to_string(),
            reason: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
