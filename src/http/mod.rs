//! HTTP surface over the catalog store and sync engine.
//!
//! Sync work is blocking (git subprocesses, file locks), so handlers hand
//! it to tokio's blocking pool and await the result.

mod error;
pub mod messages;

use std::io;
use std::path::Path as FsPath;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, header};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio_util::io::ReaderStream;
use tower_http::cors::CorsLayer;

pub use error::ApiError;
pub use messages::{
    DetailsResponse, ErrorBody, ReposResponse, StatusResponse, UpdateRepoListResponse,
    UpdateReposResponse,
};

use crate::catalog::CatalogError;
use crate::sync::{CancelToken, SyncEngine, SyncOutcome};
use crate::types::RepoName;

const APK_CONTENT_TYPE: &str = "application/vnd.android.package-archive";
const BINARY_CONTENT_TYPE: &str = "application/octet-stream";
const PNG_CONTENT_TYPE: &str = "image/png";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<SyncEngine>,
}

/// Build the service router.
pub fn router(engine: Arc<SyncEngine>) -> Router {
    Router::new()
        .route("/UpdateRepoList", post(update_repo_list))
        .route("/UpdateRepos", post(update_repos))
        .route("/GetRepos", get(get_repos))
        .route("/GetDetails/:repo_name", get(get_details))
        .route("/GetFile/:repo_name/:filename", get(get_file))
        .route("/GetFavicon/:repo_name", get(get_favicon))
        .route("/api/status", get(get_status))
        .layer(CorsLayer::permissive())
        .with_state(AppState { engine })
}

/// Serve until Ctrl-C.
pub async fn serve(listener: TcpListener, engine: Arc<SyncEngine>) -> io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        log::info!("Listening on http://{}", addr);
    }
    axum::serve(listener, router(engine))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("Received shutdown signal"),
        Err(e) => {
            log::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

fn parse_name(raw: &str) -> Result<RepoName, ApiError> {
    raw.parse::<RepoName>()
        .map_err(|e| ApiError::Catalog(CatalogError::from(e)))
}

/// Turn a failed single-repository sync into a request error.
fn check_outcome(outcome: SyncOutcome) -> Result<SyncOutcome, ApiError> {
    match outcome {
        SyncOutcome::Failed { kind, reason } => Err(ApiError::Failed { kind, reason }),
        outcome => Ok(outcome),
    }
}

async fn update_repo_list(
    State(state): State<AppState>,
) -> Result<Json<UpdateRepoListResponse>, ApiError> {
    let engine = Arc::clone(&state.engine);
    let result = tokio::task::spawn_blocking(move || engine.sync_manifest_repo()).await?;

    let message = match check_outcome(result.outcome)? {
        SyncOutcome::Cloned => "Repository cloned",
        _ => "Repository updated",
    };
    Ok(Json(UpdateRepoListResponse {
        status: "success",
        message: message.to_string(),
    }))
}

async fn update_repos(
    State(state): State<AppState>,
) -> Result<Json<UpdateReposResponse>, ApiError> {
    let cancel = CancelToken::new();
    // Dropping this future (client disconnect) cancels the batch.
    let guard = cancel.cancel_on_drop();

    let engine = Arc::clone(&state.engine);
    let batch = tokio::task::spawn_blocking(move || engine.sync_catalog(&cancel)).await??;
    guard.disarm();

    let status = if batch.cancelled {
        "cancelled"
    } else if batch.failures() == 0 {
        "success"
    } else {
        "partial"
    };
    Ok(Json(UpdateReposResponse {
        status,
        results: batch.results,
    }))
}

async fn get_repos(State(state): State<AppState>) -> Result<Json<ReposResponse>, ApiError> {
    let engine = Arc::clone(&state.engine);
    let repos = tokio::task::spawn_blocking(move || -> Result<Vec<String>, ApiError> {
        if let Some(result) = engine.init_manifest_repo() {
            check_outcome(result.outcome)?;
        }
        let records = engine.store().manifest_records()?;
        Ok(records
            .into_iter()
            .map(|record| record.local_name.to_string())
            .collect())
    })
    .await??;

    Ok(Json(ReposResponse { repos }))
}

async fn get_details(
    State(state): State<AppState>,
    Path(repo_name): Path<String>,
) -> Result<Json<DetailsResponse>, ApiError> {
    let name = parse_name(&repo_name)?;
    let engine = Arc::clone(&state.engine);
    let details = tokio::task::spawn_blocking(move || -> Result<DetailsResponse, ApiError> {
        let store = engine.store();
        Ok(DetailsResponse {
            readme: store.read_readme(&name)?,
            versions: store.list_artifacts(&name)?,
            name: name.to_string(),
        })
    })
    .await??;

    Ok(Json(details))
}

async fn get_file(
    State(state): State<AppState>,
    Path((repo_name, filename)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let name = parse_name(&repo_name)?;
    let path = state.engine.store().artifact_path(&name, &filename)?;

    let content_type = if FsPath::new(&filename)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("apk"))
    {
        APK_CONTENT_TYPE
    } else {
        BINARY_CONTENT_TYPE
    };
    let mut response = stream_file(&path, content_type).await?;

    if let Ok(value) = HeaderValue::from_str(&attachment_disposition(&filename)) {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

async fn get_favicon(
    State(state): State<AppState>,
    Path(repo_name): Path<String>,
) -> Result<Response, ApiError> {
    let name = parse_name(&repo_name)?;
    let path = state.engine.store().locate_icon(&name)?;
    stream_file(&path, PNG_CONTENT_TYPE).await
}

async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        catalog: state.engine.store().status(),
        syncing: state.engine.syncing(),
    })
}

/// `Content-Disposition` for a download, keeping only header-safe
/// characters of the file name.
fn attachment_disposition(filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    format!("attachment; filename=\"{}\"", safe)
}

/// Stream a file from disk without buffering it.
async fn stream_file(path: &FsPath, content_type: &'static str) -> Result<Response, ApiError> {
    let file = tokio::fs::File::open(path).await.map_err(CatalogError::from)?;
    let len = file.metadata().await.map_err(CatalogError::from)?.len();

    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, len)
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| ApiError::Internal(e.to_string()))
}
