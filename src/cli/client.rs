use std::time::Duration;

use thiserror::Error;

use crate::http::{ErrorBody, StatusResponse};

/// Where `repomirror serve` listens by default.
pub const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";

/// Client for a running repomirror service
pub struct Client {
    base_url: String,
    agent: ureq::Agent,
}

#[derive(Error, Debug)]
pub enum ClientError {
    /// Nothing is listening at the server URL
    #[error("service is not running at {0}")]
    NotRunning(String),
    /// The service answered with a structured error
    #[error("service returned HTTP {status} ({}): {}", .body.kind, .body.reason)]
    Api { status: u16, body: ErrorBody },
    /// Non-JSON error status
    #[error("service returned HTTP {0}")]
    Http(u16),
    /// Network failure other than a refused connection
    #[error("transport error: {0}")]
    Transport(String),
    /// Body did not match the expected response
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl Client {
    pub fn new(base_url: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(30))
            .user_agent(concat!("repomirror/", env!("CARGO_PKG_VERSION")))
            .build();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, path);

        let response = match self.agent.get(&url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                return Err(match serde_json::from_str::<ErrorBody>(&body) {
                    Ok(body) => ClientError::Api { status, body },
                    Err(_) => ClientError::Http(status),
                });
            }
            Err(ureq::Error::Transport(e)) if e.kind() == ureq::ErrorKind::ConnectionFailed => {
                return Err(ClientError::NotRunning(self.base_url.clone()));
            }
            Err(ureq::Error::Transport(e)) => return Err(ClientError::Transport(e.to_string())),
        };

        let body = response
            .into_string()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    /// Fetch `GET /api/status`
    pub fn status(&self) -> Result<StatusResponse, ClientError> {
        self.get_json("/api/status")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::http::router;
    use crate::sync::SyncEngine;
    use crate::vcs::testing::FakeVcs;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn closed_port_is_not_running() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = Client::new(&format!("http://{}", addr));
        assert!(matches!(client.status(), Err(ClientError::NotRunning(_))));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        assert_eq!(Client::new("http://host:8000/").base_url(), "http://host:8000");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reads_status_from_running_service() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().join("catalog"), "https://host/sdroid-repos").unwrap();
        let engine = Arc::new(SyncEngine::new(config, Arc::new(FakeVcs::new())));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router(engine)).await });

        let status = tokio::task::spawn_blocking(move || {
            Client::new(&format!("http://{}", addr)).status()
        })
        .await
        .unwrap()
        .unwrap();

        assert!(!status.catalog.main_repo_initialized);
        assert_eq!(status.catalog.repos_count, 0);
        assert!(status.syncing.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn error_bodies_are_decoded() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().join("catalog"), "https://host/sdroid-repos").unwrap();
        let engine = Arc::new(SyncEngine::new(config, Arc::new(FakeVcs::new())));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router(engine)).await });

        let err = tokio::task::spawn_blocking(move || {
            Client::new(&format!("http://{}", addr)).get_json::<serde_json::Value>("/GetDetails/missing")
        })
        .await
        .unwrap()
        .unwrap_err();

        match err {
            ClientError::Api { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body.kind, "repository_not_found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
