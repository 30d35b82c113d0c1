//! Shared types for repomirror

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Error type for parsing failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("value cannot be empty")]
    Empty,
    #[error("invalid character in value: {0}")]
    InvalidCharacter(char),
    #[error("value cannot start with '{0}'")]
    InvalidStart(char),
    #[error("cannot derive a repository name from url '{0}'")]
    InvalidUrl(String),
}

/// Local name of a tracked repository, used as its directory under the
/// catalog root.
///
/// Validation rules:
/// - Non-empty
/// - Alphanumeric characters, hyphens, underscores, and dots only
/// - Cannot start with a dot
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoName(String);

impl RepoName {
    /// Returns the name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive a local name from a remote URL: the last path segment, with
    /// trailing slashes ignored and a `.git` suffix stripped.
    ///
    /// Both `https://host/owner/repo.git` and `git@host:owner/repo` work.
    pub fn from_url(url: &str) -> Result<Self, ParseError> {
        let trimmed = url.trim().trim_end_matches('/');
        let path = match trimmed.split_once("://") {
            // Skip the authority; a URL without a path has no usable name.
            Some((_, rest)) => rest.split_once('/').map_or("", |(_, path)| path),
            None => trimmed.split_once(':').map_or(trimmed, |(_, path)| path),
        };
        let segment = path.rsplit('/').next().unwrap_or_default();
        let segment = segment.strip_suffix(".git").unwrap_or(segment);

        segment
            .parse()
            .map_err(|_| ParseError::InvalidUrl(url.to_string()))
    }
}

impl FromStr for RepoName {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseError::Empty);
        }

        if s.starts_with('.') {
            return Err(ParseError::InvalidStart('.'));
        }

        for c in s.chars() {
            if !c.is_ascii_alphanumeric() && c != '-' && c != '_' && c != '.' {
                return Err(ParseError::InvalidCharacter(c));
            }
        }

        Ok(RepoName(s.to_string()))
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for RepoName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Normalize a remote URL for equality checks.
///
/// Ignores surrounding whitespace, trailing slashes and a `.git` suffix so
/// that `https://host/a`, `https://host/a/` and `https://host/a.git` compare
/// equal.
pub fn normalize_url(url: &str) -> &str {
    let trimmed = url.trim().trim_end_matches('/');
    trimmed.strip_suffix(".git").unwrap_or(trimmed)
}

/// A repository tracked by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoRecord {
    /// Remote URL as listed in the manifest.
    pub url: String,
    /// Directory name under the catalog root.
    pub local_name: RepoName,
    /// Working tree location. Never serialized.
    #[serde(skip)]
    pub local_path: PathBuf,
}
