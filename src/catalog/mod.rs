//! On-disk catalog: path layout, per-repository locks and read queries

mod lock;
mod paths;
mod store;

pub use lock::RepoLock;
pub use paths::CatalogPaths;
pub use store::{CatalogError, CatalogStore, ReleaseArtifact, StatusSnapshot};
