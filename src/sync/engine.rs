//! Clone-or-update for the manifest repository and the catalog it lists.
//!
//! Every repository sync runs under that repository's lock, so overlapping
//! requests for the same working tree serialize instead of racing. A batch
//! runs on the bounded worker pool; each repository's failure is captured in
//! its own [`SyncResult`] and never aborts the rest of the batch.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;

use super::pool::run_bounded;
use super::{CancelToken, FailureKind, SyncBatch, SyncOutcome, SyncResult};
use crate::catalog::{CatalogError, CatalogStore, RepoLock};
use crate::config::Config;
use crate::types::{RepoName, RepoRecord, normalize_url};
use crate::vcs::VcsClient;

/// Errors that abort a whole catalog sync.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The manifest repository was absent and could not be cloned.
    #[error("manifest repository sync failed: {reason}")]
    ManifestSync { kind: FailureKind, reason: String },
    /// The manifest could not be read.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl SyncError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SyncError::ManifestSync { kind, .. } => *kind,
            SyncError::Catalog(e) => FailureKind::from(e),
        }
    }
}

/// Removes a repository from the in-flight registry when dropped.
struct InFlight<'a> {
    registry: &'a DashMap<RepoName, DateTime<Utc>>,
    name: RepoName,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.registry.remove(&self.name);
    }
}

/// What to do with one manifest entry.
enum Planned {
    Run(RepoRecord),
    Reject(SyncResult),
}

pub struct SyncEngine {
    config: Config,
    store: CatalogStore,
    vcs: Arc<dyn VcsClient>,
    in_flight: DashMap<RepoName, DateTime<Utc>>,
    /// Root path spellings scrubbed from failure reasons.
    redactions: Vec<String>,
}

impl SyncEngine {
    pub fn new(config: Config, vcs: Arc<dyn VcsClient>) -> Self {
        let store = CatalogStore::from_config(&config);

        let mut redactions = vec![config.root.display().to_string()];
        if let Ok(canonical) = config.root.canonicalize() {
            redactions.push(canonical.display().to_string());
        }
        redactions.retain(|r| !r.is_empty() && r != ".");
        // Longest first so a nested spelling is not partially replaced.
        redactions.sort_by_key(|r| std::cmp::Reverse(r.len()));
        redactions.dedup();

        Self {
            config,
            store,
            vcs,
            in_flight: DashMap::new(),
            redactions,
        }
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Names of repositories with a sync in progress, sorted.
    pub fn syncing(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .in_flight
            .iter()
            .map(|entry| entry.key().to_string())
            .collect();
        names.sort();
        names
    }

    /// Record for the manifest repository itself.
    pub fn manifest_record(&self) -> RepoRecord {
        let name = self.config.manifest_name.clone();
        RepoRecord {
            url: self.config.manifest_url.clone(),
            local_path: self.store.resolve_path(&name),
            local_name: name,
        }
    }

    fn redact(&self, reason: &str) -> String {
        self.redactions
            .iter()
            .fold(reason.to_string(), |acc, root| acc.replace(root.as_str(), "<catalog>"))
    }

    fn failure(&self, record: &RepoRecord, kind: FailureKind, reason: &str, attempts: u32) -> SyncResult {
        let reason = self.redact(reason);
        log::warn!("Sync of {} failed ({}): {}", record.local_name, kind.as_str(), reason);
        SyncResult::new(record.clone(), SyncOutcome::Failed { kind, reason }, attempts)
    }

    /// Clone or pull one repository under its lock.
    pub fn sync_repo(&self, record: &RepoRecord, cancel: &CancelToken) -> SyncResult {
        if let Err(e) = self.store.ensure_root_exists() {
            return self.failure(record, FailureKind::FilesystemError, &e.to_string(), 0);
        }

        let lock_path = self.store.paths().lock_path(&record.local_name);
        let _lock = match RepoLock::acquire(&lock_path, self.config.lock_timeout) {
            Ok(lock) => lock,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                return self.failure(record, FailureKind::LockTimeout, &e.to_string(), 0);
            }
            Err(e) => {
                return self.failure(
                    record,
                    FailureKind::FilesystemError,
                    &format!("cannot lock repository: {}", e),
                    0,
                );
            }
        };

        self.in_flight.insert(record.local_name.clone(), Utc::now());
        let _in_flight = InFlight {
            registry: &self.in_flight,
            name: record.local_name.clone(),
        };

        log::info!("Syncing {} from {}", record.local_name, record.url);
        let (result, attempts) = self.config.retry.run(cancel, |attempt| {
            log::debug!("Sync attempt {} for {}", attempt, record.local_name);
            self.vcs.clone_or_update(&record.url, &record.local_path)
        });

        match result {
            Ok(fetched) => {
                let outcome = SyncOutcome::from(fetched);
                log::info!("Synced {}: {:?}", record.local_name, outcome);
                SyncResult::new(record.clone(), outcome, attempts)
            }
            Err(e) => self.failure(record, FailureKind::from(&e), &e.to_string(), attempts),
        }
    }

    /// Clone the manifest repository if absent, pull it otherwise.
    pub fn sync_manifest_repo(&self) -> SyncResult {
        self.sync_repo(&self.manifest_record(), &CancelToken::new())
    }

    /// Clone the manifest repository only if it is not checked out yet.
    ///
    /// Returns `None` when it already exists.
    pub fn init_manifest_repo(&self) -> Option<SyncResult> {
        if self.store.manifest_repo_exists() {
            log::debug!("Manifest repository already exists");
            return None;
        }
        log::info!("Cloning manifest repository {}", self.config.manifest_url);
        Some(self.sync_manifest_repo())
    }

    /// Decide, in manifest order, which entries run and which collide.
    ///
    /// The first entry claiming a local name wins. The manifest repository's
    /// own name is pre-claimed unless the entry is the manifest itself.
    fn plan(&self, records: Vec<RepoRecord>) -> Vec<Planned> {
        let manifest_url = normalize_url(&self.config.manifest_url);
        let mut claimed: HashMap<RepoName, String> = HashMap::new();

        records
            .into_iter()
            .map(|record| {
                let holder = claimed.get(&record.local_name).cloned().or_else(|| {
                    let is_manifest_name = record.local_name == self.config.manifest_name;
                    (is_manifest_name && normalize_url(&record.url) != manifest_url)
                        .then(|| self.config.manifest_url.clone())
                });

                match holder {
                    Some(holder) => {
                        let reason = format!(
                            "local name '{}' is already used by {}",
                            record.local_name, holder
                        );
                        Planned::Reject(self.failure(&record, FailureKind::NameCollision, &reason, 0))
                    }
                    None => {
                        claimed.insert(record.local_name.clone(), record.url.clone());
                        Planned::Run(record)
                    }
                }
            })
            .collect()
    }

    /// Sync every repository listed in the manifest.
    ///
    /// Fails only when the manifest cannot be obtained; per-repository
    /// failures are reported in the batch.
    pub fn sync_catalog(&self, cancel: &CancelToken) -> Result<SyncBatch, SyncError> {
        self.store.ensure_root_exists()?;

        if !self.store.manifest_repo_exists() {
            let manifest = self.sync_manifest_repo();
            if let SyncOutcome::Failed { kind, reason } = manifest.outcome {
                return Err(SyncError::ManifestSync { kind, reason });
            }
        }

        let planned = self.plan(self.store.manifest_records()?);
        log::info!(
            "Syncing catalog of {} repositories with {} workers",
            planned.len(),
            self.config.workers
        );

        let mut jobs = Vec::new();
        let mut slots: Vec<Option<SyncResult>> = Vec::with_capacity(planned.len());
        for (index, entry) in planned.into_iter().enumerate() {
            match entry {
                Planned::Run(record) => {
                    jobs.push((index, record));
                    slots.push(None);
                }
                Planned::Reject(result) => slots.push(Some(result)),
            }
        }

        let finished = run_bounded(jobs, self.config.workers, cancel, |(index, record)| {
            (index, self.sync_repo(&record, cancel))
        });
        for (index, result) in finished.into_iter().flatten() {
            slots[index] = Some(result);
        }

        let cancelled = cancel.is_cancelled();
        let batch = SyncBatch {
            results: slots.into_iter().flatten().collect(),
            cancelled,
        };
        log::info!(
            "Catalog sync finished: {} results, {} failed{}",
            batch.results.len(),
            batch.failures(),
            if cancelled { " (cancelled)" } else { "" }
        );

        Ok(batch)
    }
}
