//! Sync engine: clone-or-update of the manifest repository and the catalog
//! it lists.

mod cancel;
mod engine;
mod pool;
mod result;
mod retry;

pub use cancel::{CancelOnDrop, CancelToken};
pub use engine::{SyncEngine, SyncError};
pub use result::{FailureKind, SyncBatch, SyncOutcome, SyncResult};
pub use retry::RetryPolicy;
