//! Propagation of content edits into snapshots and the cache.

mod coordinator;
mod state;

pub use coordinator::{
    FlushOutcome, FlushReport, FlushStatus, SyncConfig, SyncCoordinator, SyncError, SyncStatus,
};
pub use state::{PendingUpdate, SyncEvent, SyncPhase, SyncState};
