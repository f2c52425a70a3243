mod channel;
mod config;
mod engine;
mod error;
mod protocol;

pub use channel::SyncChannel;
pub use config::{Backoff, RetryConfig, SyncConfig, DEFAULT_AUTO_SYNC_INTERVAL};
pub use engine::{CycleReport, SyncEngine, SyncHandle, SyncState, LAST_PULLED_AT_KEY};
pub use error::{SyncError, SyncResult};
pub use protocol::{ChangeSet, PullResponse, PushRequest, SyncProtocol, TableChanges};
