use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::db::Repository;
use crate::models::Table;
use crate::token::{wait_until_defined, TokenSource};

use super::channel::SyncChannel;
use super::config::{Backoff, SyncConfig};
use super::error::{SyncError, SyncResult};
use super::protocol::{ChangeSet, PushRequest};

/// Metadata key holding the server timestamp of the last acknowledged cycle.
pub const LAST_PULLED_AT_KEY: &str = "lastPulledAt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Disconnected,
    Connecting,
    Syncing,
    Idle,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub pulled: usize,
    pub applied: usize,
    pub skipped: usize,
    pub pushed: usize,
    pub cursor: i64,
}

/// Reconciles the local store with the remote authority. Remote rows win;
/// the cursor only advances once the push is acknowledged.
pub struct SyncEngine {
    repository: Repository,
    channel: SyncChannel,
    token: TokenSource,
    config: SyncConfig,
    state: watch::Sender<SyncState>,
    // Flips to true once, on teardown.
    shutdown: watch::Sender<bool>,
    cycle_lock: Mutex<()>,
    connected: AtomicBool,
}

impl SyncEngine {
    pub fn new(
        repository: Repository,
        channel: SyncChannel,
        token: TokenSource,
        config: SyncConfig,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::Disconnected);
        let (shutdown, _) = watch::channel(false);
        Self {
            repository,
            channel,
            token,
            config,
            state,
            shutdown,
            cycle_lock: Mutex::new(()),
            connected: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn is_torn_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Returns `None` if already connected or torn down.
    pub fn connect(self: &Arc<Self>) -> Option<SyncHandle> {
        if self.connected.swap(true, Ordering::SeqCst) || self.is_torn_down() {
            return None;
        }

        info!(
            "Connecting {} sync to {}",
            self.channel.protocol().name(),
            self.channel.endpoint()
        );

        self.state.send_replace(SyncState::Connecting);
        let trigger = Arc::new(Notify::new());
        let engine = Arc::clone(self);
        let task = tokio::spawn(engine.run(Arc::clone(&trigger), self.shutdown.subscribe()));

        Some(SyncHandle {
            engine: Arc::clone(self),
            trigger,
            task: Mutex::new(Some(task)),
        })
    }

    pub fn tear_down(&self) {
        self.connected.store(true, Ordering::SeqCst);
        self.shutdown.send_replace(true);
        self.state.send_replace(SyncState::Disconnected);
    }

    async fn run(self: Arc<Self>, trigger: Arc<Notify>, mut shutdown: watch::Receiver<bool>) {
        let local_changes = self.repository.local_changes();
        let mut backoff = Backoff::new(self.config.retry.clone());
        let period = self.config.auto_sync_interval;
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let outcome = tokio::select! {
                _ = shutdown.changed() => break,
                outcome = self.run_cycle() => outcome,
            };

            match outcome {
                Ok(report) => {
                    backoff.reset();
                    debug!(
                        "Sync cycle done: pulled {}, skipped {}, pushed {}",
                        report.pulled, report.skipped, report.pushed
                    );
                }
                Err(SyncError::TokenUnavailable) => {
                    warn!("Token source closed, stopping sync");
                    break;
                }
                Err(SyncError::Disconnected) => break,
                Err(e) => {
                    if e.is_transient() {
                        warn!("Sync cycle failed, reconnecting: {}", e);
                    } else {
                        error!("Sync cycle failed: {}", e);
                    }
                    let delay = backoff.next_delay();
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(delay) => continue,
                    }
                }
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = local_changes.notified() => debug!("Local change, syncing"),
                _ = trigger.notified() => debug!("Sync requested"),
                _ = interval.tick() => {}
            }
        }

        self.state.send_replace(SyncState::Disconnected);
        info!("Sync engine disconnected");
    }

    /// Cycles never overlap; a call made during another cycle waits for it.
    pub async fn run_cycle(&self) -> SyncResult<CycleReport> {
        let _guard = self.cycle_lock.lock().await;

        let mut shutdown = self.shutdown.subscribe();
        let token = tokio::select! {
            _ = shutdown.wait_for(|down| *down) => return Err(SyncError::Disconnected),
            token = wait_until_defined(&self.token) => token.ok_or(SyncError::TokenUnavailable)?,
        };
        if self.is_torn_down() {
            return Err(SyncError::Disconnected);
        }

        self.state.send_replace(SyncState::Syncing);
        let started = Instant::now();
        let result = self.cycle(&token).await;
        self.state.send_replace(match &result {
            _ if self.is_torn_down() => SyncState::Disconnected,
            Ok(_) => SyncState::Idle,
            Err(_) => SyncState::Connecting,
        });
        debug!("Sync cycle took {:?}", started.elapsed());
        result
    }

    async fn cycle(&self, token: &str) -> SyncResult<CycleReport> {
        let mut report = CycleReport::default();

        let last_pulled_at = self.last_pulled_at().await?;
        let pulled = self.channel.pull(token, last_pulled_at).await?;
        self.apply_remote_changes(pulled.changes, &mut report).await;

        // Collected after the pull so local writes made while it was in
        // flight are pushed rather than lost.
        let pending = self.repository.pending_changes().await?;
        if !pending.is_empty() {
            let request = PushRequest::from_local(&pending.changes);
            self.channel.push(token, pulled.timestamp, &request).await?;
            report.pushed = pending.changes.len();
        }

        let acknowledged = (!pending.is_empty()).then_some(pending.up_to_rev);
        self.repository
            .commit_cycle(LAST_PULLED_AT_KEY, &pulled.timestamp.to_string(), acknowledged)
            .await?;
        report.cursor = pulled.timestamp;

        Ok(report)
    }

    async fn last_pulled_at(&self) -> SyncResult<Option<i64>> {
        let stored = self.repository.get_metadata(LAST_PULLED_AT_KEY).await?;
        Ok(stored.and_then(|value| match value.parse() {
            Ok(cursor) => Some(cursor),
            Err(_) => {
                warn!("Ignoring unreadable sync cursor {:?}", value);
                None
            }
        }))
    }

    async fn apply_remote_changes(&self, changes: ChangeSet, report: &mut CycleReport) {
        for (wire_name, table_changes) in changes {
            if table_changes.is_empty() {
                continue;
            }
            report.pulled += table_changes.len();

            let Some(table) = Table::from_wire_name(&wire_name) else {
                warn!(
                    "Skipping {} changes for unknown table {}",
                    table_changes.len(),
                    wire_name
                );
                report.skipped += table_changes.len();
                continue;
            };

            for row in table_changes
                .created
                .into_iter()
                .chain(table_changes.updated)
            {
                let key = row
                    .get(table.key_field())
                    .and_then(Value::as_str)
                    .unwrap_or("?")
                    .to_string();
                match self.repository.apply_remote(table, row).await {
                    Ok(()) => report.applied += 1,
                    Err(e) => {
                        let err = SyncError::Apply {
                            table: table.wire_name(),
                            key,
                            reason: e.to_string(),
                        };
                        warn!("{}", err);
                        report.skipped += 1;
                    }
                }
            }

            for key in table_changes.deleted {
                match self.repository.apply_remote_delete(table, &key).await {
                    Ok(_) => report.applied += 1,
                    Err(e) => {
                        let err = SyncError::Apply {
                            table: table.wire_name(),
                            key,
                            reason: e.to_string(),
                        };
                        warn!("{}", err);
                        report.skipped += 1;
                    }
                }
            }
        }
    }
}

pub struct SyncHandle {
    engine: Arc<SyncEngine>,
    trigger: Arc<Notify>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncHandle {
    pub fn sync_now(&self) {
        self.trigger.notify_one();
    }

    pub async fn disconnect(&self) {
        self.engine.tear_down();
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                error!("Sync task ended abnormally: {}", e);
            }
        }
    }
}
