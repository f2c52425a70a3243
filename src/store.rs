use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::watch;

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::identity::IdentityResolver;
use crate::models::SubscriptionWithFeed;
use crate::services::SubscriptionManager;
use crate::sync::{
    CycleReport, RetryConfig, SyncChannel, SyncConfig, SyncEngine, SyncHandle, SyncProtocol,
    SyncState,
};
use crate::token::TokenSource;

pub struct StoreOptions {
    pub api_url: String,
    pub protocol: SyncProtocol,
    pub token: TokenSource,
    pub auto_sync_interval: Option<Duration>,
    pub request_timeout: Option<Duration>,
    /// SQLite file; `None` keeps the store in memory.
    pub db_path: Option<String>,
    pub retry: RetryConfig,
}

impl StoreOptions {
    pub fn new(api_url: impl Into<String>, token: TokenSource) -> Self {
        Self {
            api_url: api_url.into(),
            protocol: SyncProtocol::Watermelon,
            token,
            auto_sync_interval: None,
            request_timeout: None,
            db_path: None,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_protocol(mut self, protocol: SyncProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_db_path(mut self, path: impl Into<String>) -> Self {
        self.db_path = Some(path.into());
        self
    }

    pub fn with_auto_sync_interval(mut self, interval: Duration) -> Self {
        self.auto_sync_interval = Some(interval);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

pub struct Store {
    repository: Repository,
    subscriptions: SubscriptionManager,
    engine: Arc<SyncEngine>,
    sync: OnceLock<SyncHandle>,
}

impl Store {
    pub async fn open(options: StoreOptions) -> Result<Self> {
        let repository = match &options.db_path {
            Some(path) => Repository::new(path).await?,
            None => Repository::open_in_memory().await?,
        };

        let mut config = SyncConfig::default().with_retry(options.retry);
        if let Some(interval) = options.auto_sync_interval {
            config = config.with_auto_sync_interval(interval);
        }
        if let Some(timeout) = options.request_timeout {
            config = config.with_timeout(timeout);
        }

        let channel = SyncChannel::connect(options.protocol, &options.api_url, config.timeout)?;
        let engine = SyncEngine::new(repository.clone(), channel, options.token.clone(), config);
        let subscriptions =
            SubscriptionManager::new(repository.clone(), IdentityResolver::new(), options.token);

        Ok(Self {
            repository,
            subscriptions,
            engine: Arc::new(engine),
            sync: OnceLock::new(),
        })
    }

    pub fn start_auto_sync(&self) {
        if let Some(handle) = self.engine.connect() {
            // connect() succeeds once, so the cell is always empty here
            let _ = self.sync.set(handle);
        }
    }

    /// Terminal, whether or not auto-sync was started.
    pub async fn disconnect(&self) {
        self.engine.tear_down();
        if let Some(handle) = self.sync.get() {
            handle.disconnect().await;
        }
    }

    pub fn sync_state(&self) -> SyncState {
        self.engine.state()
    }

    pub fn subscribe_sync_state(&self) -> watch::Receiver<SyncState> {
        self.engine.subscribe()
    }

    pub fn sync_now(&self) {
        if let Some(handle) = self.sync.get() {
            handle.sync_now();
        }
    }

    pub async fn sync_once(&self) -> Result<CycleReport> {
        Ok(self.engine.run_cycle().await?)
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    pub async fn add_subscription(&self, url: &str) -> Result<String> {
        self.subscriptions.add_subscription(url).await
    }

    pub async fn add_subscription_with_frequency(
        &self,
        url: &str,
        requested_frequency: u32,
    ) -> Result<String> {
        self.subscriptions
            .add_subscription_with_frequency(url, requested_frequency)
            .await
    }

    pub async fn list_subscriptions(&self) -> Result<Vec<SubscriptionWithFeed>> {
        self.subscriptions.list_subscriptions().await
    }
}

/// Holds the session's store once created. Passed explicitly to whatever
/// needs the store instead of living in a global.
#[derive(Default)]
pub struct StoreContext {
    store: OnceLock<Arc<Store>>,
}

impl StoreContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_context(&self, options: StoreOptions) -> Result<Arc<Store>> {
        if self.store.get().is_some() {
            return Err(AppError::ContextAlreadyInitialized);
        }

        let store = Arc::new(Store::open(options).await?);
        self.store
            .set(Arc::clone(&store))
            .map_err(|_| AppError::ContextAlreadyInitialized)?;
        store.start_auto_sync();

        Ok(store)
    }

    pub fn use_context(&self) -> Result<Arc<Store>> {
        self.store.get().cloned().ok_or(AppError::ContextNotInitialized)
    }
}
