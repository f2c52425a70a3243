use std::collections::HashMap;

use uuid::Uuid;

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::identity::IdentityResolver;
use crate::models::{
    now_millis, Feed, FeedItem, SubscriptionWithFeed, UserFeedItemRead, UserSubscription,
    DEFAULT_REQUESTED_FREQUENCY,
};
use crate::token::{wait_until_defined, TokenSource};

/// Subscription reads and writes against the local store. Writes land
/// immediately; the sync engine mirrors them to the server on its own.
#[derive(Clone)]
pub struct SubscriptionManager {
    repository: Repository,
    identity: IdentityResolver,
    token: TokenSource,
}

impl SubscriptionManager {
    pub fn new(repository: Repository, identity: IdentityResolver, token: TokenSource) -> Self {
        Self {
            repository,
            identity,
            token,
        }
    }

    async fn current_user_id(&self) -> Result<String> {
        let token = wait_until_defined(&self.token)
            .await
            .ok_or(AppError::TokenUnavailable)?;
        self.identity.resolve_user_id(&token)
    }

    pub async fn add_subscription(&self, url: &str) -> Result<String> {
        self.add_subscription_with_frequency(url, DEFAULT_REQUESTED_FREQUENCY)
            .await
    }

    pub async fn add_subscription_with_frequency(
        &self,
        url: &str,
        requested_frequency: u32,
    ) -> Result<String> {
        let user_id = self.current_user_id().await?;

        tracing::info!("Adding user subscription for {}", url);
        let now = now_millis();
        let subscription = UserSubscription {
            feed_id: Uuid::new_v4().to_string(),
            url: url.to_string(),
            user_id,
            created_at: now,
            updated_at: now,
            deleted: false,
            requested_frequency,
        };
        self.repository.put(&subscription).await?;

        Ok(subscription.feed_id)
    }

    /// Tombstoned rows are included.
    pub async fn list_subscriptions(&self) -> Result<Vec<SubscriptionWithFeed>> {
        let subscriptions: Vec<UserSubscription> = self.repository.scan().await?;
        let mut feeds: HashMap<String, Feed> = self
            .repository
            .scan::<Feed>()
            .await?
            .into_iter()
            .map(|feed| (feed.feed_id.clone(), feed))
            .collect();

        Ok(subscriptions
            .into_iter()
            .map(|subscription| {
                let feed = feeds.remove(&subscription.feed_id);
                SubscriptionWithFeed { subscription, feed }
            })
            .collect())
    }

    pub async fn remove_subscription(&self, feed_id: &str) -> Result<()> {
        let mut subscription: UserSubscription = self
            .repository
            .get(feed_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("subscription {}", feed_id)))?;

        if subscription.deleted {
            return Ok(());
        }

        tracing::info!("Removing user subscription for {}", subscription.url);
        subscription.deleted = true;
        subscription.updated_at = now_millis();
        self.repository.put(&subscription).await
    }

    pub async fn list_feed_items(&self, feed_id: &str) -> Result<Vec<FeedItem>> {
        self.repository.scan_by_index("feedId", feed_id).await
    }

    pub async fn mark_item_read(&self, guid: &str, feed_id: Option<&str>, read: bool) -> Result<()> {
        let user_id = self.current_user_id().await?;
        let marker = UserFeedItemRead {
            guid: guid.to_string(),
            user_id,
            feed_id: feed_id.map(str::to_string),
            read,
            updated_at: now_millis(),
            deleted: false,
        };
        self.repository.put(&marker).await
    }
}
