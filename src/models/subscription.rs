use serde::{Deserialize, Serialize};

use super::entity::{Entity, Table};
use super::feed::Feed;

/// Polling frequency, in seconds, requested when the caller does not pick one.
pub const DEFAULT_REQUESTED_FREQUENCY: u32 = 600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSubscription {
    pub feed_id: String,
    pub url: String,
    pub user_id: String,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default = "default_requested_frequency")]
    pub requested_frequency: u32,
}

fn default_requested_frequency() -> u32 {
    DEFAULT_REQUESTED_FREQUENCY
}

impl Entity for UserSubscription {
    const TABLE: Table = Table::UserSubscriptions;
}

/// A subscription joined with its feed, if the feed has been synchronized yet.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionWithFeed {
    pub subscription: UserSubscription,
    pub feed: Option<Feed>,
}
