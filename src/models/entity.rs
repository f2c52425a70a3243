use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use super::{Feed, FeedItem, UserFeedItemRead, UserSubscription};

/// The synchronized entity tables. `DBMetadata` is not listed here because it
/// never travels over the sync channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Feeds,
    FeedItems,
    UserFeedItemReads,
    UserSubscriptions,
}

impl Table {
    pub const ALL: [Table; 4] = [
        Table::Feeds,
        Table::FeedItems,
        Table::UserFeedItemReads,
        Table::UserSubscriptions,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Feeds => "feeds",
            Table::FeedItems => "feed_items",
            Table::UserFeedItemReads => "user_feed_item_reads",
            Table::UserSubscriptions => "user_subscriptions",
        }
    }

    /// Name used for this table in sync payloads.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Table::Feeds => "feeds",
            Table::FeedItems => "feedItems",
            Table::UserFeedItemReads => "userFeedItemReads",
            Table::UserSubscriptions => "userSubscriptions",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Table> {
        Table::ALL.into_iter().find(|t| t.wire_name() == name)
    }

    pub fn key_column(&self) -> &'static str {
        match self {
            Table::Feeds | Table::UserSubscriptions => "feed_id",
            Table::FeedItems | Table::UserFeedItemReads => "guid",
        }
    }

    pub fn key_field(&self) -> &'static str {
        match self {
            Table::Feeds | Table::UserSubscriptions => "feedId",
            Table::FeedItems | Table::UserFeedItemReads => "guid",
        }
    }

    pub fn validate(&self, row: &Value) -> serde_json::Result<()> {
        match self {
            Table::Feeds => Feed::deserialize(row).map(drop),
            Table::FeedItems => FeedItem::deserialize(row).map(drop),
            Table::UserFeedItemReads => UserFeedItemRead::deserialize(row).map(drop),
            Table::UserSubscriptions => UserSubscription::deserialize(row).map(drop),
        }
    }

    /// Secondary index as `(json field, column)`.
    pub fn index(&self) -> Option<(&'static str, &'static str)> {
        match self {
            Table::FeedItems => Some(("feedId", "feed_id")),
            Table::UserSubscriptions => Some(("url", "url")),
            Table::Feeds | Table::UserFeedItemReads => None,
        }
    }
}

/// Rows are persisted as their serde JSON body, which is also the wire form.
pub trait Entity: Serialize + DeserializeOwned + Send + 'static {
    const TABLE: Table;
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
