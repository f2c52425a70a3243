mod entity;
mod feed;
mod read;
mod subscription;

pub use entity::{now_millis, Entity, Table};
pub use feed::{Feed, FeedItem};
pub use read::UserFeedItemRead;
pub use subscription::{SubscriptionWithFeed, UserSubscription, DEFAULT_REQUESTED_FREQUENCY};
