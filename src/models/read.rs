use serde::{Deserialize, Serialize};

use super::entity::{Entity, Table};

/// Per-user read marker for a feed item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFeedItemRead {
    pub guid: String,
    pub user_id: String,
    #[serde(default)]
    pub feed_id: Option<String>,
    pub read: bool,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default)]
    pub deleted: bool,
}

impl Entity for UserFeedItemRead {
    const TABLE: Table = Table::UserFeedItemReads;
}
