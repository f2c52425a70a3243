use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::{ChangeKind, LocalChange};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncProtocol {
    /// WatermelonDB-style pull/push over HTTP with JSON change sets.
    Watermelon,
}

impl SyncProtocol {
    pub fn name(&self) -> &'static str {
        match self {
            SyncProtocol::Watermelon => "watermelon",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "watermelon" => Some(SyncProtocol::Watermelon),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableChanges {
    #[serde(default)]
    pub created: Vec<Value>,
    #[serde(default)]
    pub updated: Vec<Value>,
    #[serde(default)]
    pub deleted: Vec<String>,
}

impl TableChanges {
    pub fn len(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub type ChangeSet = BTreeMap<String, TableChanges>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PullResponse {
    #[serde(default)]
    pub changes: ChangeSet,
    /// Server clock at the time of the pull; becomes the next cursor.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushRequest {
    pub changes: ChangeSet,
}

impl PushRequest {
    // Tombstoned rows go out through `deleted`.
    pub fn from_local(changes: &[LocalChange]) -> Self {
        let mut set = ChangeSet::new();
        for change in changes {
            let entry = set.entry(change.table.wire_name().to_string()).or_default();
            let tombstoned = change.data.get("deleted").and_then(Value::as_bool) == Some(true);
            if tombstoned {
                entry.deleted.push(change.key.clone());
            } else {
                match change.kind {
                    ChangeKind::Created => entry.created.push(change.data.clone()),
                    ChangeKind::Updated => entry.updated.push(change.data.clone()),
                }
            }
        }
        Self { changes: set }
    }
}
